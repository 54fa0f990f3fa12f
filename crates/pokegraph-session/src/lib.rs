//! Per-load session state for pokegraph.
//!
//! - [`IdentityMap`] keeps one instance per `(type, id)` during a load
//! - [`TrackedSource`] counts round trips and flags N+1 statement patterns

pub mod identity_map;
pub mod round_trips;

pub use identity_map::IdentityMap;
pub use round_trips::{RoundTripStats, RoundTripTracker, TrackedSource};
