//! Terminal output for pokegraph.
//!
//! Output adapts to the environment:
//!
//! - **Plain**: CI systems, piped output, `NO_COLOR`
//! - **Rich**: interactive terminals (ANSI colors)
//! - **Json**: structured output on stdout
//! - **Quiet**: regular output suppressed, used while timing
//!
//! Overrides: `POKEGRAPH_QUIET`, `POKEGRAPH_PLAIN`, `POKEGRAPH_JSON`,
//! `POKEGRAPH_RICH`.

#![forbid(unsafe_code)]

pub mod console;
pub mod mode;

pub use console::{Capture, CapturedOutput, Console, QuietGuard};
pub use mode::OutputMode;
