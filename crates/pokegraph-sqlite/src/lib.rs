//! SQLite row source for pokegraph.
//!
//! `SqliteConnection` implements [`pokegraph_core::RowSource`] over the C
//! library bundled by `libsqlite3-sys`. Calls are synchronous. One
//! `query_batch` call runs all of its statements under a single lock
//! acquisition, which is the driver's notion of a round trip.
//!
//! # Example
//!
//! ```rust,ignore
//! use pokegraph_core::RowSource;
//! use pokegraph_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE trainers (id INTEGER PRIMARY KEY, name TEXT)")?;
//! let rows = conn.query("SELECT id, name FROM trainers", &[])?;
//! ```

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};

/// The version string of the bundled SQLite library.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}
