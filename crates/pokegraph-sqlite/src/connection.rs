//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API implementing [`RowSource`]. All
//! calls are synchronous; a batch runs every statement while holding the
//! connection lock once, which makes it a single round trip.

// Allow casts in FFI code where we need to match C types exactly
#![allow(unsafe_code)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::result_large_err)] // Error type is defined in pokegraph-core
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers
#![allow(clippy::if_not_else)] // Clearer for error handling

use crate::ffi;
use crate::types;
use pokegraph_core::{
    ColumnInfo, Error, Row, RowSource, Statement, StoreError, StoreErrorKind, Value,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub read_only: bool,
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

struct SqliteInner {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is only touched while the Mutex is held.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self, Error> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            StoreError::new(StoreErrorKind::Connect, "Invalid path: contains null byte")
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if !db.is_null() {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            } else {
                ffi::error_string(rc).to_string()
            };

            return Err(StoreError::new(
                StoreErrorKind::Connect,
                format!("Failed to open database '{}': {}", config.path, msg),
            )
            .into());
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::debug!(
            target: "pokegraph::sqlite",
            path = %config.path,
            sqlite_version = ffi::version(),
            "opened database"
        );

        Ok(Self {
            inner: Mutex::new(SqliteInner { db }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, Error> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database, creating it if needed.
    pub fn open_file(path: impl Into<String>) -> Result<Self, Error> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, SqliteInner>, Error> {
        self.inner.lock().map_err(|_| {
            StoreError::new(StoreErrorKind::Database, "connection lock poisoned").into()
        })
    }

    /// Execute SQL directly without preparing (for DDL scripts, etc.)
    ///
    /// Accepts several `;`-separated statements.
    pub fn execute_raw(&self, sql: &str) -> Result<(), Error> {
        let inner = self.lock()?;
        let c_sql = CString::new(sql).map_err(|_| {
            StoreError::new(StoreErrorKind::Syntax, "SQL contains null byte").with_sql(sql)
        })?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(inner.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let msg = if !errmsg.is_null() {
                // SAFETY: errmsg is a SQLite-allocated C string
                let msg = unsafe { CStr::from_ptr(errmsg).to_string_lossy().into_owned() };
                unsafe { ffi::sqlite3_free(errmsg.cast()) };
                msg
            } else {
                ffi::error_string(rc).to_string()
            };

            return Err(StoreError::new(error_code_to_kind(rc), msg)
                .with_sql(sql)
                .into());
        }

        Ok(())
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> Result<u64, Error> {
        let inner = self.lock()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_changes(inner.db) } as u64)
    }
}

impl RowSource for SqliteConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let inner = self.lock()?;
        let rows = query_locked(inner.db, sql, params)?;
        tracing::trace!(target: "pokegraph::sqlite", sql, rows = rows.len(), "query");
        Ok(rows)
    }

    fn query_batch(&self, statements: &[Statement]) -> Result<Vec<Vec<Row>>, Error> {
        let inner = self.lock()?;
        let sets = statements
            .iter()
            .map(|stmt| query_locked(inner.db, &stmt.sql, &stmt.params))
            .collect::<Result<Vec<_>, Error>>()?;
        tracing::trace!(
            target: "pokegraph::sqlite",
            statements = statements.len(),
            "batch"
        );
        Ok(sets)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        let inner = self.lock()?;
        let stmt = prepare_stmt(inner.db, sql)?;
        let guard = StmtGuard(stmt);
        bind_params(inner.db, guard.0, sql, params)?;

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(guard.0) };
        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid
                let changes = unsafe { ffi::sqlite3_changes(inner.db) };
                Ok(changes as u64)
            }
            _ => Err(step_error(inner.db, sql)),
        }
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.lock() {
            if !inner.db.is_null() {
                // SAFETY: db is valid and no statements outlive their call
                unsafe {
                    ffi::sqlite3_close(inner.db);
                }
            }
        }
    }
}

/// Finalizes a prepared statement on every exit path.
struct StmtGuard(*mut ffi::sqlite3_stmt);

impl Drop for StmtGuard {
    fn drop(&mut self) {
        // SAFETY: the pointer came from a successful prepare
        unsafe {
            ffi::sqlite3_finalize(self.0);
        }
    }
}

/// Prepare, bind, and step `sql` to completion. Caller holds the lock.
fn query_locked(db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
    let stmt = StmtGuard(prepare_stmt(db, sql)?);
    bind_params(db, stmt.0, sql, params)?;

    // SAFETY: stmt is valid
    let col_count = unsafe { ffi::sqlite3_column_count(stmt.0) };
    let col_names = (0..col_count)
        // SAFETY: stmt is valid, i < col_count
        .map(|i| unsafe { types::column_name(stmt.0, i) }.unwrap_or_else(|| format!("col{}", i)))
        .collect();
    let columns = Arc::new(ColumnInfo::new(col_names));

    let mut rows = Vec::new();
    loop {
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt.0) };
        match rc {
            ffi::SQLITE_ROW => {
                let values = (0..col_count)
                    // SAFETY: we just got SQLITE_ROW, i < col_count
                    .map(|i| unsafe { types::read_column(stmt.0, i) })
                    .collect();
                rows.push(Row::with_columns(Arc::clone(&columns), values));
            }
            ffi::SQLITE_DONE => break,
            _ => return Err(step_error(db, sql)),
        }
    }

    Ok(rows)
}

fn bind_params(
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    sql: &str,
    params: &[Value],
) -> Result<(), Error> {
    for (i, param) in params.iter().enumerate() {
        // SAFETY: stmt is valid, index is 1-based
        let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
        if rc != ffi::SQLITE_OK {
            return Err(bind_error(db, sql, i + 1));
        }
    }
    Ok(())
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt, Error> {
    let c_sql = CString::new(sql).map_err(|_| {
        StoreError::new(StoreErrorKind::Syntax, "SQL contains null byte").with_sql(sql)
    })?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut stmt,
            ptr::null_mut(),
        )
    };

    if rc != ffi::SQLITE_OK {
        if !stmt.is_null() {
            // SAFETY: stmt came from prepare
            unsafe { ffi::sqlite3_finalize(stmt) };
        }
        let kind = match rc {
            ffi::SQLITE_ERROR => StoreErrorKind::Syntax,
            other => error_code_to_kind(other),
        };
        // SAFETY: db is valid
        let msg = unsafe { errmsg(db) };
        return Err(StoreError::new(kind, msg).with_sql(sql).into());
    }

    if stmt.is_null() {
        return Err(StoreError::new(StoreErrorKind::Syntax, "empty statement")
            .with_sql(sql)
            .into());
    }

    Ok(stmt)
}

/// # Safety
/// `db` must be a valid connection handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param_index: usize) -> Error {
    // SAFETY: db is valid
    let msg = unsafe { errmsg(db) };
    StoreError::new(
        StoreErrorKind::Bind,
        format!("Failed to bind parameter {}: {}", param_index, msg),
    )
    .with_sql(sql)
    .into()
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (errmsg(db), ffi::sqlite3_errcode(db)) };
    StoreError::new(error_code_to_kind(code), msg)
        .with_sql(sql)
        .into()
}

fn error_code_to_kind(code: c_int) -> StoreErrorKind {
    match code {
        ffi::SQLITE_CONSTRAINT => StoreErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => StoreErrorKind::Busy,
        ffi::SQLITE_RANGE => StoreErrorKind::Bind,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => StoreErrorKind::Connect,
        _ => StoreErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, seen INTEGER);
             INSERT INTO people (name, seen) VALUES ('Brock', 1700000000000000), ('Misty', NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
    }

    #[test]
    fn test_query_reads_aliases_and_nulls() {
        let conn = people();
        let rows = conn
            .query("SELECT id AS p_id, name AS p_name, seen FROM people ORDER BY id", &[])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_named::<i64>("p_id").unwrap(), 1);
        assert_eq!(rows[0].get_named::<String>("p_name").unwrap(), "Brock");
        assert_eq!(
            rows[0].get_named::<i64>("seen").unwrap(),
            1_700_000_000_000_000
        );
        assert_eq!(rows[1].get_named::<Option<i64>>("seen").unwrap(), None);
    }

    #[test]
    fn test_parameterized_execute() {
        let conn = people();
        let changed = conn
            .execute(
                "INSERT INTO people (name, seen) VALUES (?, ?)",
                &[Value::Text("Ash".into()), Value::Timestamp(42)],
            )
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(conn.changes().unwrap(), 1);

        let rows = conn
            .query("SELECT seen FROM people WHERE name = ?", &[Value::from("Ash")])
            .unwrap();
        assert_eq!(rows[0].get_named::<i64>("seen").unwrap(), 42);
    }

    #[test]
    fn test_bool_round_trips_as_integer() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE flags (win INTEGER)").unwrap();
        conn.execute("INSERT INTO flags (win) VALUES (?)", &[Value::Bool(true)])
            .unwrap();
        let rows = conn.query("SELECT win FROM flags", &[]).unwrap();
        assert!(rows[0].get_named::<bool>("win").unwrap());
    }

    #[test]
    fn test_query_batch_returns_one_set_per_statement() {
        let conn = people();
        let sets = conn
            .query_batch(&[
                Statement::bare("SELECT name FROM people ORDER BY id"),
                Statement::new(
                    "SELECT id FROM people WHERE name = ?",
                    vec![Value::from("Misty")],
                ),
                Statement::bare("SELECT id FROM people WHERE 0"),
            ])
            .unwrap();
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].len(), 2);
        assert_eq!(sets[1][0].get_named::<i64>("id").unwrap(), 2);
        assert!(sets[2].is_empty());
    }

    #[test]
    fn test_batch_fails_as_a_whole() {
        let conn = people();
        let err = conn
            .query_batch(&[
                Statement::bare("SELECT name FROM people"),
                Statement::bare("SELECT nope FROM people"),
            ])
            .unwrap_err();
        assert_eq!(err.sql(), Some("SELECT nope FROM people"));
    }

    #[test]
    fn test_syntax_error_kind() {
        let conn = people();
        match conn.query("SELEC 1", &[]).unwrap_err() {
            Error::Store(e) => {
                assert_eq!(e.kind, StoreErrorKind::Syntax);
                assert_eq!(e.sql.as_deref(), Some("SELEC 1"));
            }
            other => panic!("expected store error, got {other:?}"),
        }
    }

    #[test]
    fn test_constraint_violation_kind() {
        let conn = people();
        let err = conn
            .execute(
                "INSERT INTO people (id, name) VALUES (?, ?)",
                &[Value::BigInt(1), Value::from("Brock")],
            )
            .unwrap_err();
        match err {
            Error::Store(e) => assert_eq!(e.kind, StoreErrorKind::Constraint),
            other => panic!("expected store error, got {other:?}"),
        }
    }

    #[test]
    fn test_open_missing_read_only_file_fails() {
        let config = SqliteConfig::file("/nonexistent/dir/db.sqlite").flags(OpenFlags::read_only());
        match SqliteConnection::open(&config) {
            Err(Error::Store(e)) => assert_eq!(e.kind, StoreErrorKind::Connect),
            Err(other) => panic!("expected store error, got {other:?}"),
            Ok(_) => panic!("open should fail"),
        }
    }
}
