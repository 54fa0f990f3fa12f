//! Row source abstraction.
//!
//! - [`RowSource`] - the synchronous store interface every strategy reads through
//! - [`Statement`] - SQL text plus positional parameters, the unit of a batch
//! - [`in_list`] - builds a parameterized `IN (...)` filter for an id set
//!
//! A row source is opaque: it returns rows or a [`StoreError`](crate::StoreError)
//! and never retries.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// One SQL statement with its positional (`?`) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A statement without parameters.
    pub fn bare(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// A synchronous store that returns flat rows.
///
/// Each call to [`query`](RowSource::query) or
/// [`query_batch`](RowSource::query_batch) is one round trip, regardless of
/// how many statements a batch carries. Implementations must be object safe
/// so graphs can hold an `Rc<dyn RowSource>` for on-demand loading.
pub trait RowSource {
    /// Run one statement and return its rows in store order.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run several statements in a single round trip.
    ///
    /// Returns one row set per statement, in statement order.
    fn query_batch(&self, statements: &[Statement]) -> Result<Vec<Vec<Row>>>;

    /// Run a statement that returns no rows. Returns the number of rows changed.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;
}

impl<S: RowSource + ?Sized> RowSource for &S {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn query_batch(&self, statements: &[Statement]) -> Result<Vec<Vec<Row>>> {
        (**self).query_batch(statements)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }
}

impl<S: RowSource + ?Sized> RowSource for std::rc::Rc<S> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn query_batch(&self, statements: &[Statement]) -> Result<Vec<Vec<Row>>> {
        (**self).query_batch(statements)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }
}

/// Build `column IN (?, ?, ...)` and its parameters for `ids`.
///
/// An empty id set yields the always-false predicate `0`, which SQLite
/// accepts where a boolean expression is expected.
pub fn in_list(column: &str, ids: &[i64]) -> (String, Vec<Value>) {
    if ids.is_empty() {
        return ("0".to_string(), Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let params = ids.iter().copied().map(Value::BigInt).collect();
    (format!("{} IN ({})", column, placeholders), params)
}
