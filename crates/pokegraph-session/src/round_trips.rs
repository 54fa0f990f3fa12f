//! Round-trip accounting and N+1 detection.
//!
//! [`TrackedSource`] wraps any [`RowSource`] and records every exchange with
//! the store in a [`RoundTripTracker`]. A batch counts as one round trip no
//! matter how many statements it carries.
//!
//! The tracker also watches for the N+1 pattern: the same statement text
//! issued over and over with different parameters. When one statement
//! reaches the threshold a warning is logged once.
//!
//! ```ignore
//! let tracked = Rc::new(TrackedSource::new(conn));
//! let source: Rc<dyn RowSource> = tracked.clone();
//! Strategy::OnDemand.load(&source, LoadOptions::default())?;
//! assert_eq!(tracked.stats().round_trips, 20);
//! ```

use pokegraph_core::{Result, Row, RowSource, Statement, Value};
use std::cell::RefCell;
use std::collections::HashMap;

/// Counters collected by a [`RoundTripTracker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundTripStats {
    /// Exchanges with the store (`query` or `query_batch` calls), failed ones included
    pub round_trips: usize,
    /// Statements sent, counting each statement inside a batch
    pub statements: usize,
    /// Rows received
    pub rows: usize,
    /// Distinct statements that reached the N+1 threshold
    pub potential_n1: usize,
}

/// Counts round trips and repeated statements.
#[derive(Debug)]
pub struct RoundTripTracker {
    /// statement text -> times issued
    counts: HashMap<String, usize>,
    threshold: usize,
    stats: RoundTripStats,
}

impl Default for RoundTripTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundTripTracker {
    /// Create a new tracker with default threshold (3).
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            stats: RoundTripStats::default(),
        }
    }

    /// Set the number of repeats of one statement that triggers a warning.
    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Record one exchange carrying `statements`, which returned `rows` rows.
    pub fn record_round_trip<'a>(
        &mut self,
        statements: impl IntoIterator<Item = &'a str>,
        rows: usize,
    ) {
        self.stats.round_trips += 1;
        self.stats.rows += rows;
        for sql in statements {
            self.stats.statements += 1;
            let count = self.counts.entry(sql.to_string()).or_insert(0);
            *count += 1;
            if *count == self.threshold {
                self.stats.potential_n1 += 1;
                tracing::warn!(
                    target: "pokegraph::n1",
                    statement = sql,
                    executions = *count,
                    threshold = self.threshold,
                    "N+1 QUERY PATTERN DETECTED! The same statement keeps running once per parent; \
                     consider an eager strategy."
                );
            }
        }
    }

    /// How many times `sql` was issued.
    #[must_use]
    pub fn count_for(&self, sql: &str) -> usize {
        self.counts.get(sql).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn stats(&self) -> RoundTripStats {
        self.stats
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.stats = RoundTripStats::default();
    }
}

/// A [`RowSource`] that counts what passes through it.
pub struct TrackedSource<S> {
    inner: S,
    tracker: RefCell<RoundTripTracker>,
}

impl<S: RowSource> TrackedSource<S> {
    pub fn new(inner: S) -> Self {
        Self::with_tracker(inner, RoundTripTracker::new())
    }

    pub fn with_tracker(inner: S, tracker: RoundTripTracker) -> Self {
        Self {
            inner,
            tracker: RefCell::new(tracker),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stats(&self) -> RoundTripStats {
        self.tracker.borrow().stats()
    }

    pub fn count_for(&self, sql: &str) -> usize {
        self.tracker.borrow().count_for(sql)
    }

    pub fn reset(&self) {
        self.tracker.borrow_mut().reset();
    }
}

impl<S: RowSource> RowSource for TrackedSource<S> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let result = self.inner.query(sql, params);
        let rows = result.as_ref().map_or(0, Vec::len);
        tracing::debug!(
            target: "pokegraph::round_trip",
            rows,
            failed = result.is_err(),
            "query"
        );
        self.tracker.borrow_mut().record_round_trip([sql], rows);
        result
    }

    fn query_batch(&self, statements: &[Statement]) -> Result<Vec<Vec<Row>>> {
        let result = self.inner.query_batch(statements);
        let rows = result
            .as_ref()
            .map_or(0, |sets| sets.iter().map(Vec::len).sum::<usize>());
        tracing::debug!(
            target: "pokegraph::round_trip",
            statements = statements.len(),
            rows,
            failed = result.is_err(),
            "batch"
        );
        self.tracker
            .borrow_mut()
            .record_round_trip(statements.iter().map(|s| s.sql.as_str()), rows);
        result
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        // Writes are not part of graph loading and are not counted.
        self.inner.execute(sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns `n` single-column rows for every statement.
    struct FixedSource {
        rows_per_statement: usize,
    }

    impl FixedSource {
        fn rows(&self) -> Vec<Row> {
            (0..self.rows_per_statement)
                .map(|i| Row::new(vec!["id".into()], vec![Value::BigInt(i as i64)]))
                .collect()
        }
    }

    impl RowSource for FixedSource {
        fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
            Ok(self.rows())
        }

        fn query_batch(&self, statements: &[Statement]) -> Result<Vec<Vec<Row>>> {
            Ok(statements.iter().map(|_| self.rows()).collect())
        }

        fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
            Ok(0)
        }
    }

    /// Fails every exchange, as a store with a broken schema would.
    struct FailingSource;

    impl RowSource for FailingSource {
        fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
            Err(pokegraph_core::Error::Custom(format!("no such table in '{sql}'")))
        }

        fn query_batch(&self, _statements: &[Statement]) -> Result<Vec<Vec<Row>>> {
            Err(pokegraph_core::Error::Custom("batch rejected".into()))
        }

        fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_failed_exchanges_still_count() {
        let source = TrackedSource::new(FailingSource);
        assert!(source.query("SELECT * FROM moves", &[]).is_err());
        assert!(
            source
                .query_batch(&[Statement::bare("SELECT 1"), Statement::bare("SELECT 2")])
                .is_err()
        );

        let stats = source.stats();
        assert_eq!(stats.round_trips, 2);
        assert_eq!(stats.statements, 3);
        assert_eq!(stats.rows, 0);
        assert_eq!(source.count_for("SELECT * FROM moves"), 1);
    }

    #[test]
    fn test_batch_is_one_round_trip() {
        let source = TrackedSource::new(FixedSource {
            rows_per_statement: 2,
        });
        source.query("SELECT 1", &[]).unwrap();
        let sets = source
            .query_batch(&[
                Statement::bare("SELECT 2"),
                Statement::bare("SELECT 3"),
                Statement::bare("SELECT 4"),
            ])
            .unwrap();
        assert_eq!(sets.len(), 3);

        let stats = source.stats();
        assert_eq!(stats.round_trips, 2);
        assert_eq!(stats.statements, 4);
        assert_eq!(stats.rows, 8);
    }

    #[test]
    fn test_repeated_statement_flags_n1_once() {
        let mut tracker = RoundTripTracker::new().with_threshold(3);
        for _ in 0..5 {
            tracker.record_round_trip(["SELECT * FROM moves WHERE pokemon_id = ?"], 1);
        }
        tracker.record_round_trip(["SELECT * FROM pokemon"], 6);

        assert_eq!(tracker.count_for("SELECT * FROM moves WHERE pokemon_id = ?"), 5);
        assert_eq!(tracker.stats().potential_n1, 1);
        assert_eq!(tracker.stats().round_trips, 6);
    }

    #[test]
    fn test_execute_is_not_counted() {
        let source = TrackedSource::new(FixedSource {
            rows_per_statement: 0,
        });
        source.execute("DELETE FROM pokemon", &[]).unwrap();
        assert_eq!(source.stats(), RoundTripStats::default());
    }

    #[test]
    fn test_reset() {
        let source = TrackedSource::new(FixedSource {
            rows_per_statement: 1,
        });
        source.query("SELECT 1", &[]).unwrap();
        source.reset();
        assert_eq!(source.stats().round_trips, 0);
        assert_eq!(source.count_for("SELECT 1"), 0);
    }
}
