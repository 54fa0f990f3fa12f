//! Flat record mapping.

use crate::Result;
use crate::row::{PrefixedRow, Row};
use crate::value::Value;

/// A flat record that maps to one table row.
///
/// Records carry scalar columns and raw foreign keys only. Resolved
/// references live on the graph types built from them.
pub trait Entity: Sized + 'static {
    /// Name used in diagnostics ("Pokemon", "Move", ...).
    const NAME: &'static str;

    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// Column names, primary key first.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> i64;

    /// Decode from one entity's column group.
    #[allow(clippy::result_large_err)]
    fn from_columns(row: &PrefixedRow<'_>) -> Result<Self>;

    /// Column values in `COLUMNS` order, for inserts.
    fn to_values(&self) -> Vec<Value>;

    /// Decode from a row whose columns carry no prefix.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self> {
        Self::from_columns(&row.prefixed(""))
    }
}

/// `alias.col AS prefixcol, ...` for every column of `E`.
pub fn select_list<E: Entity>(alias: &str, prefix: &str) -> String {
    E::COLUMNS
        .iter()
        .map(|col| format!("{alias}.{col} AS {prefix}{col}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `INSERT INTO table (cols) VALUES (?, ...)` for `E`.
pub fn insert_sql<E: Entity>() -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        E::TABLE_NAME,
        E::COLUMNS.join(", "),
        vec!["?"; E::COLUMNS.len()].join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Badge {
        id: i64,
        label: String,
    }

    impl Entity for Badge {
        const NAME: &'static str = "Badge";
        const TABLE_NAME: &'static str = "badges";
        const COLUMNS: &'static [&'static str] = &["id", "label"];

        fn id(&self) -> i64 {
            self.id
        }

        fn from_columns(row: &PrefixedRow<'_>) -> Result<Self> {
            Ok(Self {
                id: row.get("id")?,
                label: row.get("label")?,
            })
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::BigInt(self.id), Value::Text(self.label.clone())]
        }
    }

    #[test]
    fn test_select_list_aliases_columns() {
        assert_eq!(
            select_list::<Badge>("b", "b_"),
            "b.id AS b_id, b.label AS b_label"
        );
    }

    #[test]
    fn test_insert_sql() {
        assert_eq!(
            insert_sql::<Badge>(),
            "INSERT INTO badges (id, label) VALUES (?, ?)"
        );
    }

    #[test]
    fn test_from_row_without_prefix() {
        let row = Row::new(
            vec!["id".into(), "label".into()],
            vec![Value::BigInt(1), Value::Text("Boulder".into())],
        );
        let badge = Badge::from_row(&row).unwrap();
        assert_eq!(badge.id(), 1);
        assert_eq!(badge.label, "Boulder");
        assert_eq!(badge.to_values().len(), Badge::COLUMNS.len());
    }
}
