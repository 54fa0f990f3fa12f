//! Result rows and column-prefixed views over them.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows in a result set.
///
/// Wrapped in `Arc` so every row of one statement shares a single copy.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column names in order
    names: Vec<String>,
    /// Name -> index mapping for O(1) lookup
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Check if a column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row returned by a [`RowSource`](crate::RowSource).
///
/// Values are addressed by column name. Wide joins alias each entity's
/// columns under a prefix (`p_id`, `t_name`, ...) and are read back through
/// [`Row::prefixed`].
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    ///
    /// For multiple rows from the same result set, prefer `with_columns`.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Get a typed value by column name.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
                rust_type: None,
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// View this row's columns under `prefix`.
    ///
    /// An empty prefix reads the columns as they are named.
    pub fn prefixed<'a>(&'a self, prefix: &'a str) -> PrefixedRow<'a> {
        PrefixedRow { row: self, prefix }
    }

    /// Get all column names.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// The columns of one entity inside a (possibly wider) row.
#[derive(Debug, Clone, Copy)]
pub struct PrefixedRow<'a> {
    row: &'a Row,
    prefix: &'a str,
}

impl<'a> PrefixedRow<'a> {
    pub fn prefix(&self) -> &'a str {
        self.prefix
    }

    fn column(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Whether the row carries this group's `name` column at all.
    pub fn has_column(&self, name: &str) -> bool {
        self.row.contains_column(&self.column(name))
    }

    /// `true` when the group's key column is present and non-NULL.
    ///
    /// Outer joins with no match yield an all-NULL group.
    pub fn is_present(&self, key_column: &str) -> bool {
        self.row
            .get_by_name(&self.column(key_column))
            .is_some_and(|v| !v.is_null())
    }

    #[allow(clippy::result_large_err)]
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T> {
        self.row.get_named(&self.column(name))
    }
}

/// Trait for converting from a `Value` to a typed value.
pub trait FromValue: Sized {
    /// Convert from a Value, returning an error if the conversion fails.
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
        rust_type: None,
    })
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(*v),
            Value::BigInt(v) => i32::try_from(*v).map_err(|_| Error::Type(TypeError {
                expected: "i32",
                actual: format!("out of range value {}", v),
                column: None,
                rust_type: None,
            })),
            _ => Err(mismatch("i32", value)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch("Vec<u8>", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined_row() -> Row {
        Row::new(
            vec![
                "p_id".into(),
                "p_name".into(),
                "m_id".into(),
                "m_name".into(),
            ],
            vec![
                Value::BigInt(4),
                Value::Text("Pikachu".into()),
                Value::Null,
                Value::Null,
            ],
        )
    }

    #[test]
    fn test_get_named_reports_missing_column() {
        let row = joined_row();
        let err = row.get_named::<i64>("t_id").unwrap_err();
        match err {
            Error::Type(te) => {
                assert_eq!(te.column.as_deref(), Some("t_id"));
                assert!(te.actual.contains("not found"));
            }
            other => panic!("expected type error, got {other:?}"),
        }
    }

    #[test]
    fn test_prefixed_reads_group_columns() {
        let row = joined_row();
        let pokemon = row.prefixed("p_");
        assert_eq!(pokemon.get::<i64>("id").unwrap(), 4);
        assert_eq!(pokemon.get::<String>("name").unwrap(), "Pikachu");
        assert!(pokemon.is_present("id"));
    }

    #[test]
    fn test_outer_join_miss_is_not_present() {
        let row = joined_row();
        let moves = row.prefixed("m_");
        assert!(moves.has_column("id"));
        assert!(!moves.is_present("id"));
        assert!(!row.prefixed("w_").has_column("id"));
    }

    #[test]
    fn test_type_mismatch_names_column() {
        let row = joined_row();
        let err = row.prefixed("p_").get::<i64>("name").unwrap_err();
        assert!(err.to_string().contains("p_name"));
    }

    #[test]
    fn test_option_from_null() {
        let row = joined_row();
        let name: Option<String> = row.get_named("m_name").unwrap();
        assert!(name.is_none());
    }

    #[test]
    fn test_with_columns_shares_metadata() {
        let first = joined_row();
        let second = Row::with_columns(
            first.column_info(),
            vec![Value::BigInt(5), Value::Null, Value::Null, Value::Null],
        );
        assert!(Arc::ptr_eq(&first.column_info(), &second.column_info()));
        assert_eq!(second.get_named::<i64>("p_id").unwrap(), 5);
    }
}
