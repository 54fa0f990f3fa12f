//! Error types for graph loading.

use std::fmt;

/// The primary error type for all pokegraph operations.
#[derive(Debug)]
pub enum Error {
    /// Store-level failures (open, prepare, bind, step)
    Store(StoreError),
    /// Row/column conversion errors
    Type(TypeError),
    /// A foreign key names an entity that was never materialized
    DanglingReference(DanglingReferenceError),
    /// The same root entity was linked twice
    DuplicateRoot(DuplicateRootError),
    /// A relation was read while on-demand fetching is disabled
    NotLoaded(NotLoadedError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Failed to open the database
    Connect,
    /// Statement failed to compile
    Syntax,
    /// Parameter could not be bound
    Bind,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Database is locked or busy
    Busy,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

/// A foreign key that could not be resolved through the identity map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReferenceError {
    /// Entity holding the foreign key, e.g. "Move"
    pub entity: &'static str,
    pub id: i64,
    /// Foreign key column, e.g. "damage_type_id"
    pub field: &'static str,
    /// Entity the key points at, e.g. "PokeType"
    pub target: &'static str,
    pub target_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRootError {
    pub entity: &'static str,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotLoadedError {
    pub entity: &'static str,
    pub id: i64,
    pub relation: &'static str,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Store(e) => e.sql.as_deref(),
            _ => None,
        }
    }

    /// Does this error come from graph linking rather than the store?
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, Error::DanglingReference(_) | Error::DuplicateRoot(_))
    }
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sql: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(e) => write!(f, "Store error: {}", e),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::DanglingReference(e) => write!(f, "Dangling reference: {}", e),
            Error::DuplicateRoot(e) => write!(f, "Duplicate root: {}", e),
            Error::NotLoaded(e) => write!(f, "Relation not loaded: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "{} (while running `{}`)", self.message, sql),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for DanglingReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} has {} = {} but no {} with that id was loaded",
            self.entity, self.id, self.field, self.target_id, self.target
        )
    }
}

impl fmt::Display for DuplicateRootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} was linked more than once", self.entity, self.id)
    }
}

impl fmt::Display for NotLoadedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} on id {} was not eagerly loaded and on-demand fetching is disabled",
            self.entity, self.relation, self.id
        )
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DanglingReferenceError {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<DanglingReferenceError> for Error {
    fn from(err: DanglingReferenceError) -> Self {
        Error::DanglingReference(err)
    }
}

impl From<DuplicateRootError> for Error {
    fn from(err: DuplicateRootError) -> Self {
        Error::DuplicateRoot(err)
    }
}

impl From<NotLoadedError> for Error {
    fn from(err: NotLoadedError) -> Self {
        Error::NotLoaded(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for pokegraph operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_carries_sql() {
        let err = Error::from(
            StoreError::new(StoreErrorKind::Syntax, "near \"SELEC\": syntax error")
                .with_sql("SELEC 1"),
        );
        assert_eq!(err.sql(), Some("SELEC 1"));
        assert!(err.to_string().contains("SELEC 1"));
        assert!(!err.is_integrity_error());
    }

    #[test]
    fn dangling_reference_message_names_both_sides() {
        let err = Error::from(DanglingReferenceError {
            entity: "Move",
            id: 12,
            field: "damage_type_id",
            target: "PokeType",
            target_id: 99,
        });
        let text = err.to_string();
        assert!(text.contains("Move 12"));
        assert!(text.contains("damage_type_id = 99"));
        assert!(text.contains("PokeType"));
        assert!(err.is_integrity_error());
    }

    #[test]
    fn io_error_is_source() {
        let err = Error::from(std::io::Error::other("disk"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
