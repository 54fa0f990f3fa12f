//! Core types and traits for pokegraph.
//!
//! This crate provides the foundations the other crates build on:
//!
//! - `Value` and `Row` for dynamically typed result data
//! - `RowSource` for the synchronous store interface
//! - `Entity` for flat record mapping
//! - `Lazy` for memoized relations
//! - `Error` for everything that can go wrong

pub mod entity;
pub mod error;
pub mod lazy;
pub mod row;
pub mod source;
pub mod value;

pub use entity::{Entity, insert_sql, select_list};
pub use error::{
    ConfigError, DanglingReferenceError, DuplicateRootError, Error, NotLoadedError, Result,
    StoreError, StoreErrorKind, TypeError,
};
pub use lazy::Lazy;
pub use row::{ColumnInfo, FromValue, PrefixedRow, Row};
pub use source::{RowSource, Statement, in_list};
pub use value::Value;
