//! Persistent eligibility queue of pending bundles.

pub mod row;
pub mod table;

use thiserror::Error;

pub use row::{BundleRow, BundleStatus, NewBundleRow};
pub use table::{BundleTable, QueryGroup};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to (de)serialise column {column}: {source}")]
    Serialization {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value {value:?} in column {column}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("Row {0} not found")]
    RowNotFound(i64),
}
