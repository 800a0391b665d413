//! Error types for airscope-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or querying a schema
#[derive(Debug, Error)]
pub enum Error {
    /// Schema JSON could not be decoded
    #[error("Invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema file could not be read
    #[error("Failed to read schema: {0}")]
    Io(#[from] std::io::Error),

    /// Two tables share an ID
    #[error("Duplicate table ID: {0}")]
    DuplicateTableId(String),

    /// Two fields of one table share an ID
    #[error("Duplicate field ID {field} in table {table}")]
    DuplicateFieldId { table: String, field: String },

    /// Table not found by ID or name
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Field not found by ID or name
    #[error("Field not found: {0}")]
    FieldNotFound(String),
}
