//! Error taxonomy shared by the snapshot, query, and reconcile layers.
//!
//! Library operations return [`EditorError`]; the command layer in `lib.rs`
//! wraps them with `anyhow` context before they reach the operator.

use thiserror::Error;

pub type Result<T, E = EditorError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditorError {
    /// Required input is missing or malformed before any query is built.
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Row is missing its primary key value ({column})")]
    MissingPrimaryKey { column: String },
    #[error("No changes detected or valid columns to update")]
    EmptyChangeSet,
    #[error("No columns provided for insert")]
    EmptyColumnSet,
    #[error("Invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("Configuration error: {0}")]
    Config(String),
    /// Driver, connection, or constraint failure; the message is the driver's.
    #[error("{0}")]
    Storage(String),
}

impl EditorError {
    pub fn validation(message: impl Into<String>) -> Self {
        EditorError::Validation(message.into())
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, EditorError::Storage(_))
    }
}

impl From<rusqlite::Error> for EditorError {
    fn from(err: rusqlite::Error) -> Self {
        EditorError::Storage(err.to_string())
    }
}
