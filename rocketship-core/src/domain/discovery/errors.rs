//! Discovery domain errors

use thiserror::Error;

/// Errors raised by the reconciliation store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Row not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint violated (e.g. concurrent project creation)
    #[error("Conflict on {constraint}: {message}")]
    Conflict { constraint: String, message: String },

    /// Input rejected before reaching the database
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Database operation failed
    #[error("Database error: {message}")]
    DatabaseError { message: String },
}

impl StoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
