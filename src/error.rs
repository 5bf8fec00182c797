//! Error types for the vector database.
//!
//! Every public API returns [`VectorDbError`] through the [`Result`] alias.
//! The variants form the complete taxonomy surfaced to adapters; match on
//! them to distinguish user errors (dimension mismatch, duplicate id, missing
//! id) from configuration, persistence, and internal failures.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for all database operations.
pub type Result<T> = std::result::Result<T, VectorDbError>;

/// Boxed error cause carried by the persistence and database variants.
pub type ErrorSource = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error enum for all database operations.
#[derive(Debug, Error)]
pub enum VectorDbError {
    /// A vector's length does not match the configured dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An insert targeted an id that is already present.
    #[error("vector already exists: {id}")]
    Duplicate { id: String },

    /// The requested id is not in the database.
    #[error("vector not found: {id}")]
    NotFound { id: String },

    /// A configuration field failed validation at construction time.
    #[error("invalid config for field {field} (value: {value}): {reason}")]
    InvalidConfig {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// A snapshot save or load step failed. In-memory state is unaffected.
    #[error("persistence error during {operation} (path: {}): {source}", .path.display())]
    Persistence {
        operation: &'static str,
        path: PathBuf,
        source: ErrorSource,
    },

    /// An unexpected internal condition, e.g. a metadata entry with no
    /// matching index node. The failed operation leaves state untouched.
    #[error("database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        source: ErrorSource,
    },
}

impl VectorDbError {
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    pub fn duplicate(id: impl Into<String>) -> Self {
        Self::Duplicate { id: id.into() }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn invalid_config(
        field: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn persistence(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: impl Into<ErrorSource>,
    ) -> Self {
        Self::Persistence {
            operation,
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn database(operation: &'static str, source: impl Into<ErrorSource>) -> Self {
        Self::Database {
            operation,
            source: source.into(),
        }
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a duplicate-id error.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Returns true if this is a dimension-mismatch error.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }

    /// Returns true for errors caused by the caller's input rather than the
    /// database itself.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. }
                | Self::Duplicate { .. }
                | Self::NotFound { .. }
                | Self::InvalidConfig { .. }
        )
    }
}
