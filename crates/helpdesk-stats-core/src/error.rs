//! Domain error types.
//!
//! Storage failures are not modelled here; they travel as
//! `anyhow::Error` in the storage crate and are reported as internal
//! errors. Only failures a caller can act on get a variant.

use thiserror::Error;

/// Errors raised by analytics and taxonomy operations before or instead
/// of touching storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatsError {
    /// Required input is missing or malformed. Nothing was changed.
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// The write would create a duplicate (section, label) option.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The addressed entry, option, or draft does not exist.
    #[error("{0} not found")]
    NotFound(String),
}

impl StatsError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        StatsError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        StatsError::NotFound(what.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        StatsError::Conflict(message.into())
    }
}
