//! Error types for weft.

use thiserror::Error;

/// Result type for weft operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for weft operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A persisted artifact failed structural validation (missing columns,
    /// empty table, malformed field, tag outside the declared vocabulary).
    #[error("Validation failed for {artifact}: {reason}")]
    Validation {
        /// The artifact (file or table) that failed validation.
        artifact: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A referenced file or table does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Alignment input is corrupt (tokenizer/text mismatch, bad offsets).
    /// The pipeline cannot proceed past this.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a validation error for a named artifact.
    pub fn validation(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Create a consistency error.
    pub fn consistency(msg: impl Into<String>) -> Self {
        Error::Consistency(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// True when the error is fatal for the current document rather than a
    /// recoverable input problem.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Consistency(_))
    }
}
