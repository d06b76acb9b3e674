//! Shared error types for the crate.
//!
//! The analysis kernel itself never returns `Err`: its outcomes are
//! [`crate::analysis::AnalysisOutcome`], booleans and
//! [`crate::core::Confidence`] tags, and "cannot determine" is expressed as a
//! conservative bailout rather than an error. The error type below serves the
//! boundaries that can genuinely fail: the fixture front end and the library
//! configuration loader.

use thiserror::Error;

/// Main error type for astflow operations
#[derive(Debug, Error)]
pub enum Error {
    /// Front-end rejected the input source
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Library configuration could not be read or deserialized
    #[error("Library configuration error: {0}")]
    Library(String),

    /// Generic errors with context
    #[error("{context}: {message}")]
    WithContext { context: String, message: String },

    /// Wrapped external errors
    #[error(transparent)]
    External(#[from] anyhow::Error),

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a parse error with location
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            message: self.to_string(),
        }
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}
