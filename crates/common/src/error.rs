//! Shared error types used across gcsfs crates.

use thiserror::Error;

/// Path-related errors shared across crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path is invalid or malformed.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The invalid path.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },
}

impl PathError {
    /// Create an InvalidPath error.
    ///
    /// # Arguments
    /// * `path` - The rejected path
    /// * `reason` - Human-readable explanation
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The path that failed to parse.
    pub fn path(&self) -> &str {
        match self {
            Self::InvalidPath { path, .. } => path,
        }
    }
}
