//! Error types for storage operations.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Object not found.
    #[error("Object not found: gs://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The service answered with an error response.
    ///
    /// `code` and `message` are filled when the backend decoded them; `body`
    /// carries the raw response payload for later decoding.
    #[error("Storage API error (HTTP {status}): {}", api_detail(.message, .body))]
    Api {
        status: u16,
        code: Option<String>,
        message: Option<String>,
        body: String,
    },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

fn api_detail<'a>(message: &'a Option<String>, body: &'a str) -> &'a str {
    message.as_deref().unwrap_or(body)
}

impl StorageError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::Api { status, .. } => *status == 429 || *status >= 500,
            StorageError::NotFound { .. } => false,
            StorageError::IoError { .. } => false,
            StorageError::InvalidConfig { .. } => false,
            StorageError::Other { .. } => false,
        }
    }

    /// Check if this error is a 404-class "does not exist" answer.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => true,
            StorageError::Api { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// Create an I/O error for a local path.
    ///
    /// # Arguments
    /// * `path` - Local path involved in the failure
    /// * `err` - The underlying I/O error
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        StorageError::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let missing = StorageError::NotFound {
            bucket: "b".into(),
            key: "k".into(),
        };
        assert!(missing.is_not_found());

        let api_404 = StorageError::Api {
            status: 404,
            code: None,
            message: None,
            body: String::new(),
        };
        assert!(api_404.is_not_found());

        let api_403 = StorageError::Api {
            status: 403,
            code: Some("forbidden".into()),
            message: Some("denied".into()),
            body: String::new(),
        };
        assert!(!api_403.is_not_found());
    }

    #[test]
    fn test_retryable() {
        let throttled = StorageError::Api {
            status: 429,
            code: None,
            message: None,
            body: String::new(),
        };
        assert!(throttled.is_retryable());
        assert!(!StorageError::Other { message: "x".into() }.is_retryable());
    }

    #[test]
    fn test_api_display_prefers_message() {
        let err = StorageError::Api {
            status: 403,
            code: None,
            message: Some("denied".into()),
            body: "<xml/>".into(),
        };
        assert_eq!(err.to_string(), "Storage API error (HTTP 403): denied");

        let raw = StorageError::Api {
            status: 500,
            code: None,
            message: None,
            body: "oops".into(),
        };
        assert_eq!(raw.to_string(), "Storage API error (HTTP 500): oops");
    }
}
