//! Error types for the interoperability backend.

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use gcsfs_storage::StorageError;
use thiserror::Error;

/// Errors specific to the interoperability client.
#[derive(Error, Debug)]
pub enum InteropError {
    /// AWS SDK error that never reached the service.
    #[error("AWS SDK error: {message}")]
    SdkError { message: String, retryable: bool },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<InteropError> for StorageError {
    fn from(err: InteropError) -> Self {
        match err {
            InteropError::SdkError { message, retryable } => {
                StorageError::NetworkError { message, retryable }
            }
            InteropError::ConfigError(message) => StorageError::InvalidConfig { message },
            InteropError::IoError(e) => StorageError::IoError {
                path: String::new(),
                message: e.to_string(),
            },
        }
    }
}

/// Convert an SDK failure into a `StorageError`.
///
/// Failures that carry an HTTP response become `StorageError::Api` with the
/// status, decoded error code/message and raw body. Failures without a
/// response (timeouts, connection errors) become network errors.
pub(crate) fn api_error<E>(err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let Some(response) = err.raw_response() else {
        let retryable: bool = matches!(
            err,
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
        );
        return InteropError::SdkError {
            message: DisplayErrorContext(&err).to_string(),
            retryable,
        }
        .into();
    };

    let status: u16 = response.status().as_u16();
    let body: String = response
        .body()
        .bytes()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default();

    StorageError::Api {
        status,
        code: err.code().map(str::to_string),
        message: err.message().map(str::to_string),
        body,
    }
}
