//! Shared data structures for storage operations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gcsfs_common::{DEFAULT_REQUEST_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Configuration settings for storage clients.
#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    /// Project that owns buckets created through this client.
    pub project_id: Option<String>,
    /// How the client authenticates.
    pub credentials: Credentials,
    /// Retry/timeout options applied to every request.
    pub request: RequestOptions,
    /// Service endpoint override (None for the public endpoint).
    pub endpoint: Option<String>,
}

impl StorageSettings {
    /// Create settings for a project using ambient credentials.
    ///
    /// # Arguments
    /// * `project_id` - Project identifier
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    /// Set the credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set request options.
    pub fn with_request_options(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }

    /// Set an endpoint override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replace `Credentials::KeyFile` with the service account it contains.
    ///
    /// The key file's `project_id` fills `project_id` when the settings had none.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn resolve_key_file(mut self) -> Result<Self, StorageError> {
        if let Credentials::KeyFile(ref path) = self.credentials {
            let key: ServiceAccountKey = ServiceAccountKey::from_file(path)?;
            if self.project_id.is_none() {
                self.project_id = key.project_id.clone();
            }
            self.credentials = Credentials::ServiceAccount {
                client_email: key.client_email,
                private_key: key.private_key,
            };
        }
        Ok(self)
    }
}

/// Credential sources understood by the storage backends.
///
/// The interop backend accepts `Hmac` and `ApplicationDefault` only.
/// `ServiceAccount` and `KeyFile` are parsed and carried in settings, but no
/// backend shipped in this workspace signs requests with them; pass them to
/// a custom `ClientFactory`.
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    /// Service account email and PEM private key. Rejected by the interop backend.
    ServiceAccount {
        client_email: String,
        private_key: String,
    },
    /// Path to a JSON credential bundle. Rejected by the interop backend.
    KeyFile(PathBuf),
    /// HMAC key pair for the XML interoperability endpoint.
    Hmac {
        access_key_id: String,
        secret_access_key: String,
    },
    /// Whatever the environment provides.
    #[default]
    ApplicationDefault,
}

/// Service account JSON credential bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    /// Project the account belongs to.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Service account email.
    pub client_email: String,
    /// PEM-encoded private key.
    pub private_key: String,
}

impl ServiceAccountKey {
    /// Parse a key bundle from JSON text.
    ///
    /// # Arguments
    /// * `json` - Contents of the key file
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        serde_json::from_str(json).map_err(|e| StorageError::InvalidConfig {
            message: format!("Invalid service account key: {}", e),
        })
    }

    /// Load a key bundle from a file.
    ///
    /// # Arguments
    /// * `path` - Path to the JSON key file
    pub fn from_file(path: &Path) -> Result<Self, StorageError> {
        let json: String = std::fs::read_to_string(path).map_err(|e| StorageError::InvalidConfig {
            message: format!("Cannot read key file {}: {}", path.display(), e),
        })?;
        Self::from_json(&json)
    }
}

/// Retry and timeout options passed to every remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Number of retries after the first attempt.
    pub retries: u32,
    /// Timeout for a single request.
    pub timeout: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_REQUEST_RETRIES,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Source of data for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// In-memory bytes.
    Bytes(Vec<u8>),
    /// Read from file at path.
    FilePath(PathBuf),
}

impl UploadSource {
    /// Load the full payload into memory.
    pub async fn read_all(&self) -> Result<Vec<u8>, StorageError> {
        match self {
            UploadSource::Bytes(data) => Ok(data.clone()),
            UploadSource::FilePath(path) => tokio::fs::read(path)
                .await
                .map_err(|e| StorageError::io(path.display().to_string(), e)),
        }
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(data: Vec<u8>) -> Self {
        UploadSource::Bytes(data)
    }
}

impl From<&str> for UploadSource {
    fn from(data: &str) -> Self {
        UploadSource::Bytes(data.as_bytes().to_vec())
    }
}

/// Bucket listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Continuation token from a previous page.
    pub page_token: Option<String>,
    /// Upper bound on the number of items in this page.
    pub max_results: Option<u32>,
}

impl ListRequest {
    /// List everything under a prefix.
    ///
    /// # Arguments
    /// * `prefix` - Key prefix to match
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Continue from a previous page.
    pub fn with_page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }

    /// Cap the page size.
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_request_options_default() {
        let options = RequestOptions::default();
        assert_eq!(options.retries, 5);
        assert_eq!(options.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_service_account_key_from_json() {
        let key = ServiceAccountKey::from_json(
            r#"{"project_id":"proj","client_email":"svc@proj.iam","private_key":"PEM"}"#,
        )
        .unwrap();
        assert_eq!(key.project_id.as_deref(), Some("proj"));
        assert_eq!(key.client_email, "svc@proj.iam");
        assert_eq!(key.private_key, "PEM");
    }

    #[test]
    fn test_service_account_key_invalid_json() {
        let err = ServiceAccountKey::from_json("{not json").unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig { .. }));
    }

    #[test]
    fn test_resolve_key_file_fills_project() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"project_id":"from-file","client_email":"a@b","private_key":"k"}}"#
        )
        .unwrap();

        let settings = StorageSettings::default()
            .with_credentials(Credentials::KeyFile(file.path().to_path_buf()))
            .resolve_key_file()
            .unwrap();

        assert_eq!(settings.project_id.as_deref(), Some("from-file"));
        assert!(matches!(
            settings.credentials,
            Credentials::ServiceAccount { ref client_email, .. } if client_email == "a@b"
        ));
    }

    #[test]
    fn test_resolve_key_file_keeps_explicit_project() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"project_id":"from-file","client_email":"a@b","private_key":"k"}}"#
        )
        .unwrap();

        let settings = StorageSettings::new("explicit")
            .with_credentials(Credentials::KeyFile(file.path().to_path_buf()))
            .resolve_key_file()
            .unwrap();

        assert_eq!(settings.project_id.as_deref(), Some("explicit"));
    }

    #[test]
    fn test_list_request_builder() {
        let request = ListRequest::prefix("a/")
            .with_page_token(Some("t".into()))
            .with_max_results(20);
        assert_eq!(request.prefix, "a/");
        assert_eq!(request.page_token.as_deref(), Some("t"));
        assert_eq!(request.max_results, Some(20));
    }
}
