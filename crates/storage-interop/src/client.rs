//! Cloud Storage client over the XML interoperability API.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials as AwsCredentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use gcsfs_storage::{
    BucketInfo, ClientFactory, ClientSession, Credentials, ListPage, ListRequest, ObjectInfo,
    ObjectStorageClient, StorageError, StorageSettings, UploadSource,
};

use crate::error::{api_error, InteropError};

/// Public XML API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Region name the interoperability endpoint expects in signatures.
const SIGNING_REGION: &str = "auto";

/// Characters left unescaped in an `x-amz-copy-source` value.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// `ObjectStorageClient` implementation using the AWS SDK for Rust against
/// the Cloud Storage XML interoperability endpoint.
///
/// Authenticates with an HMAC key pair or the SDK's default credential chain.
/// Retries and request timeouts come from `StorageSettings::request` and are
/// enforced by the SDK.
pub struct InteropStorageClient {
    /// The underlying S3-protocol client.
    s3_client: S3Client,
}

impl InteropStorageClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `settings` - Endpoint, credentials and request options
    ///
    /// # Errors
    /// Returns `InvalidConfig` for service-account credentials, which the XML
    /// interoperability API does not accept.
    pub async fn new(settings: &StorageSettings) -> Result<Self, StorageError> {
        let credentials: Option<AwsCredentials> = match &settings.credentials {
            Credentials::Hmac {
                access_key_id,
                secret_access_key,
            } => Some(AwsCredentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "gcsfs",
            )),
            Credentials::ApplicationDefault => None,
            Credentials::ServiceAccount { .. } | Credentials::KeyFile(_) => {
                return Err(InteropError::ConfigError(
                    "the XML interoperability endpoint requires HMAC credentials".into(),
                )
                .into());
            }
        };

        let retry_config: RetryConfig =
            RetryConfig::standard().with_max_attempts(settings.request.retries + 1);
        let timeout_config: TimeoutConfig = TimeoutConfig::builder()
            .operation_attempt_timeout(settings.request.timeout)
            .build();
        let endpoint: &str = settings.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);

        let config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(SIGNING_REGION))
            .endpoint_url(endpoint)
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        let config_loader = if let Some(credentials) = credentials {
            config_loader.credentials_provider(credentials)
        } else {
            config_loader
        };

        let sdk_config = config_loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        log::debug!("Connected interoperability client to {}", endpoint);
        Ok(Self {
            s3_client: S3Client::from_conf(s3_config),
        })
    }

    /// Create a client from an existing S3Client (for testing).
    ///
    /// # Arguments
    /// * `s3_client` - Pre-configured S3 client
    pub fn from_client(s3_client: S3Client) -> Self {
        Self { s3_client }
    }
}

/// Encode `bucket/key` for the copy-source header.
fn copy_source(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, utf8_percent_encode(key, COPY_SOURCE))
}

fn epoch_secs(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<i64> {
    dt.and_then(|dt| dt.to_millis().ok()).map(|ms| ms / 1000)
}

#[async_trait]
impl ObjectStorageClient for InteropStorageClient {
    async fn get_bucket(&self, bucket: &str) -> Result<Option<BucketInfo>, StorageError> {
        match self.s3_client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(Some(BucketInfo {
                name: bucket.to_string(),
            })),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    Ok(None)
                } else {
                    Err(api_error(err))
                }
            }
        }
    }

    async fn insert_bucket(&self, project_id: &str, bucket: &str) -> Result<(), StorageError> {
        let project: String = project_id.to_string();
        self.s3_client
            .create_bucket()
            .bucket(bucket)
            .customize()
            .mutate_request(move |request| {
                request
                    .headers_mut()
                    .insert("x-goog-project-id", project.clone());
            })
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.s3_client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectInfo>, StorageError> {
        match self.s3_client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(ObjectInfo {
                bucket: bucket.to_string(),
                name: key.to_string(),
                size: output.content_length().map(|l| l as u64).unwrap_or(0),
                content_type: output.content_type().map(|s| s.to_string()),
                updated: epoch_secs(output.last_modified()),
                etag: output.e_tag().map(|s| s.to_string()),
            })),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    Ok(None)
                } else {
                    Err(api_error(err))
                }
            }
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        request: &ListRequest,
    ) -> Result<ListPage, StorageError> {
        let response = self
            .s3_client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(&request.prefix)
            .set_continuation_token(request.page_token.clone())
            .set_max_keys(request.max_results.map(|m| m as i32))
            .send()
            .await
            .map_err(api_error)?;

        let items: Vec<ObjectInfo> = response
            .contents()
            .iter()
            .map(|obj| ObjectInfo {
                bucket: bucket.to_string(),
                name: obj.key().unwrap_or_default().to_string(),
                size: obj.size().map(|s| s as u64).unwrap_or(0),
                content_type: None,
                updated: epoch_secs(obj.last_modified()),
                etag: obj.e_tag().map(|s| s.to_string()),
            })
            .collect();

        let next_page_token: Option<String> = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(|s| s.to_string())
        } else {
            None
        };

        Ok(ListPage {
            items,
            next_page_token,
        })
    }

    async fn insert_object(
        &self,
        bucket: &str,
        key: &str,
        source: &UploadSource,
        content_type: Option<&str>,
    ) -> Result<ObjectInfo, StorageError> {
        let (body, size): (ByteStream, u64) = match source {
            UploadSource::Bytes(data) => (ByteStream::from(data.clone()), data.len() as u64),
            UploadSource::FilePath(path) => {
                let size: u64 = tokio::fs::metadata(path)
                    .await
                    .map_err(|e| StorageError::io(path.display().to_string(), e))?
                    .len();
                let body: ByteStream =
                    ByteStream::from_path(path)
                        .await
                        .map_err(|e| StorageError::IoError {
                            path: path.display().to_string(),
                            message: e.to_string(),
                        })?;
                (body, size)
            }
        };

        let output = self
            .s3_client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(api_error)?;

        Ok(ObjectInfo {
            bucket: bucket.to_string(),
            name: key.to_string(),
            size,
            content_type: content_type.map(str::to_string),
            updated: None,
            etag: output.e_tag().map(|s| s.to_string()),
        })
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<u64, StorageError> {
        let response = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    api_error(err)
                }
            })?;

        // Create parent directories if needed
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent.display().to_string(), e))?;
        }

        let path_str: String = file_path.display().to_string();
        let mut file: File = File::create(file_path)
            .await
            .map_err(|e| StorageError::io(path_str.clone(), e))?;

        let mut written: u64 = 0;
        let mut body: ByteStream = response.body;
        while let Some(chunk) = body.try_next().await.map_err(|e| StorageError::NetworkError {
            message: e.to_string(),
            retryable: true,
        })? {
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io(path_str.clone(), e))?;
            written += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| StorageError::io(path_str.clone(), e))?;

        Ok(written)
    }

    async fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    api_error(err)
                }
            })?;

        let data: Vec<u8> = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::NetworkError {
                message: e.to_string(),
                retryable: true,
            })?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.s3_client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError> {
        self.s3_client
            .copy_object()
            .copy_source(copy_source(src_bucket, src_key))
            .bucket(dest_bucket)
            .key(dest_key)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}

/// Builds `InteropStorageClient` sessions from settings.
///
/// HMAC keys do not expire, so sessions are permanent.
#[derive(Debug, Clone)]
pub struct InteropClientFactory {
    settings: StorageSettings,
}

impl InteropClientFactory {
    /// Create a factory.
    ///
    /// # Arguments
    /// * `settings` - Settings used for every connection
    pub fn new(settings: StorageSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ClientFactory for InteropClientFactory {
    async fn connect(&self) -> Result<ClientSession, StorageError> {
        let client: InteropStorageClient = InteropStorageClient::new(&self.settings).await?;
        Ok(ClientSession::permanent(Arc::new(client)))
    }
}
