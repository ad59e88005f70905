//! Storage traits/interfaces for object storage operations.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{ListRequest, UploadSource};

/// Information about a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
}

/// Information about an object from get/list operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Bucket holding the object.
    pub bucket: String,
    /// Full object key.
    pub name: String,
    /// Object size in bytes.
    pub size: u64,
    /// Content type recorded at upload.
    pub content_type: Option<String>,
    /// Last modified timestamp (Unix epoch seconds).
    pub updated: Option<i64>,
    /// ETag or generation marker.
    pub etag: Option<String>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects in store order.
    pub items: Vec<ObjectInfo>,
    /// Token for the next page, None when the listing is exhausted.
    pub next_page_token: Option<String>,
}

/// Low-level object storage operations - implemented by each backend.
///
/// Probes (`get_bucket`, `get_object`) answer `Ok(None)` for a missing
/// resource instead of failing.
#[async_trait]
pub trait ObjectStorageClient: Send + Sync {
    /// Fetch bucket metadata. Returns None if the bucket doesn't exist.
    async fn get_bucket(&self, bucket: &str) -> Result<Option<BucketInfo>, StorageError>;

    /// Create a bucket owned by `project_id`.
    async fn insert_bucket(&self, project_id: &str, bucket: &str) -> Result<(), StorageError>;

    /// Delete an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Fetch object metadata. Returns None if the object doesn't exist.
    async fn get_object(&self, bucket: &str, key: &str)
        -> Result<Option<ObjectInfo>, StorageError>;

    /// Fetch one page of objects whose key starts with `request.prefix`.
    async fn list_objects(
        &self,
        bucket: &str,
        request: &ListRequest,
    ) -> Result<ListPage, StorageError>;

    /// Create or replace an object.
    async fn insert_object(
        &self,
        bucket: &str,
        key: &str,
        source: &UploadSource,
        content_type: Option<&str>,
    ) -> Result<ObjectInfo, StorageError>;

    /// Download object content into a local file, returning bytes written.
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<u64, StorageError>;

    /// Download object content into memory.
    async fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Delete a single object.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Delete a batch of objects.
    ///
    /// The default issues one delete per key in order and stops at the
    /// first failure.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.delete_object(bucket, key).await?;
        }
        Ok(())
    }

    /// Server-side copy of one object.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError>;
}
