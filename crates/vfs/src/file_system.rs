//! Filesystem operations over a flat bucket keyspace.
//!
//! A directory is a key prefix ending in `/`. It exists when a zero-byte
//! marker object is stored at the prefix, or when at least one object key
//! starts with it. Every mutation waits until its effect is visible to the
//! same probes callers use, so a successful return is observable at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gcsfs_common::{add_path_delimiter, ObjectPath, DEFAULT_STRING_CONTENT_TYPE};
use gcsfs_storage::{
    ClientHandle, ListPage, ListRequest, ObjectInfo, ObjectStorageClient, UploadSource,
};
use tempfile::{NamedTempFile, TempPath};

use crate::consistency::ConsistencyWaiter;
use crate::error::{FsError, Result};
use crate::options::VfsOptions;
use crate::translate::absorb_not_found;

/// Filesystem view over one or more buckets, addressed by `gs://` paths.
///
/// The storage client is obtained from a per-instance `ClientHandle`, so
/// sessions are refreshed without process-wide state.
pub struct VirtualFileSystem {
    handle: ClientHandle,
    options: VfsOptions,
    waiter: ConsistencyWaiter,
}

impl VirtualFileSystem {
    /// Create a filesystem.
    ///
    /// # Arguments
    /// * `handle` - Source of storage clients
    /// * `options` - Wait, probe and staging configuration
    pub fn new(handle: ClientHandle, options: VfsOptions) -> Self {
        let waiter: ConsistencyWaiter = ConsistencyWaiter::new(options.wait.clone());
        Self {
            handle,
            options,
            waiter,
        }
    }

    /// Create a filesystem over a client that never expires.
    pub fn from_client(client: Arc<dyn ObjectStorageClient>, options: VfsOptions) -> Self {
        Self::new(ClientHandle::fixed(client), options)
    }

    pub fn options(&self) -> &VfsOptions {
        &self.options
    }

    async fn client(&self) -> Result<Arc<dyn ObjectStorageClient>> {
        Ok(self.handle.client().await?)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether an object exists at the exact key or the path is a directory.
    ///
    /// # Arguments
    /// * `path` - `gs://bucket/key` path
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let path: ObjectPath = ObjectPath::parse(path)?;
        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        path_exists(client.as_ref(), &path, self.options.directory_probe_limit).await
    }

    /// Whether the path denotes a directory.
    ///
    /// The bucket root is a directory when the bucket exists. Any other path
    /// is a directory when its marker exists or a short listing under its
    /// prefix is non-empty.
    ///
    /// # Arguments
    /// * `path` - `gs://bucket/key` path
    pub async fn is_directory(&self, path: &str) -> Result<bool> {
        let path: ObjectPath = ObjectPath::parse(path)?;
        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        directory_exists(client.as_ref(), &path, self.options.directory_probe_limit).await
    }

    /// All objects under the path's prefix, following every continuation
    /// token. Marker objects are included. Each call lists from scratch.
    ///
    /// # Arguments
    /// * `path` - Directory path (or bucket root)
    pub async fn list_entries(&self, path: &str) -> Result<Vec<ObjectInfo>> {
        let path: ObjectPath = ObjectPath::parse(path)?;
        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        list_all(client.as_ref(), path.bucket(), &path.directory_prefix()).await
    }

    /// Whether a bucket exists.
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        bucket_present(client.as_ref(), bucket).await
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Remove an object or a directory.
    ///
    /// A key ending in `/` always names the directory, so the marker and all
    /// children are removed together.
    ///
    /// # Arguments
    /// * `path` - Path to remove
    /// * `recursive` - Must be true to remove a directory
    ///
    /// # Returns
    /// False when nothing exists at the path.
    pub async fn remove(&self, path: &str, recursive: bool) -> Result<bool> {
        let path: ObjectPath = ObjectPath::parse(path)?;
        if path.is_root() {
            return Err(FsError::RootOperation {
                path: path.to_string(),
                operation: "remove",
            });
        }

        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        let c: &dyn ObjectStorageClient = client.as_ref();
        let limit: u32 = self.options.directory_probe_limit;
        let (bucket, key): (&str, &str) = (path.bucket(), path.key());

        if !key.ends_with('/') && object_exists(c, bucket, key).await? {
            c.delete_object(bucket, key).await?;
            tracing::debug!("Removed object {}", path);
            self.waiter
                .wait_until(&format!("{} to disappear", path), move || {
                    object_missing(c, bucket, key)
                })
                .await?;
            return Ok(true);
        }

        if !directory_exists(c, &path, limit).await? {
            return Ok(false);
        }
        if !recursive {
            return Err(FsError::RecursiveRequired {
                path: path.to_string(),
            });
        }

        let keys: Vec<String> = list_all(c, bucket, &path.directory_prefix())
            .await?
            .into_iter()
            .map(|info| info.name)
            .collect();
        c.delete_objects(bucket, &keys).await?;
        tracing::debug!("Removed {} objects under {}", keys.len(), path);

        let dir: &ObjectPath = &path;
        self.waiter
            .wait_until(&format!("directory {} to disappear", path), move || {
                directory_missing(c, dir, limit)
            })
            .await?;
        Ok(true)
    }

    /// Create a directory marker.
    ///
    /// # Arguments
    /// * `path` - Directory path
    /// * `raise_if_exist` - Fail with `AlreadyExists` if anything is at the path
    ///
    /// # Returns
    /// False when the directory already exists.
    ///
    /// # Errors
    /// `NotADirectory` when an object (not a directory) exists at the path.
    pub async fn mkdir(&self, path: &str, raise_if_exist: bool) -> Result<bool> {
        let path: ObjectPath = ObjectPath::parse(path)?;
        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        let c: &dyn ObjectStorageClient = client.as_ref();
        let limit: u32 = self.options.directory_probe_limit;

        if path_exists(c, &path, limit).await? {
            if raise_if_exist {
                return Err(FsError::AlreadyExists {
                    path: path.to_string(),
                });
            }
            if !directory_exists(c, &path, limit).await? {
                return Err(FsError::NotADirectory {
                    path: path.to_string(),
                });
            }
            return Ok(false);
        }

        if path.is_root() {
            return Err(FsError::RootOperation {
                path: path.to_string(),
                operation: "create a marker at",
            });
        }

        let marker: String = path.directory_prefix();
        c.insert_object(
            path.bucket(),
            &marker,
            &UploadSource::Bytes(Vec::new()),
            None,
        )
        .await?;
        tracing::debug!("Created directory marker {}", path.as_directory());

        let (bucket, key): (&str, &str) = (path.bucket(), marker.as_str());
        self.waiter
            .wait_until(&format!("marker {} to appear", path.as_directory()), move || {
                object_exists(c, bucket, key)
            })
            .await?;
        Ok(true)
    }

    /// Copy an object or a whole directory.
    ///
    /// Directory entries are copied one call at a time, each to the same
    /// suffix under the destination prefix. There is no atomicity across
    /// entries.
    ///
    /// # Arguments
    /// * `src` - Source object or directory
    /// * `dest` - Destination path
    /// * `raise_if_exist` - Fail with `AlreadyExists` if `dest` exists
    pub async fn copy(&self, src: &str, dest: &str, raise_if_exist: bool) -> Result<()> {
        let src: ObjectPath = ObjectPath::parse(src)?;
        let dest: ObjectPath = ObjectPath::parse(dest)?;
        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        let c: &dyn ObjectStorageClient = client.as_ref();
        let limit: u32 = self.options.directory_probe_limit;

        if raise_if_exist && path_exists(c, &dest, limit).await? {
            return Err(FsError::AlreadyExists {
                path: dest.to_string(),
            });
        }

        let dest_bucket: &str = dest.bucket();

        if directory_exists(c, &src, limit).await? {
            let src_prefix: String = src.directory_prefix();
            let dest_prefix: String = dest.directory_prefix();
            let entries: Vec<ObjectInfo> = list_all(c, src.bucket(), &src_prefix).await?;

            let mut dest_keys: Vec<String> = Vec::with_capacity(entries.len());
            for entry in &entries {
                let suffix: &str = entry.name.strip_prefix(&src_prefix).unwrap_or(&entry.name);
                let dest_key: String = format!("{}{}", dest_prefix, suffix);
                // The bucket root has no marker of its own.
                if dest_key.is_empty() {
                    continue;
                }
                c.copy_object(src.bucket(), &entry.name, dest_bucket, &dest_key)
                    .await?;
                dest_keys.push(dest_key);
            }
            tracing::debug!("Copied {} objects from {} to {}", dest_keys.len(), src, dest);

            let keys: &[String] = &dest_keys;
            self.waiter
                .wait_until(&format!("copies under {} to appear", dest), move || {
                    all_objects_exist(c, dest_bucket, keys)
                })
                .await?;
        } else {
            c.copy_object(src.bucket(), src.key(), dest_bucket, dest.key())
                .await?;
            tracing::debug!("Copied {} to {}", src, dest);

            let dest_key: &str = dest.key();
            self.waiter
                .wait_until(&format!("{} to appear", dest), move || {
                    object_exists(c, dest_bucket, dest_key)
                })
                .await?;
        }
        Ok(())
    }

    /// Copy then remove the source.
    ///
    /// Not atomic. An error from the copy phase means the source is intact
    /// (the destination may be partially populated for directories).
    /// `FsError::PartialMove` means everything was copied but the source
    /// could not be removed, so both locations are populated.
    ///
    /// # Arguments
    /// * `src` - Source object or directory
    /// * `dest` - Destination path
    /// * `raise_if_exist` - Fail with `AlreadyExists` if `dest` exists
    pub async fn move_path(&self, src: &str, dest: &str, raise_if_exist: bool) -> Result<()> {
        let src_path: ObjectPath = ObjectPath::parse(src)?;
        if src_path.is_root() {
            return Err(FsError::RootOperation {
                path: src_path.to_string(),
                operation: "move",
            });
        }
        // The recursive remove of the source would also delete the copies.
        let dest_path: ObjectPath = ObjectPath::parse(dest)?;
        if dest_path.bucket() == src_path.bucket()
            && add_path_delimiter(dest_path.key()).starts_with(&src_path.directory_prefix())
        {
            return Err(FsError::MoveIntoSelf {
                src: src_path.to_string(),
                dest: dest_path.to_string(),
            });
        }

        self.copy(src, dest, raise_if_exist).await?;

        match self.remove(src, true).await {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!("Moved {} to {} but the source remains: {}", src, dest, err);
                Err(FsError::PartialMove {
                    src: src.to_string(),
                    dest: dest.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }

    /// Store an object and wait until it is visible.
    ///
    /// # Arguments
    /// * `source` - Bytes or local file to upload
    /// * `path` - Destination object path
    /// * `content_type` - MIME type recorded on the object
    pub async fn upload(
        &self,
        source: UploadSource,
        path: &str,
        content_type: Option<&str>,
    ) -> Result<ObjectInfo> {
        let path: ObjectPath = ObjectPath::parse(path)?;
        if path.is_root() {
            return Err(FsError::RootOperation {
                path: path.to_string(),
                operation: "upload to",
            });
        }

        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        let c: &dyn ObjectStorageClient = client.as_ref();
        let info: ObjectInfo = c
            .insert_object(path.bucket(), path.key(), &source, content_type)
            .await?;
        tracing::debug!("Uploaded {} bytes to {}", info.size, path);

        let (bucket, key): (&str, &str) = (path.bucket(), path.key());
        self.waiter
            .wait_until(&format!("{} to appear", path), move || {
                object_exists(c, bucket, key)
            })
            .await?;
        Ok(info)
    }

    /// Upload a string payload. Content type defaults to `text/plain`.
    ///
    /// # Arguments
    /// * `contents` - Text to store
    /// * `path` - Destination object path
    /// * `content_type` - MIME type override
    pub async fn put_string(
        &self,
        contents: &str,
        path: &str,
        content_type: Option<&str>,
    ) -> Result<ObjectInfo> {
        self.upload(
            UploadSource::from(contents),
            path,
            Some(content_type.unwrap_or(DEFAULT_STRING_CONTENT_TYPE)),
        )
        .await
    }

    /// Fetch an object into a local file.
    ///
    /// Without a destination the content lands in a temporary file that is
    /// deleted when the returned `DownloadedFile` is dropped.
    ///
    /// # Arguments
    /// * `path` - Object to fetch
    /// * `destination` - Local path to write, created with its parents
    pub async fn download(&self, path: &str, destination: Option<&Path>) -> Result<DownloadedFile> {
        let path: ObjectPath = ObjectPath::parse(path)?;
        let client: Arc<dyn ObjectStorageClient> = self.client().await?;

        let (local, temp): (PathBuf, Option<TempPath>) = match destination {
            Some(dest) => (dest.to_path_buf(), None),
            None => {
                let temp: TempPath = self.temp_file()?.into_temp_path();
                (temp.to_path_buf(), Some(temp))
            }
        };

        let size: u64 = client
            .get_object_to_file(path.bucket(), path.key(), &local)
            .await?;

        let local_ref: &Path = &local;
        self.waiter
            .wait_until(&format!("{} to be written", local.display()), move || {
                local_file_exists(local_ref)
            })
            .await?;
        tracing::debug!("Downloaded {} ({} bytes) to {}", path, size, local.display());

        let location: Location = match temp {
            Some(temp) => Location::Temporary(temp),
            None => Location::Kept(local),
        };
        Ok(DownloadedFile { location, size })
    }

    /// Read an object's content into memory.
    ///
    /// # Arguments
    /// * `path` - Object to read
    pub async fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let path: ObjectPath = ObjectPath::parse(path)?;
        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        Ok(client.read_object(path.bucket(), path.key()).await?)
    }

    /// Read an object's content as UTF-8 text.
    pub async fn read_to_string(&self, path: &str) -> Result<String> {
        let data: Vec<u8> = self.read_bytes(path).await?;
        String::from_utf8(data).map_err(|e| {
            FsError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    // ========================================================================
    // Buckets
    // ========================================================================

    /// Create a bucket in the configured project.
    ///
    /// # Returns
    /// False when the bucket already exists.
    ///
    /// # Errors
    /// `MissingProjectId` when `VfsOptions::project_id` is unset.
    pub async fn create_bucket(&self, bucket: &str) -> Result<bool> {
        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        let c: &dyn ObjectStorageClient = client.as_ref();
        if bucket_present(c, bucket).await? {
            return Ok(false);
        }
        let project_id: &str =
            self.options
                .project_id
                .as_deref()
                .ok_or_else(|| FsError::MissingProjectId {
                    bucket: bucket.to_string(),
                })?;

        c.insert_bucket(project_id, bucket).await?;
        tracing::debug!("Created bucket {} in project {}", bucket, project_id);
        self.waiter
            .wait_until(&format!("bucket {} to appear", bucket), move || {
                bucket_present(c, bucket)
            })
            .await?;
        Ok(true)
    }

    /// Delete an empty bucket.
    ///
    /// # Returns
    /// False when the bucket does not exist.
    pub async fn remove_bucket(&self, bucket: &str) -> Result<bool> {
        let client: Arc<dyn ObjectStorageClient> = self.client().await?;
        let c: &dyn ObjectStorageClient = client.as_ref();
        if !bucket_present(c, bucket).await? {
            return Ok(false);
        }

        c.delete_bucket(bucket).await?;
        tracing::debug!("Removed bucket {}", bucket);
        self.waiter
            .wait_until(&format!("bucket {} to disappear", bucket), move || {
                bucket_missing(c, bucket)
            })
            .await?;
        Ok(true)
    }

    pub(crate) fn temp_file(&self) -> Result<NamedTempFile> {
        match &self.options.temp_dir {
            Some(dir) => {
                NamedTempFile::new_in(dir).map_err(|e| FsError::io(dir.display().to_string(), e))
            }
            None => NamedTempFile::new().map_err(|e| FsError::io("<temp dir>", e)),
        }
    }
}

// ============================================================================
// Downloaded File
// ============================================================================

#[derive(Debug)]
enum Location {
    Kept(PathBuf),
    Temporary(TempPath),
}

/// Local copy of an object produced by `VirtualFileSystem::download`.
#[derive(Debug)]
pub struct DownloadedFile {
    location: Location,
    size: u64,
}

impl DownloadedFile {
    /// Local path of the content.
    pub fn path(&self) -> &Path {
        match &self.location {
            Location::Kept(path) => path,
            Location::Temporary(temp) => temp,
        }
    }

    /// Bytes written.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether the file is removed on drop.
    pub fn is_temporary(&self) -> bool {
        matches!(self.location, Location::Temporary(_))
    }

    /// Open the local file for reading.
    pub fn open(&self) -> Result<std::fs::File> {
        std::fs::File::open(self.path()).map_err(|e| FsError::io(self.path().display().to_string(), e))
    }

    /// Read the whole local file.
    pub async fn read(&self) -> Result<Vec<u8>> {
        tokio::fs::read(self.path())
            .await
            .map_err(|e| FsError::io(self.path().display().to_string(), e))
    }

    /// Keep the file past drop and return its path.
    pub fn keep(self) -> Result<PathBuf> {
        match self.location {
            Location::Kept(path) => Ok(path),
            Location::Temporary(temp) => temp.keep().map_err(|e| {
                let path: String = e.path.display().to_string();
                FsError::io(path, e.error)
            }),
        }
    }
}

// ============================================================================
// Probes
// ============================================================================

async fn object_exists(client: &dyn ObjectStorageClient, bucket: &str, key: &str) -> Result<bool> {
    let found: Option<ObjectInfo> = absorb_not_found(client.get_object(bucket, key).await, None)?;
    Ok(found.is_some())
}

async fn object_missing(client: &dyn ObjectStorageClient, bucket: &str, key: &str) -> Result<bool> {
    Ok(!object_exists(client, bucket, key).await?)
}

async fn all_objects_exist(
    client: &dyn ObjectStorageClient,
    bucket: &str,
    keys: &[String],
) -> Result<bool> {
    for key in keys {
        if !object_exists(client, bucket, key).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn bucket_present(client: &dyn ObjectStorageClient, bucket: &str) -> Result<bool> {
    Ok(absorb_not_found(client.get_bucket(bucket).await, None)?.is_some())
}

async fn bucket_missing(client: &dyn ObjectStorageClient, bucket: &str) -> Result<bool> {
    Ok(!bucket_present(client, bucket).await?)
}

/// Marker check, then a listing of at most `limit` items under the prefix.
async fn directory_exists(
    client: &dyn ObjectStorageClient,
    path: &ObjectPath,
    limit: u32,
) -> Result<bool> {
    if path.is_root() {
        return bucket_present(client, path.bucket()).await;
    }

    let prefix: String = path.directory_prefix();
    if object_exists(client, path.bucket(), &prefix).await? {
        return Ok(true);
    }

    let request: ListRequest = ListRequest::prefix(prefix).with_max_results(limit);
    let page: ListPage = absorb_not_found(
        client.list_objects(path.bucket(), &request).await,
        ListPage::default(),
    )?;
    Ok(!page.items.is_empty())
}

async fn directory_missing(
    client: &dyn ObjectStorageClient,
    path: &ObjectPath,
    limit: u32,
) -> Result<bool> {
    Ok(!directory_exists(client, path, limit).await?)
}

async fn path_exists(client: &dyn ObjectStorageClient, path: &ObjectPath, limit: u32) -> Result<bool> {
    if !path.is_root() && object_exists(client, path.bucket(), path.key()).await? {
        return Ok(true);
    }
    directory_exists(client, path, limit).await
}

async fn list_all(
    client: &dyn ObjectStorageClient,
    bucket: &str,
    prefix: &str,
) -> Result<Vec<ObjectInfo>> {
    let mut items: Vec<ObjectInfo> = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let request: ListRequest = ListRequest::prefix(prefix).with_page_token(page_token.take());
        let page: ListPage = client.list_objects(bucket, &request).await?;
        items.extend(page.items);
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(items)
}

async fn local_file_exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| FsError::io(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcsfs_storage::MemoryStorageClient;

    #[tokio::test]
    async fn test_directory_probe_respects_limit() {
        let client = Arc::new(MemoryStorageClient::new().with_bucket("b"));
        for i in 0..30 {
            client
                .insert_object("b", &format!("d/{:02}", i), &UploadSource::from("x"), None)
                .await
                .unwrap();
        }
        let path = ObjectPath::parse("gs://b/d").unwrap();
        assert!(directory_exists(client.as_ref(), &path, 20).await.unwrap());
        assert_eq!(
            client.call_count(gcsfs_storage::MemoryOperation::ListObjects),
            1
        );
    }

    #[tokio::test]
    async fn test_list_all_follows_tokens() {
        let client = MemoryStorageClient::new().with_bucket("b").with_page_size(2);
        for name in ["p/a", "p/b", "p/c", "p/d", "p/e", "q/z"] {
            client
                .insert_object("b", name, &UploadSource::from("x"), None)
                .await
                .unwrap();
        }
        let items = list_all(&client, "b", "p/").await.unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["p/a", "p/b", "p/c", "p/d", "p/e"]);
    }

    #[tokio::test]
    async fn test_missing_bucket_probes_are_false() {
        let client = MemoryStorageClient::new();
        let path = ObjectPath::parse("gs://nope/dir").unwrap();
        assert!(!path_exists(&client, &path, 20).await.unwrap());
        assert!(!bucket_present(&client, "nope").await.unwrap());
    }
}
