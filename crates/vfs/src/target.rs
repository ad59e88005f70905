//! Single-object target for task pipelines.
//!
//! A task framework opens a target for reading its input or writing its
//! output. Reads materialize the object to a local temp file; writes go
//! through an atomic session so a failed task never leaves partial output.

use std::fmt;
use std::sync::Arc;

use gcsfs_common::{join_key, ObjectPath};

use crate::atomic_file::{AtomicFile, AtomicFileWriter};
use crate::error::{FsError, Result};
use crate::file_system::{DownloadedFile, VirtualFileSystem};

/// Handle returned by `FileTarget::open`.
#[derive(Debug)]
pub enum TargetHandle<'a> {
    /// Local copy of the object.
    Read(DownloadedFile),
    /// Uncommitted write session. Call `commit` to publish.
    Write(AtomicFileWriter<'a>),
}

/// An object in a bucket, addressed for reading or atomic writing.
#[derive(Clone)]
pub struct FileTarget {
    path: ObjectPath,
    fs: Arc<VirtualFileSystem>,
}

impl FileTarget {
    /// Create a target.
    ///
    /// # Arguments
    /// * `bucket` - Bucket name
    /// * `key` - Object key (a leading `/` is ignored)
    /// * `fs` - Filesystem shared with other targets
    pub fn new(bucket: impl Into<String>, key: &str, fs: Arc<VirtualFileSystem>) -> Self {
        Self {
            path: ObjectPath::new(bucket, join_key("", key)),
            fs,
        }
    }

    /// Create a target from a `gs://` path.
    pub fn from_path(path: &str, fs: Arc<VirtualFileSystem>) -> Result<Self> {
        Ok(Self {
            path: ObjectPath::parse(path)?,
            fs,
        })
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    pub fn fs(&self) -> &VirtualFileSystem {
        &self.fs
    }

    pub async fn exists(&self) -> Result<bool> {
        self.fs.exists(&self.path.to_string()).await
    }

    /// Open the target.
    ///
    /// # Arguments
    /// * `mode` - Contains `r` for a read handle or `w` for a write handle
    ///
    /// # Errors
    /// `FsError::InvalidMode` for any other mode.
    pub async fn open(&self, mode: &str) -> Result<TargetHandle<'_>> {
        if mode.contains('r') {
            let file: DownloadedFile = self.fs.download(&self.path.to_string(), None).await?;
            Ok(TargetHandle::Read(file))
        } else if mode.contains('w') {
            let writer: AtomicFileWriter<'_> =
                AtomicFile::new(&self.path.to_string(), &self.fs)?.begin()?;
            Ok(TargetHandle::Write(writer))
        } else {
            Err(FsError::InvalidMode {
                mode: mode.to_string(),
            })
        }
    }

    /// Write the target in a scoped session. See `AtomicFile::write_with`.
    pub async fn write_with<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut AtomicFileWriter<'_>) -> std::result::Result<T, E>,
        E: From<FsError>,
    {
        let file: AtomicFile<'_> = AtomicFile::new(&self.path.to_string(), &self.fs)?;
        file.write_with(f).await
    }
}

impl fmt::Display for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl fmt::Debug for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTarget").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::VfsOptions;
    use gcsfs_storage::MemoryStorageClient;
    use std::io::Write;

    fn target(key: &str) -> (Arc<MemoryStorageClient>, FileTarget) {
        let client = Arc::new(MemoryStorageClient::new().with_bucket("b"));
        let fs = Arc::new(VirtualFileSystem::from_client(client.clone(), VfsOptions::default()));
        (client, FileTarget::new("b", key, fs))
    }

    #[test]
    fn test_display_is_canonical_path() {
        let (_client, target) = target("/out/part-0");
        assert_eq!(target.to_string(), "gs://b/out/part-0");
    }

    #[test]
    fn test_key_is_joined_without_leading_delimiters() {
        let (_client, target) = target("//nested/key");
        assert_eq!(target.path().key(), "nested/key");
    }

    #[tokio::test]
    async fn test_open_write_then_read() {
        let (_client, target) = target("out.txt");
        assert!(!target.exists().await.unwrap());

        let handle = target.open("w").await.unwrap();
        match handle {
            TargetHandle::Write(mut writer) => {
                writer.write_all(b"payload").unwrap();
                writer.commit().await.unwrap();
            }
            TargetHandle::Read(_) => panic!("expected a write handle"),
        }
        assert!(target.exists().await.unwrap());

        let handle = target.open("rb").await.unwrap();
        match handle {
            TargetHandle::Read(file) => {
                assert!(file.is_temporary());
                assert_eq!(file.read().await.unwrap(), b"payload");
            }
            TargetHandle::Write(_) => panic!("expected a read handle"),
        }
    }

    #[tokio::test]
    async fn test_invalid_mode() {
        let (_client, target) = target("x");
        let result = target.open("a").await;
        match result {
            Err(FsError::InvalidMode { mode }) => assert_eq!(mode, "a"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
