//! All-or-nothing object writes.
//!
//! Writes go to a local staging area (temp file or memory). The object is
//! uploaded only on `commit`, so readers never see a partial payload at the
//! destination. A writer dropped without commit, or a `write_with` callback
//! that fails, leaves the destination untouched.
//!
//! ```text
//! Open --write--> Writing --commit--> Committed
//!   |               |
//!   +---- drop / discard / failed upload ----> Discarded
//! ```
//!
//! A commit whose upload was stored but never became visible within the
//! wait bound ends `Committed` and returns `ConsistencyTimeout`: the payload
//! is at the destination, only the confirmation is missing.

use std::io::{self, Write};

use gcsfs_common::ObjectPath;
use gcsfs_storage::{ObjectInfo, UploadSource};
use tempfile::{NamedTempFile, TempPath};

use crate::error::{FsError, Result};
use crate::file_system::VirtualFileSystem;
use crate::options::StagingMode;

/// Lifecycle of an atomic write session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicWriteState {
    /// Session started, nothing written yet.
    Open,
    /// At least one write staged.
    Writing,
    /// Payload uploaded to the destination.
    Committed,
    /// Staging area dropped without upload. The destination is unchanged.
    Discarded,
}

/// Destination of an atomic write, bound to a filesystem.
#[derive(Clone)]
pub struct AtomicFile<'a> {
    path: String,
    fs: &'a VirtualFileSystem,
    content_type: Option<String>,
}

impl<'a> AtomicFile<'a> {
    /// Bind a destination path.
    ///
    /// # Arguments
    /// * `path` - Destination `gs://` path, validated here
    /// * `fs` - Filesystem used for the upload on commit
    pub fn new(path: &str, fs: &'a VirtualFileSystem) -> Result<Self> {
        let parsed: ObjectPath = ObjectPath::parse(path)?;
        if parsed.is_root() {
            return Err(FsError::RootOperation {
                path: parsed.to_string(),
                operation: "write to",
            });
        }
        Ok(Self {
            path: parsed.to_string(),
            fs,
            content_type: None,
        })
    }

    /// Content type recorded on the committed object.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Start a write session with a fresh staging area.
    pub fn begin(&self) -> Result<AtomicFileWriter<'a>> {
        let staging: Staging = match self.fs.options().staging {
            StagingMode::TempFile => Staging::TempFile(self.fs.temp_file()?),
            StagingMode::Memory => Staging::Memory(Vec::new()),
        };
        Ok(AtomicFileWriter {
            fs: self.fs,
            path: self.path.clone(),
            content_type: self.content_type.clone(),
            staging: Some(staging),
            state: AtomicWriteState::Open,
            written: 0,
        })
    }

    /// Run a scoped write session.
    ///
    /// The callback writes into the session. On `Ok` the payload is
    /// committed; on `Err` it is discarded and the error returned.
    ///
    /// # Arguments
    /// * `f` - Callback that fills the writer
    pub async fn write_with<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut AtomicFileWriter<'a>) -> std::result::Result<T, E>,
        E: From<FsError>,
    {
        let mut writer: AtomicFileWriter<'a> = self.begin()?;
        match f(&mut writer) {
            Ok(value) => {
                writer.commit().await?;
                Ok(value)
            }
            Err(err) => {
                writer.discard();
                Err(err)
            }
        }
    }
}

enum Staging {
    TempFile(NamedTempFile),
    Memory(Vec<u8>),
}

/// Byte sink of an atomic write session.
pub struct AtomicFileWriter<'a> {
    fs: &'a VirtualFileSystem,
    path: String,
    content_type: Option<String>,
    /// None once committed or discarded.
    staging: Option<Staging>,
    state: AtomicWriteState,
    written: u64,
}

impl<'a> AtomicFileWriter<'a> {
    pub fn state(&self) -> AtomicWriteState {
        self.state
    }

    /// Destination path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bytes staged so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Upload the staged payload to the destination.
    ///
    /// An empty session commits an empty object. If the payload never
    /// reaches the store the staging area is dropped and the session is
    /// discarded. A `ConsistencyTimeout` means the object was stored but not
    /// yet observed, so the session still ends `Committed`.
    pub async fn commit(&mut self) -> Result<ObjectInfo> {
        let staging: Staging = self.staging.take().ok_or_else(|| closed(&self.path))?;
        let content_type: Option<String> = self.content_type.clone();

        let result: Result<ObjectInfo> = match staging {
            Staging::Memory(data) => {
                self.fs
                    .upload(UploadSource::Bytes(data), &self.path, content_type.as_deref())
                    .await
            }
            Staging::TempFile(mut file) => match file.flush() {
                Ok(()) => {
                    let staged: TempPath = file.into_temp_path();
                    self.fs
                        .upload(
                            UploadSource::FilePath(staged.to_path_buf()),
                            &self.path,
                            content_type.as_deref(),
                        )
                        .await
                }
                Err(e) => Err(FsError::io(file.path().display().to_string(), e)),
            },
        };

        match result {
            Ok(info) => {
                self.state = AtomicWriteState::Committed;
                tracing::debug!("Committed {} bytes to {}", self.written, self.path);
                Ok(info)
            }
            Err(err @ FsError::ConsistencyTimeout { .. }) => {
                self.state = AtomicWriteState::Committed;
                tracing::warn!("Stored {} but it is not visible yet: {}", self.path, err);
                Err(err)
            }
            Err(err) => {
                self.state = AtomicWriteState::Discarded;
                Err(err)
            }
        }
    }

    /// Drop the staging area without uploading.
    pub fn discard(&mut self) {
        if self.staging.take().is_some() {
            self.state = AtomicWriteState::Discarded;
            tracing::debug!("Discarded write session for {}", self.path);
        }
    }
}

fn closed(path: &str) -> FsError {
    FsError::io(
        path,
        io::Error::new(io::ErrorKind::Other, "write session is closed"),
    )
}

impl Write for AtomicFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let staging: &mut Staging = self
            .staging
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "write session is closed"))?;
        let n: usize = match staging {
            Staging::TempFile(file) => file.write(buf)?,
            Staging::Memory(data) => {
                data.extend_from_slice(buf);
                buf.len()
            }
        };
        self.written += n as u64;
        self.state = AtomicWriteState::Writing;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.staging.as_mut() {
            Some(Staging::TempFile(file)) => file.flush(),
            _ => Ok(()),
        }
    }
}

impl Drop for AtomicFileWriter<'_> {
    fn drop(&mut self) {
        self.discard();
    }
}

impl std::fmt::Debug for AtomicFile<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicFile")
            .field("path", &self.path)
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl std::fmt::Debug for AtomicFileWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicFileWriter")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("written", &self.written)
            .finish()
    }
}
