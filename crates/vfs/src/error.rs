//! Error types for the VFS crate.

use std::time::Duration;

use gcsfs_common::PathError;
use gcsfs_storage::StorageError;
use thiserror::Error;

/// Result alias used throughout the VFS.
pub type Result<T> = std::result::Result<T, FsError>;

/// Errors that can occur during VFS operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// Malformed path or wrong scheme.
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    /// Destination exists and exclusivity was requested.
    #[error("Path already exists: {path}")]
    AlreadyExists { path: String },

    /// The path exists but is an object, not a directory.
    #[error("Path exists and is not a directory: {path}")]
    NotADirectory { path: String },

    /// The operation is not allowed on a bucket root.
    #[error("Cannot {operation} the bucket root: {path}")]
    RootOperation {
        path: String,
        operation: &'static str,
    },

    /// Non-recursive removal of a directory.
    #[error("Path is a directory, set recursive to remove it: {path}")]
    RecursiveRequired { path: String },

    /// Structured failure reported by the storage service.
    #[error("Remote error ({reason}): {message}")]
    Remote { reason: String, message: String },

    /// Move copied the source but failed to remove it. Both locations are populated.
    #[error("Copied {src} to {dest} but failed to remove the source: {source}")]
    PartialMove {
        src: String,
        dest: String,
        #[source]
        source: Box<FsError>,
    },

    /// Move whose destination is the source or lies underneath it.
    #[error("Cannot move {src} into itself: {dest}")]
    MoveIntoSelf { src: String, dest: String },

    /// A mutation did not become visible within the configured wait.
    #[error("Gave up waiting for {condition} after {attempts} attempts ({waited:?})")]
    ConsistencyTimeout {
        condition: String,
        attempts: u32,
        waited: Duration,
    },

    /// Target opened with a mode that is neither read nor write.
    #[error("Unsupported open mode: {mode:?}")]
    InvalidMode { mode: String },

    /// Bucket creation without a configured project.
    #[error("Creating bucket {bucket} requires a project id")]
    MissingProjectId { bucket: String },

    /// Storage failure without structured detail, passed through unchanged.
    #[error(transparent)]
    Storage(StorageError),

    /// Local I/O error (staging or download destination).
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of `FsError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsErrorKind {
    InvalidPath,
    AlreadyExists,
    NotADirectory,
    /// Root operations, non-recursive directory removal, remote failures,
    /// partial or self-nested moves and missing bucket configuration.
    FileSystem,
    ConsistencyTimeout,
    InvalidMode,
    Storage,
    Io,
}

impl FsError {
    /// Create an I/O error for a local path.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        FsError::Io {
            path: path.into(),
            source,
        }
    }

    /// Taxonomy bucket of this error.
    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsError::InvalidPath(_) => FsErrorKind::InvalidPath,
            FsError::AlreadyExists { .. } => FsErrorKind::AlreadyExists,
            FsError::NotADirectory { .. } => FsErrorKind::NotADirectory,
            FsError::RootOperation { .. }
            | FsError::RecursiveRequired { .. }
            | FsError::Remote { .. }
            | FsError::PartialMove { .. }
            | FsError::MoveIntoSelf { .. }
            | FsError::MissingProjectId { .. } => FsErrorKind::FileSystem,
            FsError::ConsistencyTimeout { .. } => FsErrorKind::ConsistencyTimeout,
            FsError::InvalidMode { .. } => FsErrorKind::InvalidMode,
            FsError::Storage(_) => FsErrorKind::Storage,
            FsError::Io { .. } => FsErrorKind::Io,
        }
    }
}

impl From<StorageError> for FsError {
    fn from(err: StorageError) -> Self {
        crate::translate::translate(err)
    }
}

impl From<std::io::Error> for FsError {
    fn from(source: std::io::Error) -> Self {
        FsError::Io {
            path: String::new(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_filesystem_errors() {
        let err = FsError::RootOperation {
            path: "gs://b/".into(),
            operation: "remove",
        };
        assert_eq!(err.kind(), FsErrorKind::FileSystem);

        let err = FsError::PartialMove {
            src: "gs://b/a".into(),
            dest: "gs://b/c".into(),
            source: Box::new(FsError::Remote {
                reason: "forbidden".into(),
                message: "denied".into(),
            }),
        };
        assert_eq!(err.kind(), FsErrorKind::FileSystem);
        assert!(err.to_string().contains("failed to remove the source"));
    }

    #[test]
    fn test_path_error_converts() {
        let err: FsError = PathError::invalid("s3://b/k", "wrong scheme").into();
        assert_eq!(err.kind(), FsErrorKind::InvalidPath);
    }

    #[test]
    fn test_storage_error_without_detail_passes_through() {
        let err: FsError = StorageError::NetworkError {
            message: "reset".into(),
            retryable: true,
        }
        .into();
        assert_eq!(err.kind(), FsErrorKind::Storage);
    }
}
