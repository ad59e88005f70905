//! Filesystem-like view over Cloud Storage buckets.
//!
//! This crate lets callers treat objects as paths, directories and streams
//! even though the store is a flat, eventually consistent keyspace.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: FileTarget (read/write handles for task pipelines)
//! Layer 2: VirtualFileSystem, AtomicFile (directory emulation, atomic writes)
//! Layer 1: ConsistencyWaiter, translate, ObjectPath (primitives)
//! ```
//!
//! Every mutating operation waits until its effect is visible before
//! returning, bounded by `WaitOptions::max_wait`.

pub mod atomic_file;
pub mod consistency;
pub mod error;
pub mod file_system;
pub mod options;
pub mod target;
pub mod translate;

pub use atomic_file::{AtomicFile, AtomicFileWriter, AtomicWriteState};
pub use consistency::{ConsistencyWaiter, WaitOptions};
pub use error::{FsError, FsErrorKind, Result};
pub use file_system::{DownloadedFile, VirtualFileSystem};
pub use options::{StagingMode, VfsOptions};
pub use target::{FileTarget, TargetHandle};
pub use translate::translate;

pub use gcsfs_common::{resolve, ObjectPath};
