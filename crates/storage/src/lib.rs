//! Storage abstraction for gcsfs object operations.
//!
//! This crate defines the boundary between the virtual filesystem and a
//! concrete object store:
//!
//! - **`ObjectStorageClient`** - get/list/insert/delete/copy of objects and buckets
//! - **`ClientHandle`** - per-instance cached client with session expiry
//! - **`MemoryStorageClient`** - in-memory backend with pagination, failure
//!   injection and simulated eventual consistency
//!
//! Network backends live in their own crates (see `gcsfs-storage-interop`).

mod error;
pub mod memory;
mod session;
mod traits;
mod types;

pub use error::StorageError;
pub use memory::{MemoryOperation, MemoryStorageClient};
pub use session::{ClientFactory, ClientHandle, ClientSession, FixedClientFactory};
pub use traits::{BucketInfo, ListPage, ObjectInfo, ObjectStorageClient};
pub use types::{
    Credentials, ListRequest, RequestOptions, ServiceAccountKey, StorageSettings, UploadSource,
};
