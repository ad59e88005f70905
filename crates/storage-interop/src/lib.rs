//! Cloud Storage XML interoperability backend for gcsfs.
//!
//! This crate provides an `ObjectStorageClient` implementation using the AWS
//! SDK for Rust pointed at `storage.googleapis.com`, authenticated with an
//! HMAC key pair.
//!
//! # Example
//!
//! ```ignore
//! use gcsfs_storage::{ClientHandle, Credentials, StorageSettings};
//! use gcsfs_storage_interop::InteropClientFactory;
//!
//! let settings = StorageSettings::new("my-project").with_credentials(Credentials::Hmac {
//!     access_key_id: "GOOG...".into(),
//!     secret_access_key: "...".into(),
//! });
//! let handle = ClientHandle::new(InteropClientFactory::new(settings));
//! ```

mod client;
mod error;

pub use client::{InteropClientFactory, InteropStorageClient, DEFAULT_ENDPOINT};
pub use error::InteropError;
