//! Shared types and utilities for gcsfs.
//!
//! This crate provides common functionality used across all gcsfs crates:
//! - `gs://` path parsing into bucket and key
//! - Key-prefix helpers for directory emulation
//! - Shared constants and error types

pub mod constants;
pub mod error;
pub mod path_utils;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::PathError;
pub use path_utils::{add_path_delimiter, is_root_key, join_key, resolve, ObjectPath};
