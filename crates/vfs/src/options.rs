//! Configuration options for the VFS.
//!
//! This module provides configuration for consistency waits, directory
//! probing, write staging and bucket creation.

use std::path::PathBuf;

use gcsfs_common::DIRECTORY_PROBE_LIMIT;

use crate::consistency::WaitOptions;

/// Configuration options for the VFS.
///
/// # Example
///
/// ```ignore
/// let options = VfsOptions::default()
///     .with_project_id("my-project")
///     .with_staging(StagingMode::Memory)
///     .with_wait(WaitOptions::default().with_max_wait(Some(Duration::from_secs(30))));
///
/// let fs = VirtualFileSystem::new(handle, options);
/// ```
#[derive(Debug, Clone)]
pub struct VfsOptions {
    /// Polling policy applied after every mutation.
    pub wait: WaitOptions,
    /// Page size of the listing used to decide whether a prefix is a directory.
    pub directory_probe_limit: u32,
    /// Where atomic writes stage their payload.
    pub staging: StagingMode,
    /// Project owning buckets created through `create_bucket`.
    pub project_id: Option<String>,
    /// Directory for staging files and temporary downloads. None uses the
    /// system temp directory.
    pub temp_dir: Option<PathBuf>,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            wait: WaitOptions::default(),
            directory_probe_limit: DIRECTORY_PROBE_LIMIT,
            staging: StagingMode::default(),
            project_id: None,
            temp_dir: None,
        }
    }
}

impl VfsOptions {
    /// Set the consistency wait policy.
    ///
    /// # Arguments
    /// * `wait` - Polling policy
    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Set the directory probe page size (minimum 1).
    pub fn with_directory_probe_limit(mut self, limit: u32) -> Self {
        self.directory_probe_limit = limit.max(1);
        self
    }

    /// Set the staging mode for atomic writes.
    ///
    /// # Arguments
    /// * `staging` - Temp file or memory
    pub fn with_staging(mut self, staging: StagingMode) -> Self {
        self.staging = staging;
        self
    }

    /// Set the project used for bucket creation.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Set the directory for temporary files.
    ///
    /// # Arguments
    /// * `temp_dir` - Existing local directory
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }
}

// ============================================================================
// Staging Mode
// ============================================================================

/// Where an atomic write keeps its payload until commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StagingMode {
    /// Named temporary file, removed when the session ends.
    #[default]
    TempFile,
    /// In-memory buffer. Suited to small payloads.
    Memory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = VfsOptions::default();
        assert_eq!(options.directory_probe_limit, 20);
        assert_eq!(options.staging, StagingMode::TempFile);
        assert!(options.project_id.is_none());
        assert!(options.wait.max_wait.is_some());
    }

    #[test]
    fn test_probe_limit_floor() {
        let options = VfsOptions::default().with_directory_probe_limit(0);
        assert_eq!(options.directory_probe_limit, 1);
    }
}
