//! Disk-store configuration
//!
//! Configures where a [`DiskStore`](super::DiskStore) keeps its data and how
//! values are routed between the manifest database and separate files.

use std::path::PathBuf;

use super::error::{StoreError, StoreResult};

#[cfg(target_os = "macos")]
const PLATFORM_MAX_PATH: usize = 1024;
#[cfg(target_os = "windows")]
const PLATFORM_MAX_PATH: usize = 260;
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PLATFORM_MAX_PATH: usize = 4096;

/// Longest permitted root path. The engine appends database siblings, data
/// filenames, and trash subtree names below the root, so headroom is
/// reserved against the platform maximum.
pub(crate) const MAX_ROOT_PATH_LEN: usize = PLATFORM_MAX_PATH - 64;

/// Where values are stored, indicating the placement of each entry's bytes
///
/// Writing into SQLite is faster for small values; reading large values from
/// separate files outperforms the database well before the hundred-kilobyte
/// range. Pick `Sqlite` for many small entries, `File` for large blobs, and
/// `Mixed` to choose per entry by supplying a filename or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// Every value is stored as a file in the data directory; saves must
    /// carry a filename
    File,
    /// Every value is stored inline in the manifest database
    Sqlite,
    /// Per-entry choice: a save with a filename goes to the file system,
    /// one without goes inline
    #[default]
    Mixed,
}

/// Configuration for a [`DiskStore`](super::DiskStore)
#[derive(Debug, Clone)]
pub struct DiskStoreConfig {
    /// Root directory for the database, data, and trash
    pub path: PathBuf,

    /// Value routing policy (default: `Mixed`)
    pub kind: StorageKind,

    /// Emit `tracing` errors on failed operations (default: true)
    pub log_errors: bool,
}

impl DiskStoreConfig {
    /// Create a new configuration rooted at `path` with default routing
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), kind: StorageKind::default(), log_errors: true }
    }

    /// Create a configuration builder rooted at `path`
    pub fn builder(path: impl Into<PathBuf>) -> DiskStoreConfigBuilder {
        DiskStoreConfigBuilder { config: Self::new(path) }
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `InvalidArgument` when the path is empty or longer than the
    /// platform maximum minus the reserved headroom.
    pub fn validate(&self) -> StoreResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(StoreError::InvalidArgument("store path must not be empty".to_string()));
        }
        let len = self.path.as_os_str().len();
        if len > MAX_ROOT_PATH_LEN {
            return Err(StoreError::InvalidArgument(format!(
                "store path is {} bytes, maximum is {}",
                len, MAX_ROOT_PATH_LEN
            )));
        }
        Ok(())
    }
}

/// Builder for [`DiskStoreConfig`] with fluent API
#[derive(Debug)]
pub struct DiskStoreConfigBuilder {
    config: DiskStoreConfig,
}

impl DiskStoreConfigBuilder {
    /// Set the value routing policy
    pub fn kind(mut self, kind: StorageKind) -> Self {
        self.config.kind = kind;
        self
    }

    /// Enable or disable error logging
    pub fn log_errors(mut self, enabled: bool) -> Self {
        self.config.log_errors = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> DiskStoreConfig {
        self.config
    }
}
