//! Configuration types for file-backed loaders

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{BlobMapError, Result};

/// How a container file is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStrategy {
    /// Positional reads into owned heap buffers
    File,
    /// Zero-copy slices of a read-only memory map
    Mmap,
}

impl Default for LoadStrategy {
    fn default() -> Self {
        Self::Mmap
    }
}

impl LoadStrategy {
    /// Get a human-readable name for the strategy
    pub fn name(&self) -> &'static str {
        match self {
            LoadStrategy::File => "file",
            LoadStrategy::Mmap => "mmap",
        }
    }

    /// Parse a strategy name as accepted by [`LoadStrategy::name`]
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "file" => Ok(LoadStrategy::File),
            "mmap" => Ok(LoadStrategy::Mmap),
            other => Err(BlobMapError::invalid_argument(
                "strategy",
                format!("unknown load strategy '{}'", other),
            )),
        }
    }
}

/// Whether mapped ranges are pinned in physical memory.
///
/// A page stays pinned while any live buffer from the same loader covers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MlockConfig {
    /// Leave paging to the kernel
    NoMlock,
    /// `mlock` every loaded range; failure fails the load
    UseMlock,
    /// `mlock` every loaded range; failure is logged and ignored
    UseMlockIgnoreErrors,
}

impl Default for MlockConfig {
    fn default() -> Self {
        Self::NoMlock
    }
}

/// Configuration for opening a container file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Path to the container file
    pub path: PathBuf,
    /// Read strategy
    pub strategy: LoadStrategy,
    /// Page locking policy, only honoured by [`LoadStrategy::Mmap`]
    pub mlock: MlockConfig,
}

impl LoaderConfig {
    /// Create a new loader configuration with default strategy
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the read strategy
    pub fn with_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the page locking policy
    pub fn with_mlock(mut self, mlock: MlockConfig) -> Self {
        self.mlock = mlock;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(BlobMapError::invalid_argument(
                "path",
                "Container path cannot be empty",
            ));
        }

        if self.strategy == LoadStrategy::File && self.mlock != MlockConfig::NoMlock {
            return Err(BlobMapError::invalid_argument(
                "mlock",
                "Page locking requires the mmap strategy",
            ));
        }

        Ok(())
    }
}
