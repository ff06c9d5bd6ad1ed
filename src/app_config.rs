//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytesize::ByteSize;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use random_access_file::{FileOptions, Pool, SlabAllocator};

/// Buffer allocation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AllocConfig {
    /// Serve buffers from a preallocated slab of this size instead of the heap.
    pub slab_capacity: Option<ByteSize>,
}

/// Application configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Options for the handle the command operates on.
    #[serde(default)]
    pub file: FileOptions,

    /// Bound on simultaneously open descriptors. No pool when unset.
    #[serde(default)]
    pub pool_size: Option<usize>,

    #[serde(default)]
    pub alloc: AllocConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing a list of validation error messages otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.pool_size == Some(0) {
            errors.push("pool-size must be at least 1.".to_owned());
        }

        if !self.file.readable && !self.file.writable {
            errors.push("file must be readable, writable, or both.".to_owned());
        }

        if let Some(dir) = &self.file.directory
            && dir.as_os_str().is_empty()
        {
            errors.push("file.directory must not be empty.".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("raf").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("raf").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/raf/config.toml"));

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Parses config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Loads configuration from the external path if given, otherwise from the first config file
    /// found, otherwise the defaults. Errors if a config file exists but is malformed or invalid.
    pub fn load(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let found = external_config_path
            .map(Path::to_path_buf)
            .or_else(Self::find_config_file);

        let config = match found {
            Some(path) => Self::load_from_file(&path)?,
            None => {
                debug!("No configuration file found, using defaults.");
                Self::default()
            }
        };

        config.validate().map_err(ConfigError::ValidationErrors)?;
        Ok(config)
    }

    /// The handle options with the configured capabilities attached.
    pub fn file_options(&self) -> FileOptions {
        let mut options = self.file.clone();
        if let Some(capacity) = self.alloc.slab_capacity {
            let capacity = usize::try_from(capacity.as_u64()).unwrap_or(usize::MAX);
            let slab = SlabAllocator::with_capacity(capacity);
            debug!(capacity = slab.capacity(), "Using slab allocator.");
            options = options.with_alloc(Arc::new(slab));
        }
        if let Some(size) = self.pool_size {
            options = options.with_pool(Pool::new(size));
        }
        options
    }
}
