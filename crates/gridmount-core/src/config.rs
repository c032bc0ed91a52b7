use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GridError, GridResult};
use crate::types::DEFAULT_CHUNK_SIZE;

/// Top-level configuration (loaded from gridmount.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub daemon: DaemonConfig,
    pub storage: StorageConfig,
    pub store: StoreConfig,
    pub mount: MountConfig,
    /// Warn if the config file is world-readable (default: true)
    #[serde(default = "default_true")]
    pub config_file_mode_check: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

/// Storage backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Any S3-compatible endpoint
    S3,
    /// Process-local memory (contents vanish on unmount)
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// S3 endpoint (overridden by `--host`)
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
}

/// How a flush replaces an existing object of the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitStrategy {
    /// Upload the new object, then drop the old one
    Repoint,
    /// Drop the old object, then upload the new one
    DeleteFirst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Object prefix inside the bucket (overridden by `--db`)
    pub prefix: String,
    /// Chunk size for newly created files, in bytes
    pub default_chunk_size: u32,
    pub commit_strategy: CommitStrategy,
}

/// Directory classification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceMode {
    /// Directories are derived from `/`-separated stored names
    Tree,
    /// A final segment without a `.` is a directory; only the root lists
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub namespace: NamespaceMode,
    /// Paths deeper than this resolve to ENOENT
    pub max_depth: usize,
    /// TTL for kernel attr/entry caching, in seconds
    pub attr_ttl_secs: u64,
    pub allow_other: bool,
    pub fs_name: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::S3,
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "gridmount".into(),
            enforce_tls: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prefix: "test".into(),
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            commit_strategy: CommitStrategy::Repoint,
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            namespace: NamespaceMode::Tree,
            max_depth: 10,
            attr_ttl_secs: 1,
            allow_other: false,
            fs_name: "gridmount".into(),
        }
    }
}

impl GridConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> GridResult<Self> {
        let config: GridConfig =
            toml::from_str(s).map_err(|e| GridError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> GridResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| GridError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> GridResult<()> {
        if self.store.default_chunk_size == 0 {
            return Err(GridError::Config(
                "store.default_chunk_size must be positive".into(),
            ));
        }
        if self.mount.max_depth == 0 {
            return Err(GridError::Config("mount.max_depth must be positive".into()));
        }
        if self.store.prefix.trim_matches('/').is_empty() {
            return Err(GridError::Config("store.prefix must not be empty".into()));
        }
        Ok(())
    }
}

/// True if `path` can be read by any user.
#[cfg(unix)]
pub fn is_world_readable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o004 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_world_readable(_path: &Path) -> bool {
    false
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/gridmount/config.toml")
}
