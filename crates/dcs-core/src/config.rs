use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DcsError, DcsResult};

/// Top-level node configuration (loaded from dcs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DcsConfig {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identifier recorded in chunk placement (default: "local")
    pub id: String,
    /// Root data directory (default: ~/.dcs)
    pub data_dir: PathBuf,
    /// Storage quota in bytes across all blobs (default: 10 GiB)
    pub max_storage: u64,
    /// Target replica count for new files
    pub replicas: u32,
    /// Fixed chunk size in bytes (default: 1 MiB)
    pub chunk_size: usize,
    /// Bounded worker count for chunk writes within one store
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Sharded blob directory
    pub path: PathBuf,
    /// Largest accepted upload in bytes (default: 100 MiB)
    pub max_file_size: u64,
    /// JSON metadata index file
    pub index_path: PathBuf,
}

/// Encryption key sourcing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Raw 32-byte key file; takes precedence over a passphrase
    pub key_file: Option<PathBuf>,
    /// Salt for passphrase derivation (created on first use)
    pub salt_file: PathBuf,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: "local".into(),
            data_dir: PathBuf::from("~/.dcs"),
            max_storage: 10 * 1024 * 1024 * 1024,
            replicas: 3,
            chunk_size: 1024 * 1024,
            workers: 4,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.dcs/storage"),
            max_file_size: 100 * 1024 * 1024,
            index_path: PathBuf::from("~/.dcs/index.json"),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_file: None,
            salt_file: PathBuf::from("~/.dcs/salt"),
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl DcsConfig {
    /// Load config from a TOML file, falling back to defaults when the file
    /// does not exist. The result is validated before it is returned.
    pub fn load(path: &Path) -> DcsResult<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                DcsError::Config(format!("reading config {}: {e}", path.display()))
            })?;
            toml::from_str(&content).map_err(|e| {
                DcsError::Config(format!("parsing config {}: {e}", path.display()))
            })?
        } else {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            DcsConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DcsResult<()> {
        if self.node.chunk_size == 0 {
            return Err(DcsError::Config("invalid chunk size: 0".into()));
        }
        if self.node.replicas == 0 {
            return Err(DcsError::Config("invalid replicas count: 0".into()));
        }
        if self.node.workers == 0 {
            return Err(DcsError::Config("invalid worker count: 0".into()));
        }
        if self.storage.max_file_size == 0 {
            return Err(DcsError::Config("invalid max file size: 0".into()));
        }
        Ok(())
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[node]
id = "node-a"
data_dir = "/var/lib/dcs"
max_storage = 1073741824
replicas = 2
chunk_size = 65536
workers = 8

[storage]
path = "/var/lib/dcs/blobs"
max_file_size = 1048576
index_path = "/var/lib/dcs/index.json"

[crypto]
key_file = "/etc/dcs/key"
argon2_mem_cost_kib = 131072

[logging]
level = "debug"
format = "json"
"#;
        let config: DcsConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.node.id, "node-a");
        assert_eq!(config.node.chunk_size, 65536);
        assert_eq!(config.node.workers, 8);
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/dcs/blobs"));
        assert_eq!(config.storage.max_file_size, 1048576);
        assert_eq!(config.crypto.key_file, Some(PathBuf::from("/etc/dcs/key")));
        assert_eq!(config.crypto.argon2_mem_cost_kib, 131072);
        assert_eq!(config.logging.format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_defaults() {
        let config: DcsConfig = toml::from_str("").unwrap();

        assert_eq!(config.node.id, "local");
        assert_eq!(config.node.chunk_size, 1024 * 1024);
        assert_eq!(config.node.replicas, 3);
        assert_eq!(config.node.max_storage, 10 * 1024 * 1024 * 1024);
        assert_eq!(config.storage.max_file_size, 100 * 1024 * 1024);
        assert!(config.crypto.key_file.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[node]
chunk_size = 4096
"#;
        let config: DcsConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.node.chunk_size, 4096);
        // Defaults
        assert_eq!(config.node.replicas, 3);
        assert_eq!(config.storage.path, PathBuf::from("~/.dcs/storage"));
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = DcsConfig::default();
        config.node.chunk_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk size"));
    }

    #[test]
    fn test_validate_rejects_zero_replicas() {
        let mut config = DcsConfig::default();
        config.node.replicas = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = DcsConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.node.id, "local");
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dcs.toml");
        std::fs::write(&path, "[node]\nchunk_size = 0\n").unwrap();
        assert!(DcsConfig::load(&path).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(
            expand_tilde(Path::new("~/.dcs/storage")),
            PathBuf::from(home).join(".dcs/storage")
        );
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = DcsConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DcsConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.node.chunk_size, parsed.node.chunk_size);
        assert_eq!(config.storage.path, parsed.storage.path);
        assert_eq!(config.logging.level, parsed.logging.level);
    }
}
