use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level client configuration (loaded from cipherpost.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostConfig {
    pub storage: StorageConfig,
    pub keystore: KeyStoreConfig,
    pub transfer: TransferConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint for ciphertext blobs
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Key prefix for attachment objects within the bucket
    pub prefix: String,
    /// Enforce HTTPS for storage connections (error on HTTP endpoints)
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStoreConfig {
    /// Directory holding one key record per conversation
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Size ceiling for a single attachment, in bytes (default: 100 MiB)
    pub max_attachment_bytes: u64,
    /// Chunk size for progress-reporting I/O loops (default: 256 KiB)
    pub io_chunk_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "cipherpost".into(),
            prefix: "attachments".into(),
            enforce_tls: false,
        }
    }
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.local/share/cipherpost/keys"),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_attachment_bytes: 100 * 1024 * 1024,
            io_chunk_bytes: 256 * 1024,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl PostConfig {
    /// Load configuration from a TOML file, or defaults if it doesn't exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
            toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
        } else {
            tracing::warn!("config file not found: {} (using defaults)", path.display());
            Ok(Self::default())
        }
    }
}
