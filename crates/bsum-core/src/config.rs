use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 512;
/// Default number of checksum worker threads.
pub const DEFAULT_THREADS: usize = 4;
/// Default interval at which the batch coordinator re-checks the stop flag.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

/// Global configuration loaded from `~/.config/bsum/config.toml`.
/// Command-line flags take precedence over these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BsumConfig {
    /// Size of each hashed block in bytes.
    pub block_size: usize,
    /// Number of checksum worker threads; also the batch length.
    pub threads: usize,
    /// How often (ms) a waiting batch re-checks the stop flag.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Optional output buffer capacity in bytes (None = std default).
    #[serde(default)]
    pub write_buffer_bytes: Option<usize>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for BsumConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            threads: DEFAULT_THREADS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            write_buffer_bytes: None,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bsum")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BsumConfig> {
    load_or_init_at(&config_path()?)
}

/// Same as [`load_or_init`] but with an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<BsumConfig> {
    if !path.exists() {
        let default_cfg = BsumConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BsumConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
