use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the persisted blobs (one file per key)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Total bytes the blob store may hold; 0 disables the limit
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,

    #[serde(default)]
    pub quota_policy: QuotaPolicy,

    #[serde(default)]
    pub viewport: ViewportConfig,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub images: ImageConfig,
}

/// What a mutation does when its write hits the storage quota.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPolicy {
    /// Keep the in-memory change; storage lags until space frees up.
    #[default]
    Diverge,
    /// Undo the in-memory change so state matches what was persisted.
    Rollback,
}

/// Canvas size used to bound star positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewportConfig {
    #[serde(default = "default_viewport_width")]
    pub width: f64,

    #[serde(default = "default_viewport_height")]
    pub height: f64,
}

fn default_viewport_width() -> f64 {
    1280.0
}

fn default_viewport_height() -> f64 {
    800.0
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: default_viewport_width(),
            height: default_viewport_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutConfig {
    /// Margin kept clear along every viewport edge
    #[serde(default = "default_padding")]
    pub padding: f64,

    /// Minimum spacing between stars of one constellation
    #[serde(default = "default_min_distance")]
    pub min_distance: f64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Close `auto` chains of three or more stars into a loop
    #[serde(default)]
    pub close_loops: bool,
}

fn default_padding() -> f64 {
    120.0
}

fn default_min_distance() -> f64 {
    100.0
}

fn default_max_attempts() -> u32 {
    50
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            padding: default_padding(),
            min_distance: default_min_distance(),
            max_attempts: default_max_attempts(),
            close_loops: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageConfig {
    /// Embedded photos wider than this are scaled down
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    /// JPEG quality for re-encoded photos (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Photos compressed in parallel during bulk upload
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_max_width() -> u32 {
    800
}

fn default_quality() -> u8 {
    70
}

fn default_concurrency() -> usize {
    4
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            quality: default_quality(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stellar")
}

fn default_quota_bytes() -> u64 {
    5 * 1024 * 1024 // 5MB, the usual browser local-storage allowance
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            quota_bytes: default_quota_bytes(),
            quota_policy: QuotaPolicy::default(),
            viewport: ViewportConfig::default(),
            layout: LayoutConfig::default(),
            images: ImageConfig::default(),
        }
    }
}

impl Config {
    pub fn quota(&self) -> Option<u64> {
        (self.quota_bytes > 0).then_some(self.quota_bytes)
    }

    /// Load from `STELLAR_CONFIG` or the default location, writing defaults
    /// out on first run.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os("STELLAR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config at {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config at {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stellar")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
