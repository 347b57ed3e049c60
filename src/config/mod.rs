use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hard cap on the worker pool size, regardless of configuration.
pub const MAX_WORKERS: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub cache: CacheConfig,
    pub matching: MatchingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding fetched guide sources
    pub dir: PathBuf,
    /// Entries older than this are refetched
    pub ttl_hours: u64,
    /// Aggregate size that triggers eviction
    pub high_water_mb: u64,
    /// Eviction target size
    pub low_water_mb: u64,
    /// Per-fetch network timeout
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Worker pool size; 0 derives min(2 x cores, 16)
    pub workers: usize,
    /// Minimum similarity a fuzzy candidate must strictly exceed
    pub fuzzy_threshold: f64,
    pub tiers: TierToggles,
}

/// Which matching tiers are attempted, in fixed priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierToggles {
    pub tvg_id: bool,
    pub tvg_name: bool,
    pub display_name: bool,
    pub normalized: bool,
    pub fuzzy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory where annotated playlists and reports are written
    pub results_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            matching: MatchingConfig {
                workers: 0,
                fuzzy_threshold: 0.8,
                tiers: TierToggles::default(),
            },
            output: OutputConfig {
                results_dir: PathBuf::from("./results"),
            },
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./cache"),
            ttl_hours: 4,
            high_water_mb: 4096,
            low_water_mb: 3072,
            fetch_timeout_secs: 15,
        }
    }
}

impl Default for TierToggles {
    fn default() -> Self {
        Self {
            tvg_id: true,
            tvg_name: true,
            display_name: true,
            normalized: true,
            fuzzy: true,
        }
    }
}

impl TierToggles {
    pub fn any_enabled(&self) -> bool {
        self.tvg_id || self.tvg_name || self.display_name || self.normalized || self.fuzzy
    }
}

impl MatchingConfig {
    /// Effective worker count: configured value capped at [`MAX_WORKERS`],
    /// or derived from the machine when left at 0.
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => {
                // Logical cores, not physical: on SMT machines the doubled
                // value lands higher than a physical-core count would, but
                // the 16 ceiling absorbs the difference on anything with 8+
                // logical cores.
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(8);
                (cores * 2).min(16)
            }
            n => n.min(MAX_WORKERS),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(&config_file)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }
}
