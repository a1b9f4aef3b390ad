//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$HISPARC_CONFIG` environment variable
//! 2. `~/.config/hisparc/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use hisparc_core::error_model::DEFAULT_TIMING_ERROR;
use hisparc_core::{DetectorLayout, SpectrumOptions, Station};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub reconstruction: ReconstructionConfig,
    pub detectors: DetectorsConfig,
    pub spectrum: SpectrumConfig,
}

/// Dataset storage settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path. Default: platform-specific data dir.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Name of the reconstruction table.
    pub name: String,
    /// Timing error of a single detector, ns.
    pub timing_error: f64,
    /// Seed of the dither RNG. Unset: seeded from the OS.
    pub seed: Option<u64>,
    pub min_density: u16,
}

/// Station positions in meters, `[x, y]` per station.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DetectorsConfig {
    pub stations: Vec<[f64; 2]>,
}

/// Pulse-height spectrum settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub range_max: f64,
    pub n_bins: usize,
    pub station: u32,
    pub max_evaluations: usize,
}

// --- Defaults ---

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            name: "full".into(),
            timing_error: DEFAULT_TIMING_ERROR,
            seed: None,
            min_density: 1,
        }
    }
}

impl Default for DetectorsConfig {
    fn default() -> Self {
        Self {
            stations: DetectorLayout::default()
                .stations()
                .iter()
                .map(|s| [s.x, s.y])
                .collect(),
        }
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        let options = SpectrumOptions::default();
        Self {
            range_max: options.range_max,
            n_bins: options.n_bins,
            station: 601,
            max_evaluations: options.max_evaluations,
        }
    }
}

impl DetectorsConfig {
    pub fn layout(&self) -> Result<DetectorLayout> {
        let stations = self.stations.iter().map(|&[x, y]| Station::new(x, y)).collect();
        DetectorLayout::new(stations).context("invalid [detectors] section")
    }
}

impl SpectrumConfig {
    pub fn options(&self) -> SpectrumOptions {
        SpectrumOptions {
            range_max: self.range_max,
            n_bins: self.n_bins,
            max_evaluations: self.max_evaluations,
        }
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    // 1. Environment variable
    if let Ok(p) = std::env::var("HISPARC_CONFIG") {
        return Some(PathBuf::from(p));
    }

    // 2. ~/.config/hisparc/config.toml
    if let Some(home) = dirs_home() {
        let p = home.join(".config").join("hisparc").join("config.toml");
        return Some(p);
    }

    None
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

/// Show the active config path (for `hisparc config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}
