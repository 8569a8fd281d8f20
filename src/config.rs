//! Settings, external tool names and timing knobs.
//!
//! Settings resolve in this order, later layers winning:
//! 1. Compiled defaults
//! 2. TOML settings file (`--config`, or `<config dir>/upscale-detector/settings.toml`)
//! 3. Command-line flags / environment variables

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "upscale-detector";
const SETTINGS_FILENAME: &str = "settings.toml";
const CACHE_FILENAME: &str = "check_cache.json";

pub const MAX_TOLERANCE_PERCENT: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisStrategy {
    /// Compare the probed stream bitrate against the declared one
    DeclaredProbe,
    /// Estimate the real bitrate with the true-bitrate tool
    TrueBitrateTool,
    /// Let the spectral cutoff tool judge the file
    SpectralTool,
}

impl fmt::Display for AnalysisStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisStrategy::DeclaredProbe => "declared-probe",
            AnalysisStrategy::TrueBitrateTool => "true-bitrate-tool",
            AnalysisStrategy::SpectralTool => "spectral-tool",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Settings {
    pub analysis_strategy: AnalysisStrategy,
    pub bitrate_tolerance_percent: u8,
    pub auto_check_on_download: bool,
    /// Gates both cache persistence and sidecar log writes.
    pub enable_logging: bool,
    pub music_root_directory: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            analysis_strategy: AnalysisStrategy::DeclaredProbe,
            bitrate_tolerance_percent: 10,
            auto_check_on_download: true,
            enable_logging: true,
            music_root_directory: None,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text).context("Invalid settings file")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("In settings file {}", path.display()))
    }

    /// Load the user's settings file if it exists, defaults otherwise.
    pub fn load_default() -> Result<Self> {
        match default_settings_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bitrate_tolerance_percent > MAX_TOLERANCE_PERCENT {
            anyhow::bail!(
                "bitrateTolerancePercent must be between 0 and {}, got {}",
                MAX_TOLERANCE_PERCENT,
                self.bitrate_tolerance_percent
            );
        }
        Ok(())
    }
}

/// Names (or paths) of the external analysis binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub probe: PathBuf,
    pub true_bitrate: PathBuf,
    pub spectral: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            probe: PathBuf::from("ffprobe"),
            true_bitrate: PathBuf::from("true-bitrate"),
            spectral: PathBuf::from("spectro"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Pause before touching a freshly downloaded file.
    pub settle_delay: Duration,
    /// Longest the idle worker blocks before re-checking for a stop request.
    pub poll_interval: Duration,
    pub join_timeout: Duration,
    pub probe_timeout: Duration,
    pub analysis_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(10),
            analysis_timeout: Duration::from_secs(60),
        }
    }
}

fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

pub fn default_settings_path() -> Option<PathBuf> {
    app_config_dir().map(|d| d.join(SETTINGS_FILENAME))
}

pub fn default_cache_path() -> Option<PathBuf> {
    app_config_dir().map(|d| d.join(CACHE_FILENAME))
}
