//! Configuration using Figment.
//!
//! Settings are merged from, lowest precedence first:
//! 1. built-in defaults
//! 2. `config/pco_transfer.toml`, or the file given with `--config`
//! 3. environment variables prefixed with `PCO_TRANSFER_`
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! PCO_TRANSFER_LOG_LEVEL=debug
//! PCO_TRANSFER_SEGMENT=2
//! PCO_TRANSFER_CONTAINER__MAX_FILE_BYTES=1073741824
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use pco_driver::{FrameGeometry, SegmentId};
use pco_storage::{
    ContainerLimits, MIN_FRAME_OVERHEAD_BYTES, TIFF_ADDRESS_LIMIT, TIFF_HEADROOM_BYTES,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file read when no `--config` is given. Optional.
pub const DEFAULT_CONFIG_PATH: &str = "config/pco_transfer.toml";
/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "PCO_TRANSFER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration file {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
    #[error("Could not render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

/// Effective settings for the `pco_transfer` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Camera memory segment to read, numbered from 1.
    pub segment: u16,
    /// Log transfer progress every this many frames; 0 disables it.
    pub progress_interval: usize,
    /// TIFF output size accounting.
    pub container: ContainerLimits,
    /// Segment served by the simulated camera.
    pub simulation: SimulationConfig,
}

/// Recorded segment the simulated camera presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub valid_frames: u32,
    pub max_frames: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            segment: 1,
            progress_interval: 100,
            container: ContainerLimits::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            valid_frames: 200,
            max_frames: 1000,
            width: 512,
            height: 512,
        }
    }
}

impl SimulationConfig {
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height)
    }
}

impl Settings {
    /// Load and validate settings.
    ///
    /// `path` names a configuration file that must exist. Without it the
    /// default file is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        let settings: Self = Self::figment(&file).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Provider chain behind [`load`](Self::load).
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Check values the types alone do not rule out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.segment == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid segment 0. Segments are numbered from 1".to_string(),
            ));
        }

        let ceiling = self.container.max_file_bytes;
        let max_ceiling = TIFF_ADDRESS_LIMIT - TIFF_HEADROOM_BYTES;
        if ceiling == 0 || ceiling > max_ceiling {
            return Err(ConfigError::ValidationError(format!(
                "Invalid container.max_file_bytes {ceiling}. Must be between 1 and {max_ceiling}"
            )));
        }

        let overhead = self.container.frame_overhead_bytes;
        if overhead < MIN_FRAME_OVERHEAD_BYTES {
            return Err(ConfigError::ValidationError(format!(
                "Invalid container.frame_overhead_bytes {overhead}. Must be at least {MIN_FRAME_OVERHEAD_BYTES}"
            )));
        }

        let sim = &self.simulation;
        if sim.width == 0 || sim.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid simulation frame size {}x{}. Both sides must be at least 1",
                sim.width, sim.height
            )));
        }
        if sim.valid_frames > sim.max_frames {
            return Err(ConfigError::ValidationError(format!(
                "simulation.valid_frames ({}) exceeds simulation.max_frames ({})",
                sim.valid_frames, sim.max_frames
            )));
        }

        Ok(())
    }

    pub fn segment_id(&self) -> Result<SegmentId, ConfigError> {
        SegmentId::new(self.segment).ok_or_else(|| {
            ConfigError::ValidationError("Invalid segment 0. Segments are numbered from 1".into())
        })
    }

    /// Settings rendered as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
