// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! The daemon reads a TOML file describing the tick interval, smoothing
//! window, debounce threshold, and control curve. Everything is validated
//! once at startup; a bad config never reaches the hardware.
//! Default path: `/etc/ecfand/config.toml`

use crate::curve::{CurveError, FanCurve};
use crate::ec;
use crate::percent::Percentage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ecfand/config.toml";

/// Default control tick, in seconds.
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 10;

/// Allowed tick range; anything outside is a configuration mistake.
pub const MIN_UPDATE_INTERVAL_SECS: u64 = 1;
pub const MAX_UPDATE_INTERVAL_SECS: u64 = 30;

/// Default moving-average window width, in samples.
pub const DEFAULT_MOVING_AVERAGE_WIDTH: usize = 4;

/// Widest allowed smoothing window.
pub const MAX_MOVING_AVERAGE_WIDTH: usize = 64;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between control cycles.
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Number of temperature samples averaged before the curve sees them.
    #[serde(default = "default_moving_average_width")]
    pub moving_average_width: usize,

    /// Minimum duty-cycle change (in percentage points) worth sending to
    /// the EC.
    #[serde(default = "default_debounce_threshold")]
    pub debounce_threshold: u8,

    /// Path to the EC character device.
    #[serde(default = "default_device_path")]
    pub device_path: String,

    /// Breakpoints of the control curve, in any order.
    #[serde(default)]
    pub curve: Vec<CurvePoint>,
}

/// One (temperature, duty) breakpoint as written in the config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CurvePoint {
    /// Temperature in degrees Celsius.
    pub temp_c: f32,
    /// Duty cycle 0-100.
    pub duty: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            moving_average_width: DEFAULT_MOVING_AVERAGE_WIDTH,
            debounce_threshold: crate::fan::DEFAULT_DEBOUNCE_THRESHOLD,
            device_path: ec::DEFAULT_DEVICE_PATH.to_string(),
            curve: vec![
                CurvePoint { temp_c: 45.0, duty: 0 },
                CurvePoint { temp_c: 55.0, duty: 25 },
                CurvePoint { temp_c: 65.0, duty: 40 },
                CurvePoint { temp_c: 75.0, duty: 60 },
                CurvePoint { temp_c: 85.0, duty: 100 },
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(
        "update_interval_secs must be between {MIN_UPDATE_INTERVAL_SECS} and \
         {MAX_UPDATE_INTERVAL_SECS}, got {0}"
    )]
    IntervalOutOfRange(u64),

    #[error("moving_average_width must be between 1 and {MAX_MOVING_AVERAGE_WIDTH}, got {0}")]
    WidthOutOfRange(usize),

    #[error(transparent)]
    Curve(#[from] CurveError),
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Check every field once at startup. Curve problems surface here too,
    /// via [`Config::build_curve`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_UPDATE_INTERVAL_SECS..=MAX_UPDATE_INTERVAL_SECS)
            .contains(&self.update_interval_secs)
        {
            return Err(ConfigError::IntervalOutOfRange(self.update_interval_secs));
        }
        if !(1..=MAX_MOVING_AVERAGE_WIDTH).contains(&self.moving_average_width) {
            return Err(ConfigError::WidthOutOfRange(self.moving_average_width));
        }
        self.build_curve()?;
        Ok(())
    }

    /// Build the fan curve from the configured breakpoints.
    pub fn build_curve(&self) -> Result<FanCurve, CurveError> {
        FanCurve::new(
            self.curve
                .iter()
                .map(|p| (p.temp_c, Percentage::new(i32::from(p.duty)))),
        )
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load config from a TOML file, or return the default if the file doesn't
/// exist. Validation is the caller's next step.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        log::info!("no config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&contents)?;

    log::info!("loaded config from {}", path.display());
    Ok(config)
}

/// Resolve the config file path from CLI arg or default.
pub fn resolve_config_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_update_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_SECS
}

fn default_moving_average_width() -> usize {
    DEFAULT_MOVING_AVERAGE_WIDTH
}

fn default_debounce_threshold() -> u8 {
    crate::fan::DEFAULT_DEBOUNCE_THRESHOLD
}

fn default_device_path() -> String {
    ec::DEFAULT_DEVICE_PATH.to_string()
}
