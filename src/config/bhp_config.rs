//! BHP Configuration - calculator tolerances as operator-tunable values
//!
//! Every tolerance the calculator consults lives here. Each field has a
//! serde default matching `config::defaults`, so an empty or partial TOML
//! file yields a complete config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults::{
    CONFIG_ENV_VAR, CONFIG_FILE_NAME, DEFAULT_FIXED_OFFSET_TOLERANCE_SECS,
    DEFAULT_MAX_OFFSET_MINUTES, DEFAULT_MAX_TIME_DIFF_SECS, DEFAULT_MIN_OFFSET_MINUTES,
    DEFAULT_WINDOW_SIZE_SECS,
};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Config
// ============================================================================

/// Runtime-tunable tolerances consumed by the calculator.
///
/// Load with `BhpConfig::load()` which searches:
/// 1. `$BHP_CONFIG` env var
/// 2. `./bhp_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BhpConfig {
    /// Maximum gap between the ideal historical timestamp and the sample
    /// actually used (seconds)
    #[serde(default = "default_max_time_diff")]
    pub max_time_diff_seconds: f64,

    /// Longest accepted rate-derived travel time (minutes)
    #[serde(default = "default_max_offset")]
    pub max_offset_minutes: f64,

    /// Shortest accepted rate-derived travel time (minutes)
    #[serde(default = "default_min_offset")]
    pub min_offset_minutes: f64,

    /// Sliding window span (seconds)
    #[serde(default = "default_window_size")]
    pub window_size_seconds: f64,

    /// Acceptance tolerance for fixed-offset lookups (seconds)
    #[serde(default = "default_fixed_tolerance")]
    pub fixed_offset_tolerance_seconds: f64,
}

fn default_max_time_diff() -> f64 { DEFAULT_MAX_TIME_DIFF_SECS }
fn default_max_offset() -> f64 { DEFAULT_MAX_OFFSET_MINUTES }
fn default_min_offset() -> f64 { DEFAULT_MIN_OFFSET_MINUTES }
fn default_window_size() -> f64 { DEFAULT_WINDOW_SIZE_SECS }
fn default_fixed_tolerance() -> f64 { DEFAULT_FIXED_OFFSET_TOLERANCE_SECS }

impl Default for BhpConfig {
    fn default() -> Self {
        Self {
            max_time_diff_seconds: default_max_time_diff(),
            max_offset_minutes: default_max_offset(),
            min_offset_minutes: default_min_offset(),
            window_size_seconds: default_window_size(),
            fixed_offset_tolerance_seconds: default_fixed_tolerance(),
        }
    }
}

impl BhpConfig {
    /// Load configuration using the standard search order:
    /// 1. `$BHP_CONFIG` environment variable
    /// 2. `./bhp_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded BHP config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded BHP config from ./{}", CONFIG_FILE_NAME);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", CONFIG_FILE_NAME);
                }
            }
        }

        info!("No {} found, using built-in defaults", CONFIG_FILE_NAME);
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys are logged as warnings; range violations are errors.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "BHP config saved");
        Ok(())
    }

    /// Window span in milliseconds.
    #[allow(clippy::cast_possible_truncation)]
    pub fn window_size_ms(&self) -> i64 {
        (self.window_size_seconds * 1000.0).round() as i64
    }

    /// Validate every field.
    ///
    /// Rules:
    /// - All values finite
    /// - `max_time_diff_seconds`, `max_offset_minutes`, `window_size_seconds`
    ///   and `fixed_offset_tolerance_seconds` strictly positive
    /// - `min_offset_minutes >= 0` and `< max_offset_minutes`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let fields = [
            ("max_time_diff_seconds", self.max_time_diff_seconds),
            ("max_offset_minutes", self.max_offset_minutes),
            ("min_offset_minutes", self.min_offset_minutes),
            ("window_size_seconds", self.window_size_seconds),
            ("fixed_offset_tolerance_seconds", self.fixed_offset_tolerance_seconds),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                errors.push(format!("{name} must be a finite number (got {value})"));
            }
        }
        if !errors.is_empty() {
            // NaN comparisons below would silently pass
            return Err(ConfigError::Validation(errors));
        }

        Self::check_positive(self.max_time_diff_seconds, "max_time_diff_seconds", &mut errors);
        Self::check_positive(self.max_offset_minutes, "max_offset_minutes", &mut errors);
        Self::check_positive(self.window_size_seconds, "window_size_seconds", &mut errors);
        Self::check_positive(
            self.fixed_offset_tolerance_seconds,
            "fixed_offset_tolerance_seconds",
            &mut errors,
        );

        if self.min_offset_minutes < 0.0 {
            errors.push(format!(
                "min_offset_minutes ({:.3}) cannot be negative",
                self.min_offset_minutes
            ));
        }
        if self.min_offset_minutes >= self.max_offset_minutes {
            errors.push(format!(
                "min_offset_minutes ({:.3}) must be less than max_offset_minutes ({:.3})",
                self.min_offset_minutes, self.max_offset_minutes
            ));
        }

        for w in super::validation::validate_ranges(self) {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        if value <= 0.0 {
            errors.push(format!("{name} must be > 0 (got {value})"));
        }
    }

    /// Build a candidate config with `update` applied on top of `self`.
    ///
    /// The candidate is validated; `self` is never modified.
    pub fn with_update(&self, update: &BhpConfigUpdate) -> Result<Self, ConfigError> {
        let candidate = Self {
            max_time_diff_seconds: update
                .max_time_diff_seconds
                .unwrap_or(self.max_time_diff_seconds),
            max_offset_minutes: update.max_offset_minutes.unwrap_or(self.max_offset_minutes),
            min_offset_minutes: update.min_offset_minutes.unwrap_or(self.min_offset_minutes),
            window_size_seconds: update.window_size_seconds.unwrap_or(self.window_size_seconds),
            fixed_offset_tolerance_seconds: update
                .fixed_offset_tolerance_seconds
                .unwrap_or(self.fixed_offset_tolerance_seconds),
        };
        candidate.validate()?;
        Ok(candidate)
    }
}

// ============================================================================
// Partial Update
// ============================================================================

/// Partial config replacement. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BhpConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_diff_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_offset_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_offset_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_offset_tolerance_seconds: Option<f64>,
}

impl BhpConfigUpdate {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
