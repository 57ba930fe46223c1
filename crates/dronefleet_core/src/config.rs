//! Fleet configuration.
//!
//! # Responsibility
//! - Hold every threshold, limit and table the fleet components consult.
//! - Parse from JSON with per-field defaults and validate before use.
//!
//! # Invariants
//! - Components receive their section at construction; nothing reads
//!   thresholds from globals.
//! - `critical_threshold < low_threshold <= 100`.
//! - Serial prefix is exactly three upper-case alphanumerics.

use crate::model::drone::DroneModel;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Length of the fixed serial prefix.
pub const SERIAL_PREFIX_LEN: usize = 3;
/// Digits of the year embedded in each serial.
pub const SERIAL_YEAR_DIGITS: usize = 2;
/// Length of the trailing check digit.
pub const SERIAL_CHECK_DIGIT_LEN: usize = 1;

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "failed to parse fleet config: {err}"),
            Self::Invalid(message) => write!(f, "invalid fleet config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Root configuration for all fleet components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub loading: LoadingConfig,
    pub monitor: MonitorConfig,
    pub serial: SerialConfig,
}

impl FleetConfig {
    /// Parses a JSON document; absent fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.loading.validate()?;
        self.monitor.validate()?;
        self.serial.validate()?;
        Ok(())
    }
}

/// Per-model maximum carry capacity in grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCapacities {
    pub light_weight: u32,
    pub middleweight: u32,
    pub cruiserweight: u32,
    pub heavyweight: u32,
}

impl Default for ModelCapacities {
    fn default() -> Self {
        Self {
            light_weight: 150,
            middleweight: 300,
            cruiserweight: 400,
            heavyweight: 500,
        }
    }
}

impl ModelCapacities {
    pub fn capacity_for(&self, model: DroneModel) -> u32 {
        match model {
            DroneModel::LightWeight => self.light_weight,
            DroneModel::Middleweight => self.middleweight,
            DroneModel::Cruiserweight => self.cruiserweight,
            DroneModel::Heavyweight => self.heavyweight,
        }
    }
}

/// Loading controller limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingConfig {
    /// Absolute cap on the weight of one load request, in grams.
    pub max_weight_limit: u32,
    /// Minimum battery percentage required to start loading.
    pub min_battery_to_load: u8,
    /// Maximum distinct items per load request.
    pub max_items_per_load: usize,
    /// Battery percentage points consumed by a successful load.
    pub load_battery_cost: u8,
    /// Re-evaluations after an optimistic-concurrency conflict.
    pub max_conflict_retries: u32,
    pub min_declared_weight: u32,
    pub max_declared_weight: u32,
    pub capacities: ModelCapacities,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            max_weight_limit: 500,
            min_battery_to_load: 25,
            max_items_per_load: 5,
            load_battery_cost: 17,
            max_conflict_retries: 3,
            min_declared_weight: 1,
            max_declared_weight: 525,
            capacities: ModelCapacities::default(),
        }
    }
}

impl LoadingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_weight_limit == 0 {
            return Err(ConfigError::Invalid(
                "loading.max_weight_limit must be positive".to_string(),
            ));
        }
        if self.min_battery_to_load > 100 || self.load_battery_cost > 100 {
            return Err(ConfigError::Invalid(
                "loading battery values must be within 0..=100".to_string(),
            ));
        }
        if self.max_items_per_load == 0 {
            return Err(ConfigError::Invalid(
                "loading.max_items_per_load must be positive".to_string(),
            ));
        }
        if self.min_declared_weight > self.max_declared_weight {
            return Err(ConfigError::Invalid(format!(
                "loading declared weight range {}..={} is empty",
                self.min_declared_weight, self.max_declared_weight
            )));
        }
        Ok(())
    }
}

/// Battery monitor thresholds and cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Battery at or below this level is critical.
    pub critical_threshold: u8,
    /// Battery at or below this level (and above critical) is low.
    pub low_threshold: u8,
    pub scan_interval_ms: u64,
    pub history_default_limit: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            critical_threshold: 10,
            low_threshold: 25,
            scan_interval_ms: 5_000,
            history_default_limit: 100,
        }
    }
}

impl MonitorConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.critical_threshold >= self.low_threshold || self.low_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "monitor thresholds must satisfy critical < low <= 100, got critical={} low={}",
                self.critical_threshold, self.low_threshold
            )));
        }
        if self.scan_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "monitor.scan_interval_ms must be positive".to_string(),
            ));
        }
        if self.history_default_limit == 0 {
            return Err(ConfigError::Invalid(
                "monitor.history_default_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serial allocator format and backing counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub sequence_name: String,
    pub prefix: String,
    pub total_length: usize,
    pub increment: i64,
    pub max_value: Option<i64>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            sequence_name: "droneSequence".to_string(),
            prefix: "DRN".to_string(),
            total_length: 15,
            increment: 1,
            max_value: None,
        }
    }
}

impl SerialConfig {
    /// Number of base-36 characters available for the counter value.
    pub fn body_length(&self) -> usize {
        self.total_length
            .saturating_sub(SERIAL_PREFIX_LEN + SERIAL_YEAR_DIGITS + SERIAL_CHECK_DIGIT_LEN)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "serial.sequence_name must not be blank".to_string(),
            ));
        }
        let prefix_ok = self.prefix.len() == SERIAL_PREFIX_LEN
            && self
                .prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !prefix_ok {
            return Err(ConfigError::Invalid(format!(
                "serial.prefix must be {SERIAL_PREFIX_LEN} upper-case alphanumerics, got `{}`",
                self.prefix
            )));
        }
        if self.body_length() == 0 {
            return Err(ConfigError::Invalid(format!(
                "serial.total_length {} leaves no room for the counter",
                self.total_length
            )));
        }
        if self.increment <= 0 {
            return Err(ConfigError::Invalid(
                "serial.increment must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
