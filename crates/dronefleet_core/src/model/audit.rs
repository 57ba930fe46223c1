//! Battery audit trail records.
//!
//! # Invariants
//! - Entries are immutable once written.
//! - `state` is the drone state observed before any transition the monitor
//!   applied in the same cycle.

use super::drone::{Drone, DroneId, DroneState};
use super::ModelValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

pub type AuditEntryId = Uuid;

/// Battery risk classification of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Normal,
    LowBattery,
    CriticalBattery,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::LowBattery => "LOW_BATTERY",
            Self::CriticalBattery => "CRITICAL_BATTERY",
        }
    }
}

impl Display for AlertType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = ModelValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "NORMAL" => Ok(Self::Normal),
            "LOW_BATTERY" => Ok(Self::LowBattery),
            "CRITICAL_BATTERY" => Ok(Self::CriticalBattery),
            other => Err(ModelValidationError::UnknownAlertType(other.to_string())),
        }
    }
}

/// State decision taken by the monitor for one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub previous_state: DroneState,
    pub new_state: DroneState,
    pub reason: String,
}

impl StateUpdate {
    pub fn is_transition(&self) -> bool {
        self.previous_state != self.new_state
    }
}

/// Free-form metadata stored as JSON next to each entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub state_update: Option<StateUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryAuditEntry {
    pub id: AuditEntryId,
    pub drone_id: DroneId,
    pub serial_number: String,
    pub state: DroneState,
    pub battery_level: u8,
    pub alert_type: AlertType,
    /// Observation time in epoch milliseconds.
    pub recorded_at: i64,
    pub metadata: AuditMetadata,
}

impl BatteryAuditEntry {
    /// Builds an entry from the drone as it was observed.
    pub fn observe(
        drone: &Drone,
        alert_type: AlertType,
        state_update: Option<StateUpdate>,
        recorded_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            drone_id: drone.id,
            serial_number: drone.serial_number.clone(),
            state: drone.state,
            battery_level: drone.battery,
            alert_type,
            recorded_at,
            metadata: AuditMetadata { state_update },
        }
    }
}
