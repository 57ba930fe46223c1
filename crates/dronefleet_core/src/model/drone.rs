//! Drone domain model.
//!
//! # Invariants
//! - `battery` stays within `0..=100`.
//! - `serial_number` is assigned once at creation and never rewritten.
//! - `version` increases by one on every persisted mutation; conditional
//!   updates match on it.

use super::ModelValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

pub type DroneId = Uuid;

/// Full battery level assigned to newly registered drones.
pub const FULL_BATTERY: u8 = 100;

/// Weight tier of a drone. Each tier maps to a fixed carry capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DroneModel {
    LightWeight,
    Middleweight,
    Cruiserweight,
    Heavyweight,
}

impl DroneModel {
    pub const ALL: [DroneModel; 4] = [
        DroneModel::LightWeight,
        DroneModel::Middleweight,
        DroneModel::Cruiserweight,
        DroneModel::Heavyweight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LightWeight => "LightWeight",
            Self::Middleweight => "Middleweight",
            Self::Cruiserweight => "Cruiserweight",
            Self::Heavyweight => "Heavyweight",
        }
    }
}

impl Display for DroneModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DroneModel {
    type Err = ModelValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|model| model.as_str() == value)
            .ok_or_else(|| ModelValidationError::UnknownModel(value.to_string()))
    }
}

/// Operational state of a drone.
///
/// `Loading`, `Delivering` and `Delivered` are part of the persisted
/// vocabulary, but no exposed operation transitions into them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DroneState {
    Idle,
    Loading,
    Loaded,
    Delivering,
    Delivered,
    Returning,
}

impl DroneState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Loaded => "LOADED",
            Self::Delivering => "DELIVERING",
            Self::Delivered => "DELIVERED",
            Self::Returning => "RETURNING",
        }
    }
}

impl Display for DroneState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DroneState {
    type Err = ModelValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "IDLE" => Ok(Self::Idle),
            "LOADING" => Ok(Self::Loading),
            "LOADED" => Ok(Self::Loaded),
            "DELIVERING" => Ok(Self::Delivering),
            "DELIVERED" => Ok(Self::Delivered),
            "RETURNING" => Ok(Self::Returning),
            other => Err(ModelValidationError::UnknownState(other.to_string())),
        }
    }
}

/// Canonical drone record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drone {
    pub id: DroneId,
    /// Human-facing identifier issued by the serial allocator.
    pub serial_number: String,
    pub model: DroneModel,
    /// Declared max carry weight in grams, as registered.
    pub weight: u32,
    pub state: DroneState,
    /// Battery percentage, `0..=100`.
    pub battery: u8,
    /// Epoch milliseconds of the last state transition, if any.
    pub last_state_change: Option<i64>,
    /// Optimistic concurrency token.
    pub version: i64,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Drone {
    /// Creates an idle, fully charged drone with a fresh id.
    pub fn new(
        serial_number: impl Into<String>,
        model: DroneModel,
        weight: u32,
        now_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            serial_number: serial_number.into(),
            model,
            weight,
            state: DroneState::Idle,
            battery: FULL_BATTERY,
            last_state_change: None,
            version: 0,
            is_deleted: false,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.id.is_nil() {
            return Err(ModelValidationError::NilId);
        }
        if self.serial_number.trim().is_empty() {
            return Err(ModelValidationError::EmptySerialNumber);
        }
        if self.battery > FULL_BATTERY {
            return Err(ModelValidationError::BatteryOutOfRange(self.battery));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Caller-facing projection of a drone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroneView {
    pub id: DroneId,
    pub serial_number: String,
    pub model: DroneModel,
    pub state: DroneState,
    pub weight: u32,
    pub battery: u8,
}

impl From<&Drone> for DroneView {
    fn from(drone: &Drone) -> Self {
        Self {
            id: drone.id,
            serial_number: drone.serial_number.clone(),
            model: drone.model,
            state: drone.state,
            weight: drone.weight,
            battery: drone.battery,
        }
    }
}
