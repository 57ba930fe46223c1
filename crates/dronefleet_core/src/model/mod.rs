//! Fleet domain model.
//!
//! # Responsibility
//! - Define canonical records for drones, catalog items, orders, serial
//!   sequences and battery audit entries.
//! - Own entity-level validation shared by repositories and services.
//!
//! # Invariants
//! - Every persisted record is identified by a stable UUID (sequences by name).
//! - Drones are never hard-deleted; `is_deleted` is the tombstone.
//! - Orders and audit entries are append-only.

pub mod audit;
pub mod drone;
pub mod item;
pub mod order;
pub mod sequence;

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Entity invariant violations detected before persistence or after read-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    NilId,
    BatteryOutOfRange(u8),
    EmptySerialNumber,
    UnknownModel(String),
    UnknownState(String),
    UnknownAlertType(String),
    InvalidItemName(String),
    InvalidItemCode(String),
    ItemWeightOutOfRange { weight: u32, min: u32, max: u32 },
    InvalidSequence(&'static str),
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "id must not be nil"),
            Self::BatteryOutOfRange(value) => {
                write!(f, "battery must be within 0..=100, got {value}")
            }
            Self::EmptySerialNumber => write!(f, "serial number must not be empty"),
            Self::UnknownModel(value) => write!(
                f,
                "unknown drone model `{value}`; expected LightWeight|Middleweight|Cruiserweight|Heavyweight"
            ),
            Self::UnknownState(value) => write!(f, "unknown drone state `{value}`"),
            Self::UnknownAlertType(value) => write!(f, "unknown alert type `{value}`"),
            Self::InvalidItemName(value) => write!(
                f,
                "item name `{value}` may only contain letters, numbers, hyphen and underscore"
            ),
            Self::InvalidItemCode(value) => write!(
                f,
                "item code `{value}` may only contain upper-case letters, numbers and underscore"
            ),
            Self::ItemWeightOutOfRange { weight, min, max } => {
                write!(f, "item weight {weight}g outside {min}..={max}g")
            }
            Self::InvalidSequence(details) => write!(f, "invalid sequence definition: {details}"),
        }
    }
}

impl Error for ModelValidationError {}
