//! Named monotonic counters backing serial number allocation.

use super::ModelValidationError;
use serde::{Deserialize, Serialize};

/// Creation-time definition of a named counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDefinition {
    pub name: String,
    pub prefix: String,
    pub start_value: i64,
    pub increment: i64,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl SequenceDefinition {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            start_value: 0,
            increment: 1,
            min_value: None,
            max_value: None,
            description: None,
            metadata: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.name.trim().is_empty() {
            return Err(ModelValidationError::InvalidSequence("name must not be blank"));
        }
        if self.increment <= 0 {
            return Err(ModelValidationError::InvalidSequence("increment must be positive"));
        }
        if self.start_value < 0 {
            return Err(ModelValidationError::InvalidSequence(
                "start value cannot be negative",
            ));
        }
        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            if max <= min {
                return Err(ModelValidationError::InvalidSequence(
                    "max value must be greater than min value",
                ));
            }
        }
        if let Some(max) = self.max_value {
            if self.start_value > max {
                return Err(ModelValidationError::InvalidSequence(
                    "start value exceeds max value",
                ));
            }
        }
        Ok(())
    }
}

/// Persisted counter state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub name: String,
    pub current_value: i64,
    pub increment: i64,
    pub prefix: String,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub last_updated: i64,
    pub created_at: i64,
}
