//! Deliverable catalog item.
//!
//! Items are owned by the external catalog; the fleet core only reads them
//! to validate existence and weight during loading.

use super::ModelValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ItemId = Uuid;

pub const ITEM_MIN_WEIGHT: u32 = 1;
pub const ITEM_MAX_WEIGHT: u32 = 10_000;

static ITEM_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid item name regex"));
static ITEM_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9_]+$").expect("valid item code regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableItem {
    pub id: ItemId,
    pub name: String,
    /// Weight in grams.
    pub weight: u32,
    pub code: String,
    pub image: Option<String>,
}

impl DeliverableItem {
    pub fn new(name: impl Into<String>, weight: u32, code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            weight,
            code: code.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.id.is_nil() {
            return Err(ModelValidationError::NilId);
        }
        if !ITEM_NAME_RE.is_match(&self.name) {
            return Err(ModelValidationError::InvalidItemName(self.name.clone()));
        }
        if !ITEM_CODE_RE.is_match(&self.code) {
            return Err(ModelValidationError::InvalidItemCode(self.code.clone()));
        }
        if !(ITEM_MIN_WEIGHT..=ITEM_MAX_WEIGHT).contains(&self.weight) {
            return Err(ModelValidationError::ItemWeightOutOfRange {
                weight: self.weight,
                min: ITEM_MIN_WEIGHT,
                max: ITEM_MAX_WEIGHT,
            });
        }
        Ok(())
    }
}
