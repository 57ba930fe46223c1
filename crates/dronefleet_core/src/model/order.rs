//! Orders and the manifest view reconstructed from them.

use super::drone::{DroneId, DroneModel};
use super::item::ItemId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type OrderId = Uuid;

/// Committed assignment of one item to one drone. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub drone_id: DroneId,
    pub item_id: ItemId,
    pub created_at: i64,
}

/// Item summary inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub item_id: ItemId,
    pub name: String,
    pub code: String,
    pub weight: u32,
    pub image: Option<String>,
}

/// A drone plus every item currently assigned to it through orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub drone_id: DroneId,
    pub serial_number: String,
    pub model: DroneModel,
    pub items: Vec<ManifestItem>,
}

impl Manifest {
    /// Sum of item weights in grams.
    pub fn total_weight(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.weight)).sum()
    }
}
