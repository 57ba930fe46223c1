//! Capacity ledger.
//!
//! # Responsibility
//! - Answer "how much more weight can this drone take" from its model
//!   capacity and the item weights already committed through orders.
//!
//! # Invariants
//! - `remaining_capacity = max_capacity - committed_weight`; it may be
//!   negative when capacities were lowered after orders were committed.
//! - Reads only. Nothing here writes orders.

use crate::config::ModelCapacities;
use crate::model::drone::Drone;
use crate::repo::drone_repo::RepoResult;
use crate::repo::order_repo::OrderRepository;
use serde::{Deserialize, Serialize};

/// Capacity snapshot for one drone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityReport {
    pub max_capacity: u32,
    pub committed_weight: u64,
    pub remaining_capacity: i64,
}

impl CapacityReport {
    pub fn has_room(&self) -> bool {
        self.remaining_capacity > 0
    }

    /// Whether `weight` more grams still fit.
    pub fn fits(&self, weight: u64) -> bool {
        i64::try_from(weight).map_or(false, |weight| weight <= self.remaining_capacity)
    }
}

/// Ledger view over the order repository.
pub struct CapacityLedger<'r, O: OrderRepository> {
    orders: &'r O,
    capacities: ModelCapacities,
}

impl<'r, O: OrderRepository> CapacityLedger<'r, O> {
    pub fn new(orders: &'r O, capacities: ModelCapacities) -> Self {
        Self { orders, capacities }
    }

    pub fn max_capacity(&self, drone: &Drone) -> u32 {
        self.capacities.capacity_for(drone.model)
    }

    pub fn remaining_capacity(&self, drone: &Drone) -> RepoResult<CapacityReport> {
        let max_capacity = self.max_capacity(drone);
        let committed_weight = self.orders.committed_weight(drone.id)?;
        let committed = i64::try_from(committed_weight).unwrap_or(i64::MAX);
        Ok(CapacityReport {
            max_capacity,
            committed_weight,
            remaining_capacity: i64::from(max_capacity).saturating_sub(committed),
        })
    }
}
