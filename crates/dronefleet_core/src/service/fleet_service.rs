//! Fleet loading controller and drone lifecycle API.
//!
//! # Responsibility
//! - Register drones with allocated serials.
//! - Validate and commit load requests against state, battery, item count,
//!   per-request weight and model capacity.
//! - Serve the read side: drone view, availability, battery health,
//!   manifest, remaining capacity.
//!
//! # Invariants
//! - Load checks run in a fixed order and the first failure wins:
//!   drone exists, state eligible, battery, item count, items exist,
//!   weight limit, capacity.
//! - A drone is eligible when `Idle`, or `Loaded` with capacity left; a
//!   `Loaded` drone keeps its earlier orders and gets the new ones appended.
//! - A successful load writes orders, flips the drone to `Loaded` and
//!   deducts `load_battery_cost` in one transaction guarded by the drone's
//!   state and version.
//! - Soft-deleted drones are invisible to every operation here.

use crate::config::{FleetConfig, LoadingConfig};
use crate::model::drone::{Drone, DroneId, DroneModel, DroneState, DroneView};
use crate::model::item::ItemId;
use crate::model::order::Manifest;
use crate::model::sequence::SequenceRecord;
use crate::repo::drone_repo::{
    DroneListQuery, DroneRepository, RepoError, SqliteDroneRepository,
};
use crate::repo::item_repo::{ItemCatalog, SqliteItemCatalog};
use crate::repo::order_repo::{LoadCommit, OrderRepository, SqliteOrderRepository};
use crate::repo::sequence_repo::{SequenceRepository, SqliteSequenceRepository};
use crate::service::capacity::{CapacityLedger, CapacityReport};
use crate::service::serial::{AllocationError, SerialAllocator};
use crate::service::{system_clock, Clock, ErrorKind};
use log::{info, warn};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum FleetError {
    DroneNotFound(DroneId),
    InvalidArgument(String),
    /// Drone is neither `Idle` nor `Loaded` with room left.
    InvalidState {
        drone_id: DroneId,
        state: DroneState,
        remaining_capacity: i64,
    },
    InsufficientBattery { battery: u8, minimum: u8 },
    TooManyItems { requested: usize, max: usize },
    ItemsNotFound { requested: usize, found: usize },
    WeightLimitExceeded { total: u64, limit: u32 },
    CapacityExceeded { requested: u64, remaining: i64 },
    /// The drone kept changing underneath the load.
    Conflict { drone_id: DroneId, attempts: u32 },
    TransitionNotSupported {
        operation: &'static str,
        drone_id: DroneId,
    },
    /// Storage accepted a write but the read-back disagrees.
    InconsistentState(&'static str),
    Allocation(AllocationError),
    Repo(RepoError),
}

impl FleetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DroneNotFound(_) | Self::ItemsNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidArgument(_) | Self::TooManyItems { .. } => ErrorKind::InvalidArgument,
            Self::InvalidState { .. }
            | Self::InsufficientBattery { .. }
            | Self::WeightLimitExceeded { .. }
            | Self::CapacityExceeded { .. } => ErrorKind::PreconditionFailed,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::TransitionNotSupported { .. } => ErrorKind::Unsupported,
            Self::Allocation(_) => ErrorKind::Allocation,
            Self::InconsistentState(_) | Self::Repo(_) => ErrorKind::Internal,
        }
    }
}

impl Display for FleetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DroneNotFound(id) => write!(f, "drone not found: {id}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::InvalidState {
                drone_id,
                state,
                remaining_capacity,
            } => write!(
                f,
                "drone {drone_id} cannot load: state {state}, remaining capacity {remaining_capacity}g"
            ),
            Self::InsufficientBattery { battery, minimum } => write!(
                f,
                "battery {battery}% is below the {minimum}% required to load"
            ),
            Self::TooManyItems { requested, max } => {
                write!(f, "{requested} items requested, at most {max} per load")
            }
            Self::ItemsNotFound { requested, found } => {
                write!(f, "{found} of {requested} requested items exist")
            }
            Self::WeightLimitExceeded { total, limit } => {
                write!(f, "total weight {total}g exceeds the {limit}g limit")
            }
            Self::CapacityExceeded {
                requested,
                remaining,
            } => write!(
                f,
                "total weight {requested}g exceeds remaining capacity {remaining}g"
            ),
            Self::Conflict { drone_id, attempts } => write!(
                f,
                "drone {drone_id} changed concurrently; gave up after {attempts} attempts"
            ),
            Self::TransitionNotSupported {
                operation,
                drone_id,
            } => write!(f, "{operation} is not supported (drone {drone_id})"),
            Self::InconsistentState(message) => write!(f, "inconsistent state: {message}"),
            Self::Allocation(err) => write!(f, "serial allocation failed: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FleetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Allocation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for FleetError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::DroneNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<AllocationError> for FleetError {
    fn from(value: AllocationError) -> Self {
        Self::Allocation(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryHealth {
    pub battery: u8,
}

/// Fleet service facade.
pub struct FleetService<D, I, O, S>
where
    D: DroneRepository,
    I: ItemCatalog,
    O: OrderRepository,
    S: SequenceRepository,
{
    drones: D,
    items: I,
    orders: O,
    serials: SerialAllocator<S>,
    config: LoadingConfig,
    clock: Clock,
}

/// Fleet service wired to one SQLite connection.
pub type SqliteFleetService<'conn> = FleetService<
    SqliteDroneRepository<'conn>,
    SqliteItemCatalog<'conn>,
    SqliteOrderRepository<'conn>,
    SqliteSequenceRepository<'conn>,
>;

/// Builds a fleet service whose repositories share `conn`.
pub fn sqlite_fleet_service<'conn>(
    conn: &'conn Connection,
    config: &FleetConfig,
) -> SqliteFleetService<'conn> {
    FleetService::new(
        SqliteDroneRepository::new(conn),
        SqliteItemCatalog::new(conn),
        SqliteOrderRepository::new(conn),
        SqliteSequenceRepository::new(conn),
        config,
    )
}

impl<D, I, O, S> FleetService<D, I, O, S>
where
    D: DroneRepository,
    I: ItemCatalog,
    O: OrderRepository,
    S: SequenceRepository,
{
    pub fn new(drones: D, items: I, orders: O, sequences: S, config: &FleetConfig) -> Self {
        Self {
            drones,
            items,
            orders,
            serials: SerialAllocator::new(sequences, config.serial.clone()),
            config: config.loading.clone(),
            clock: system_clock,
        }
    }

    /// Pins the clock for this service and its serial allocator.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.serials = self.serials.with_clock(clock);
        self
    }

    /// Creates the serial counter if absent.
    pub fn initialize(&self) -> Result<SequenceRecord, FleetError> {
        self.serials.initialize().map_err(Into::into)
    }

    pub fn serials(&self) -> &SerialAllocator<S> {
        &self.serials
    }

    /// Registers one drone: `Idle`, battery 100, fresh serial.
    pub fn create_drone(&self, model: DroneModel, weight: u32) -> Result<DroneView, FleetError> {
        if weight < self.config.min_declared_weight || weight > self.config.max_declared_weight {
            return Err(FleetError::InvalidArgument(format!(
                "weight {weight}g outside {}..={}g",
                self.config.min_declared_weight, self.config.max_declared_weight
            )));
        }

        let serial_number = self.serials.allocate()?;
        let drone = Drone::new(serial_number, model, weight, (self.clock)());
        self.drones.create_drone(&drone)?;
        info!(
            "event=drone_create module=fleet status=ok drone_id={} serial={} model={}",
            drone.id, drone.serial_number, drone.model
        );
        Ok(DroneView::from(&drone))
    }

    /// Same as [`Self::create_drone`] with the model given by name.
    pub fn create_drone_named(&self, model: &str, weight: u32) -> Result<DroneView, FleetError> {
        let model = model
            .parse::<DroneModel>()
            .map_err(|err| FleetError::InvalidArgument(err.to_string()))?;
        self.create_drone(model, weight)
    }

    /// Assigns items to an idle or partly loaded drone and marks it `Loaded`.
    ///
    /// Duplicate ids count once. On a concurrent change to the drone the
    /// whole check sequence is re-run against fresh state.
    pub fn load_items(&self, drone_id: DroneId, item_ids: &[ItemId]) -> Result<Manifest, FleetError> {
        let unique_ids = dedup_preserving_order(item_ids);
        let mut attempts = 0_u32;

        loop {
            attempts += 1;
            let commit = self.check_load(drone_id, &unique_ids)?;

            match self.orders.commit_load(&commit)? {
                Some(updated) => {
                    let manifest = self
                        .orders
                        .manifest(drone_id)?
                        .ok_or(FleetError::InconsistentState("loaded drone has no manifest"))?;
                    info!(
                        "event=drone_load module=fleet status=ok drone_id={drone_id} items={} total_weight={} battery={} attempts={attempts}",
                        unique_ids.len(),
                        manifest.total_weight(),
                        updated.battery
                    );
                    return Ok(manifest);
                }
                None if attempts > self.config.max_conflict_retries => {
                    warn!(
                        "event=drone_load module=fleet status=error drone_id={drone_id} reason=conflict attempts={attempts}"
                    );
                    return Err(FleetError::Conflict { drone_id, attempts });
                }
                None => {
                    warn!(
                        "event=drone_load module=fleet status=retry drone_id={drone_id} attempt={attempts}"
                    );
                }
            }
        }
    }

    fn check_load(&self, drone_id: DroneId, item_ids: &[ItemId]) -> Result<LoadCommit, FleetError> {
        let drone = self.require_drone(drone_id)?;

        let capacity = self.ledger().remaining_capacity(&drone)?;
        let eligible = match drone.state {
            DroneState::Idle => true,
            DroneState::Loaded => capacity.has_room(),
            _ => false,
        };
        if !eligible {
            return Err(FleetError::InvalidState {
                drone_id,
                state: drone.state,
                remaining_capacity: capacity.remaining_capacity,
            });
        }

        if drone.battery < self.config.min_battery_to_load {
            return Err(FleetError::InsufficientBattery {
                battery: drone.battery,
                minimum: self.config.min_battery_to_load,
            });
        }

        if item_ids.is_empty() {
            return Err(FleetError::InvalidArgument(
                "at least one item is required".to_string(),
            ));
        }
        if item_ids.len() > self.config.max_items_per_load {
            return Err(FleetError::TooManyItems {
                requested: item_ids.len(),
                max: self.config.max_items_per_load,
            });
        }

        let items = self.items.find_many(item_ids)?;
        if items.len() != item_ids.len() {
            return Err(FleetError::ItemsNotFound {
                requested: item_ids.len(),
                found: items.len(),
            });
        }

        let total: u64 = items.iter().map(|item| u64::from(item.weight)).sum();
        if total > u64::from(self.config.max_weight_limit) {
            return Err(FleetError::WeightLimitExceeded {
                total,
                limit: self.config.max_weight_limit,
            });
        }
        if !capacity.fits(total) {
            return Err(FleetError::CapacityExceeded {
                requested: total,
                remaining: capacity.remaining_capacity,
            });
        }

        Ok(LoadCommit {
            drone_id,
            item_ids: item_ids.to_vec(),
            expected_state: drone.state,
            expected_version: drone.version,
            new_state: DroneState::Loaded,
            battery_cost: self.config.load_battery_cost,
            at_ms: (self.clock)(),
        })
    }

    pub fn get_drone(&self, drone_id: DroneId) -> Result<DroneView, FleetError> {
        self.require_drone(drone_id).map(|drone| DroneView::from(&drone))
    }

    /// Every active drone currently `Idle`.
    pub fn list_available_drones(&self) -> Result<Vec<DroneView>, FleetError> {
        let drones = self.drones.list_drones(&DroneListQuery {
            state: Some(DroneState::Idle),
            ..DroneListQuery::default()
        })?;
        Ok(drones.iter().map(DroneView::from).collect())
    }

    pub fn get_battery_health(&self, drone_id: DroneId) -> Result<BatteryHealth, FleetError> {
        let drone = self.require_drone(drone_id)?;
        Ok(BatteryHealth {
            battery: drone.battery,
        })
    }

    pub fn get_manifest(&self, drone_id: DroneId) -> Result<Manifest, FleetError> {
        self.require_drone(drone_id)?;
        self.orders
            .manifest(drone_id)?
            .ok_or(FleetError::DroneNotFound(drone_id))
    }

    pub fn capacity(&self, drone_id: DroneId) -> Result<CapacityReport, FleetError> {
        let drone = self.require_drone(drone_id)?;
        self.ledger().remaining_capacity(&drone).map_err(Into::into)
    }

    /// Stores a telemetry battery reading.
    pub fn record_battery_level(&self, drone_id: DroneId, battery: u8) -> Result<DroneView, FleetError> {
        if battery > 100 {
            return Err(FleetError::InvalidArgument(format!(
                "battery must be within 0..=100, got {battery}"
            )));
        }
        self.require_drone(drone_id)?;
        let drone = self
            .drones
            .record_battery_level(drone_id, battery, (self.clock)())?;
        Ok(DroneView::from(&drone))
    }

    /// Soft-deletes a drone. Its orders and audit history are kept.
    pub fn decommission_drone(&self, drone_id: DroneId) -> Result<(), FleetError> {
        self.require_drone(drone_id)?;
        self.drones.soft_delete_drone(drone_id, (self.clock)())?;
        info!("event=drone_decommission module=fleet status=ok drone_id={drone_id}");
        Ok(())
    }

    /// Unloading has no defined transition yet.
    pub fn unload_drone(&self, drone_id: DroneId) -> Result<Manifest, FleetError> {
        self.require_drone(drone_id)?;
        Err(FleetError::TransitionNotSupported {
            operation: "unload",
            drone_id,
        })
    }

    fn ledger(&self) -> CapacityLedger<'_, O> {
        CapacityLedger::new(&self.orders, self.config.capacities)
    }

    fn require_drone(&self, drone_id: DroneId) -> Result<Drone, FleetError> {
        self.drones
            .get_drone(drone_id, false)?
            .ok_or(FleetError::DroneNotFound(drone_id))
    }
}

fn dedup_preserving_order(ids: &[ItemId]) -> Vec<ItemId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
