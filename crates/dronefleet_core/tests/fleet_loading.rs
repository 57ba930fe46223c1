use dronefleet_core::db::open_db_in_memory;
use dronefleet_core::model::order::{Manifest, Order};
use dronefleet_core::repo::drone_repo::{
    DroneRepository, RepoResult, SqliteDroneRepository, StateTransition,
};
use dronefleet_core::repo::item_repo::{ItemCatalog, SqliteItemCatalog};
use dronefleet_core::repo::order_repo::{LoadCommit, OrderRepository, SqliteOrderRepository};
use dronefleet_core::repo::sequence_repo::SqliteSequenceRepository;
use dronefleet_core::{
    is_valid_serial, sqlite_fleet_service, AllocationError, DeliverableItem, Drone, DroneId,
    DroneModel, DroneState, ErrorKind, FleetConfig, FleetError, FleetService, ItemId,
    SqliteFleetService,
};
use rusqlite::Connection;
use uuid::Uuid;

/// 2026-01-01T00:00:00Z
const NEW_YEAR_2026_MS: i64 = 1_767_225_600_000;

fn fixed_clock() -> i64 {
    NEW_YEAR_2026_MS
}

fn fleet<'c>(conn: &'c Connection, config: &FleetConfig) -> SqliteFleetService<'c> {
    let fleet = sqlite_fleet_service(conn, config).with_clock(fixed_clock);
    fleet.initialize().unwrap();
    fleet
}

fn add_item(conn: &Connection, name: &str, weight: u32) -> ItemId {
    let item = DeliverableItem::new(name, weight, name.to_ascii_uppercase());
    SqliteItemCatalog::new(conn)
        .create_item(&item, NEW_YEAR_2026_MS)
        .unwrap()
}

fn set_battery(conn: &Connection, drone_id: DroneId, battery: u8) {
    SqliteDroneRepository::new(conn)
        .record_battery_level(drone_id, battery, NEW_YEAR_2026_MS)
        .unwrap();
}

#[test]
fn create_drone_allocates_serial_and_starts_idle_full() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());

    let first = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let second = service.create_drone(DroneModel::LightWeight, 120).unwrap();

    assert_eq!(first.serial_number, "DRN260000000017");
    assert_eq!(first.state, DroneState::Idle);
    assert_eq!(first.battery, 100);
    assert_ne!(first.serial_number, second.serial_number);
    assert!(is_valid_serial(&second.serial_number));
    assert_eq!(service.serials().current_value().unwrap(), 2);

    let stored = service.get_drone(first.id).unwrap();
    assert_eq!(stored, first);
}

#[test]
fn create_drone_rejects_out_of_range_weight_and_unknown_model() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());

    for weight in [0, 526] {
        let err = service
            .create_drone(DroneModel::Middleweight, weight)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "weight {weight}");
    }
    let err = service.create_drone_named("heavyweight", 300).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(service.create_drone_named("Cruiserweight", 525).is_ok());
    // Rejected requests must not burn serial values.
    assert_eq!(service.serials().current_value().unwrap(), 1);
}

#[test]
fn create_drone_without_sequence_is_allocation_error() {
    let conn = open_db_in_memory().unwrap();
    let service = sqlite_fleet_service(&conn, &FleetConfig::default());

    let err = service.create_drone(DroneModel::Heavyweight, 500).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Allocation);
    assert!(matches!(
        err,
        FleetError::Allocation(AllocationError::SequenceMissing(_))
    ));
}

#[test]
fn load_commits_orders_deducts_battery_and_marks_loaded() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let bandage = add_item(&conn, "bandage", 100);
    let inhaler = add_item(&conn, "inhaler", 200);

    let manifest = service.load_items(drone.id, &[bandage, inhaler]).unwrap();

    assert_eq!(manifest.drone_id, drone.id);
    assert_eq!(manifest.serial_number, drone.serial_number);
    assert_eq!(manifest.model, DroneModel::Heavyweight);
    assert_eq!(manifest.items.len(), 2);
    assert_eq!(manifest.total_weight(), 300);

    let loaded = service.get_drone(drone.id).unwrap();
    assert_eq!(loaded.state, DroneState::Loaded);
    assert_eq!(loaded.battery, 83);
    assert_eq!(service.get_battery_health(drone.id).unwrap().battery, 83);

    let capacity = service.capacity(drone.id).unwrap();
    assert_eq!(capacity.committed_weight, 300);
    assert_eq!(capacity.remaining_capacity, 200);
    assert_eq!(service.get_manifest(drone.id).unwrap(), manifest);
}

#[test]
fn weight_limit_applies_per_request() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let crate_item = add_item(&conn, "crate", 510);
    let parcel = add_item(&conn, "parcel", 450);

    let err = service.load_items(drone.id, &[crate_item]).unwrap_err();
    assert!(matches!(
        err,
        FleetError::WeightLimitExceeded {
            total: 510,
            limit: 500
        }
    ));
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

    let manifest = service.load_items(drone.id, &[parcel]).unwrap();
    assert_eq!(manifest.total_weight(), 450);
}

#[test]
fn capacity_is_checked_against_model_table() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::LightWeight, 150).unwrap();
    let a = add_item(&conn, "syringe", 100);
    let b = add_item(&conn, "gauze", 60);

    let err = service.load_items(drone.id, &[a, b]).unwrap_err();
    match err {
        FleetError::CapacityExceeded {
            requested,
            remaining,
        } => {
            assert_eq!(requested, 160);
            assert_eq!(remaining, 150);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failed_load_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let heavy = add_item(&conn, "anvil", 900);

    service.load_items(drone.id, &[heavy]).unwrap_err();

    let orders = SqliteOrderRepository::new(&conn);
    assert!(orders.list_orders(drone.id).unwrap().is_empty());
    let after = service.get_drone(drone.id).unwrap();
    assert_eq!(after.state, DroneState::Idle);
    assert_eq!(after.battery, 100);
}

#[test]
fn loaded_drone_with_room_accepts_more_items() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let vaccine = add_item(&conn, "vaccine", 50);
    let plasma = add_item(&conn, "plasma", 100);
    service.load_items(drone.id, &[vaccine]).unwrap();
    assert_eq!(service.get_drone(drone.id).unwrap().battery, 83);

    let manifest = service.load_items(drone.id, &[plasma]).unwrap();

    let item_ids: Vec<ItemId> = manifest.items.iter().map(|item| item.item_id).collect();
    assert_eq!(item_ids, vec![vaccine, plasma]);
    assert_eq!(manifest.total_weight(), 150);
    assert_eq!(
        SqliteOrderRepository::new(&conn)
            .list_orders(drone.id)
            .unwrap()
            .len(),
        2
    );
    let after = service.get_drone(drone.id).unwrap();
    assert_eq!(after.state, DroneState::Loaded);
    assert_eq!(after.battery, 66);
    assert_eq!(service.capacity(drone.id).unwrap().remaining_capacity, 350);
}

#[test]
fn loaded_drone_cannot_exceed_remaining_capacity() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let vaccine = add_item(&conn, "vaccine", 50);
    let parcel = add_item(&conn, "parcel", 460);
    service.load_items(drone.id, &[vaccine]).unwrap();

    let err = service.load_items(drone.id, &[parcel]).unwrap_err();
    assert!(matches!(
        err,
        FleetError::CapacityExceeded {
            requested: 460,
            remaining: 450
        }
    ));
    assert_eq!(service.get_drone(drone.id).unwrap().battery, 83);
}

#[test]
fn full_loaded_drone_is_not_eligible() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::LightWeight, 150).unwrap();
    let kit = add_item(&conn, "kit", 150);
    let pill = add_item(&conn, "pill", 1);
    service.load_items(drone.id, &[kit]).unwrap();

    let err = service.load_items(drone.id, &[pill]).unwrap_err();
    assert!(matches!(
        err,
        FleetError::InvalidState {
            state: DroneState::Loaded,
            remaining_capacity: 0,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
}

#[test]
fn battery_threshold_is_inclusive() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::Middleweight, 300).unwrap();
    let item = add_item(&conn, "insulin", 20);

    set_battery(&conn, drone.id, 24);
    let err = service.load_items(drone.id, &[item]).unwrap_err();
    assert!(matches!(
        err,
        FleetError::InsufficientBattery {
            battery: 24,
            minimum: 25
        }
    ));
    assert!(err.to_string().contains("24%"));

    set_battery(&conn, drone.id, 25);
    service.load_items(drone.id, &[item]).unwrap();
    assert_eq!(service.get_drone(drone.id).unwrap().battery, 8);
}

#[test]
fn battery_cost_is_clamped_at_zero() {
    let conn = open_db_in_memory().unwrap();
    let mut config = FleetConfig::default();
    config.loading.min_battery_to_load = 5;
    let service = fleet(&conn, &config);
    let drone = service.create_drone(DroneModel::Middleweight, 300).unwrap();
    let item = add_item(&conn, "plasma", 20);

    set_battery(&conn, drone.id, 10);
    service.load_items(drone.id, &[item]).unwrap();
    assert_eq!(service.get_drone(drone.id).unwrap().battery, 0);
}

#[test]
fn item_count_and_existence_checks() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let ids: Vec<ItemId> = (0..6)
        .map(|index| add_item(&conn, &format!("pill_{index}"), 10))
        .collect();

    let err = service.load_items(drone.id, &ids).unwrap_err();
    assert!(matches!(
        err,
        FleetError::TooManyItems {
            requested: 6,
            max: 5
        }
    ));

    let err = service.load_items(drone.id, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = service
        .load_items(drone.id, &[ids[0], Uuid::new_v4()])
        .unwrap_err();
    assert!(matches!(
        err,
        FleetError::ItemsNotFound {
            requested: 2,
            found: 1
        }
    ));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Duplicates count once.
    let repeated = [ids[0], ids[1], ids[0], ids[1], ids[2], ids[2]];
    let manifest = service.load_items(drone.id, &repeated).unwrap();
    assert_eq!(manifest.items.len(), 3);
}

#[test]
fn checks_run_in_fixed_order() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::LightWeight, 100).unwrap();
    let too_many: Vec<ItemId> = (0..6)
        .map(|index| add_item(&conn, &format!("box_{index}"), 400))
        .collect();

    // Battery is checked before item count.
    set_battery(&conn, drone.id, 10);
    let err = service.load_items(drone.id, &too_many).unwrap_err();
    assert!(matches!(err, FleetError::InsufficientBattery { .. }));

    // Item count before existence.
    set_battery(&conn, drone.id, 90);
    let mut with_missing = too_many.clone();
    with_missing.push(Uuid::new_v4());
    let err = service.load_items(drone.id, &with_missing).unwrap_err();
    assert!(matches!(err, FleetError::TooManyItems { .. }));

    // Weight limit before capacity.
    let err = service
        .load_items(drone.id, &too_many[..2])
        .unwrap_err();
    assert!(matches!(err, FleetError::WeightLimitExceeded { total: 800, .. }));

    // Missing drone first of all.
    let err = service.load_items(Uuid::new_v4(), &too_many).unwrap_err();
    assert!(matches!(err, FleetError::DroneNotFound(_)));
}

#[test]
fn availability_excludes_busy_and_decommissioned_drones() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let idle = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let busy = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let retired = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let item = add_item(&conn, "kit", 100);

    service.load_items(busy.id, &[item]).unwrap();
    service.decommission_drone(retired.id).unwrap();

    let available: Vec<DroneId> = service
        .list_available_drones()
        .unwrap()
        .into_iter()
        .map(|view| view.id)
        .collect();
    assert_eq!(available, vec![idle.id]);

    let err = service.get_drone(retired.id).unwrap_err();
    assert!(matches!(err, FleetError::DroneNotFound(id) if id == retired.id));
    let err = service.load_items(retired.id, &[item]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn unload_is_not_supported() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone = service.create_drone(DroneModel::Heavyweight, 500).unwrap();

    let err = service.unload_drone(drone.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert!(matches!(err, FleetError::TransitionNotSupported { .. }));
}

#[test]
fn monitor_transition_between_read_and_write_is_detected() {
    let conn = open_db_in_memory().unwrap();
    let service = fleet(&conn, &FleetConfig::default());
    let drone_view = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let drones = SqliteDroneRepository::new(&conn);
    let stale: Drone = drones.get_drone(drone_view.id, false).unwrap().unwrap();

    // A concurrent writer touches the drone after `stale` was read.
    set_battery(&conn, drone_view.id, 90);

    let item = add_item(&conn, "sample", 10);
    let commit = LoadCommit {
        drone_id: stale.id,
        item_ids: vec![item],
        expected_state: stale.state,
        expected_version: stale.version,
        new_state: DroneState::Loaded,
        battery_cost: 17,
        at_ms: NEW_YEAR_2026_MS,
    };
    let orders = SqliteOrderRepository::new(&conn);
    assert!(orders.commit_load(&commit).unwrap().is_none());
    assert!(orders.list_orders(stale.id).unwrap().is_empty());

    let transition = StateTransition::from_current(&stale, DroneState::Returning, NEW_YEAR_2026_MS);
    assert!(drones.transition_state(&transition).unwrap().is_none());
}

/// Order repository whose load commits always lose the race.
struct AlwaysConflicting<'c>(SqliteOrderRepository<'c>);

impl OrderRepository for AlwaysConflicting<'_> {
    fn list_orders(&self, drone_id: DroneId) -> RepoResult<Vec<Order>> {
        self.0.list_orders(drone_id)
    }

    fn committed_weight(&self, drone_id: DroneId) -> RepoResult<u64> {
        self.0.committed_weight(drone_id)
    }

    fn manifest(&self, drone_id: DroneId) -> RepoResult<Option<Manifest>> {
        self.0.manifest(drone_id)
    }

    fn commit_load(&self, _commit: &LoadCommit) -> RepoResult<Option<Drone>> {
        Ok(None)
    }
}

#[test]
fn persistent_conflict_gives_up_after_configured_retries() {
    let conn = open_db_in_memory().unwrap();
    let mut config = FleetConfig::default();
    config.loading.max_conflict_retries = 2;
    let service = FleetService::new(
        SqliteDroneRepository::new(&conn),
        SqliteItemCatalog::new(&conn),
        AlwaysConflicting(SqliteOrderRepository::new(&conn)),
        SqliteSequenceRepository::new(&conn),
        &config,
    )
    .with_clock(fixed_clock);
    service.initialize().unwrap();
    let drone = service.create_drone(DroneModel::Heavyweight, 500).unwrap();
    let item = add_item(&conn, "kit", 100);

    let err = service.load_items(drone.id, &[item]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(err, FleetError::Conflict { attempts: 3, .. }));
}
