use dronefleet_core::db::open_db_in_memory;
use dronefleet_core::model::ModelValidationError;
use dronefleet_core::repo::drone_repo::{
    DroneListQuery, DroneRepository, RepoError, SqliteDroneRepository, StateTransition,
};
use dronefleet_core::repo::item_repo::{ItemCatalog, SqliteItemCatalog};
use dronefleet_core::repo::order_repo::{LoadCommit, OrderRepository, SqliteOrderRepository};
use dronefleet_core::{DeliverableItem, Drone, DroneModel, DroneState};
use uuid::Uuid;

#[test]
fn drone_create_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDroneRepository::new(&conn);

    let drone = Drone::new("DRN260000000017", DroneModel::Cruiserweight, 400, 42);
    let id = repo.create_drone(&drone).unwrap();

    let loaded = repo.get_drone(id, false).unwrap().unwrap();
    assert_eq!(loaded, drone);
    let by_serial = repo.get_drone_by_serial("DRN260000000017").unwrap().unwrap();
    assert_eq!(by_serial.id, id);
}

#[test]
fn duplicate_serial_is_rejected_by_storage() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDroneRepository::new(&conn);

    repo.create_drone(&Drone::new("DRN260000000017", DroneModel::Heavyweight, 500, 0))
        .unwrap();
    let err = repo
        .create_drone(&Drone::new("DRN260000000017", DroneModel::Heavyweight, 500, 0))
        .unwrap_err();
    assert!(matches!(err, RepoError::Db(_)));
}

#[test]
fn invalid_battery_never_reaches_storage() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDroneRepository::new(&conn);
    let drone = repo
        .create_drone(&Drone::new("DRN260000000017", DroneModel::Heavyweight, 500, 0))
        .unwrap();

    let err = repo.record_battery_level(drone, 101, 1).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ModelValidationError::BatteryOutOfRange(101))
    ));
}

#[test]
fn list_filters_by_state_and_hides_deleted() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDroneRepository::new(&conn);
    let mut loaded = Drone::new("DRN260000000025", DroneModel::Heavyweight, 500, 2);
    loaded.state = DroneState::Loaded;
    let idle = Drone::new("DRN260000000017", DroneModel::Heavyweight, 500, 1);
    let gone = Drone::new("DRN260000000033", DroneModel::Heavyweight, 500, 3);
    for drone in [&idle, &loaded, &gone] {
        repo.create_drone(drone).unwrap();
    }
    repo.soft_delete_drone(gone.id, 10).unwrap();

    let all = repo.list_drones(&DroneListQuery::default()).unwrap();
    assert_eq!(
        all.iter().map(|drone| drone.id).collect::<Vec<_>>(),
        vec![idle.id, loaded.id]
    );

    let idle_only = repo
        .list_drones(&DroneListQuery {
            state: Some(DroneState::Idle),
            ..DroneListQuery::default()
        })
        .unwrap();
    assert_eq!(idle_only.len(), 1);

    let with_deleted = repo
        .list_drones(&DroneListQuery {
            include_deleted: true,
            ..DroneListQuery::default()
        })
        .unwrap();
    assert_eq!(with_deleted.len(), 3);
    assert!(repo.get_drone(gone.id, false).unwrap().is_none());
    assert!(repo.get_drone(gone.id, true).unwrap().unwrap().is_deleted);
}

#[test]
fn transition_matches_state_and_version() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDroneRepository::new(&conn);
    let mut drone = Drone::new("DRN260000000017", DroneModel::Heavyweight, 500, 0);
    drone.state = DroneState::Loaded;
    repo.create_drone(&drone).unwrap();

    let wrong_state = StateTransition {
        expected_state: DroneState::Idle,
        ..StateTransition::from_current(&drone, DroneState::Returning, 5)
    };
    assert!(repo.transition_state(&wrong_state).unwrap().is_none());

    let updated = repo
        .transition_state(&StateTransition::from_current(&drone, DroneState::Returning, 5))
        .unwrap()
        .unwrap();
    assert_eq!(updated.state, DroneState::Returning);
    assert_eq!(updated.version, drone.version + 1);
    assert_eq!(updated.last_state_change, Some(5));

    // Same expected version again is stale now.
    let stale = StateTransition::from_current(&drone, DroneState::Idle, 6);
    assert!(repo.transition_state(&stale).unwrap().is_none());
}

#[test]
fn item_catalog_validates_and_finds_many() {
    let conn = open_db_in_memory().unwrap();
    let catalog = SqliteItemCatalog::new(&conn);

    let aspirin = DeliverableItem::new("aspirin-500", 30, "ASP_500").with_image("aspirin.png");
    let gauze = DeliverableItem::new("gauze", 15, "GZ_1");
    catalog.create_item(&aspirin, 0).unwrap();
    catalog.create_item(&gauze, 0).unwrap();

    let bad = DeliverableItem::new("bad name", 10, "BAD");
    assert!(matches!(
        catalog.create_item(&bad, 0),
        Err(RepoError::Validation(ModelValidationError::InvalidItemName(_)))
    ));

    let found = catalog
        .find_many(&[aspirin.id, gauze.id, Uuid::new_v4()])
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(
        catalog.get_item(aspirin.id).unwrap().unwrap().image.as_deref(),
        Some("aspirin.png")
    );
    assert!(catalog.find_many(&[]).unwrap().is_empty());
}

#[test]
fn commit_load_writes_orders_and_state_together() {
    let conn = open_db_in_memory().unwrap();
    let drones = SqliteDroneRepository::new(&conn);
    let catalog = SqliteItemCatalog::new(&conn);
    let orders = SqliteOrderRepository::new(&conn);

    let drone = Drone::new("DRN260000000017", DroneModel::Middleweight, 300, 0);
    drones.create_drone(&drone).unwrap();
    let item = DeliverableItem::new("splint", 120, "SPL");
    catalog.create_item(&item, 0).unwrap();

    let updated = orders
        .commit_load(&LoadCommit {
            drone_id: drone.id,
            item_ids: vec![item.id],
            expected_state: DroneState::Idle,
            expected_version: drone.version,
            new_state: DroneState::Loaded,
            battery_cost: 17,
            at_ms: 9,
        })
        .unwrap()
        .unwrap();
    assert_eq!(updated.state, DroneState::Loaded);
    assert_eq!(updated.battery, 83);

    assert_eq!(orders.list_orders(drone.id).unwrap().len(), 1);
    assert_eq!(orders.committed_weight(drone.id).unwrap(), 120);
    let manifest = orders.manifest(drone.id).unwrap().unwrap();
    assert_eq!(manifest.items[0].code, "SPL");
    assert!(orders.manifest(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn committed_weight_is_zero_without_orders() {
    let conn = open_db_in_memory().unwrap();
    let orders = SqliteOrderRepository::new(&conn);
    assert_eq!(orders.committed_weight(Uuid::new_v4()).unwrap(), 0);
}
