//! Core fleet operations for the drone delivery service.
//! This crate owns every business invariant; outer surfaces only translate.

pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, FleetConfig, LoadingConfig, MonitorConfig, SerialConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use events::{EventKind, EventListener, FleetEvent, NotificationBus};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::audit::{AlertType, BatteryAuditEntry};
pub use model::drone::{Drone, DroneId, DroneModel, DroneState, DroneView};
pub use model::item::{DeliverableItem, ItemId};
pub use model::order::Manifest;
pub use repo::drone_repo::{RepoError, RepoResult};
pub use service::battery_monitor::{
    sqlite_battery_monitor, BatteryMonitor, BatteryStats, HistoryRange, MonitorError,
    ScanReport,
};
pub use service::capacity::{CapacityLedger, CapacityReport};
pub use service::fleet_service::{
    sqlite_fleet_service, BatteryHealth, FleetError, FleetService, SqliteFleetService,
};
pub use service::scheduler::MonitorScheduler;
pub use service::serial::{is_valid_serial, AllocationError, SerialAllocator};
pub use service::ErrorKind;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
