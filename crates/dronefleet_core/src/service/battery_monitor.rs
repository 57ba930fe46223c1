//! Battery monitor.
//!
//! # Responsibility
//! - Scan the active fleet, classify battery risk and force protective
//!   state changes.
//! - Append one audit entry per observed drone and publish notifications.
//! - Serve battery history and statistics from the audit trail.
//!
//! # Invariants
//! - One drone failing never stops the scan; failures are collected into
//!   the report and published as a single monitoring alert.
//! - State changes are conditional on the observed state and version. A
//!   mismatch re-reads the drone once; a second mismatch is a failure for
//!   that drone only.
//! - Audit entries record the state observed before this cycle's change.

use crate::config::MonitorConfig;
use crate::events::{
    BatteryEventPayload, EmergencyReturnPayload, FleetEvent, MonitoringAlertKind,
    MonitoringAlertPayload, NotificationBus,
};
use crate::model::audit::{AlertType, BatteryAuditEntry, StateUpdate};
use crate::model::drone::{Drone, DroneId, DroneState};
use crate::repo::audit_repo::{AuditHistoryQuery, AuditRepository, SqliteAuditRepository};
use crate::repo::drone_repo::{
    DroneListQuery, DroneRepository, RepoError, SqliteDroneRepository, StateTransition,
};
use crate::service::{system_clock, Clock};
use log::{error, info, warn};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

const MS_PER_HOUR: f64 = 3_600_000.0;
const CRITICAL_REASON: &str = "Critical battery level - forced return";
const LOW_REASON: &str = "Low battery - loading prevented";
const UNCHANGED_REASON: &str = "state unchanged";

#[derive(Debug)]
pub enum MonitorError {
    /// The fleet could not be listed or the audit trail could not be read.
    Repo(RepoError),
    WorkerSpawn(std::io::Error),
    WorkerPanicked,
}

impl Display for MonitorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "battery monitor storage failure: {err}"),
            Self::WorkerSpawn(err) => write!(f, "failed to spawn battery monitor worker: {err}"),
            Self::WorkerPanicked => write!(f, "battery monitor worker panicked"),
        }
    }
}

impl Error for MonitorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::WorkerSpawn(err) => Some(err),
            Self::WorkerPanicked => None,
        }
    }
}

impl From<RepoError> for MonitorError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// One drone the scan could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub drone_id: DroneId,
    pub serial_number: String,
    pub reason: String,
}

/// Aggregated outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub scanned: usize,
    pub normal: usize,
    pub low: usize,
    pub critical: usize,
    /// State changes that actually moved a drone to a different state.
    pub transitions: usize,
    pub failures: Vec<ScanFailure>,
}

/// Time window for history reads. Unset fields fall back to defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryRange {
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryStats {
    pub average_battery_level: f64,
    pub low_battery_incidents: u64,
    pub critical_battery_incidents: u64,
    /// Percent per hour; positive while draining.
    pub battery_drain_rate: f64,
    pub last_checked: Option<i64>,
}

/// Classifies one battery reading against the configured thresholds.
pub fn classify(battery: u8, config: &MonitorConfig) -> AlertType {
    if battery <= config.critical_threshold {
        AlertType::CriticalBattery
    } else if battery <= config.low_threshold {
        AlertType::LowBattery
    } else {
        AlertType::Normal
    }
}

/// Protective target state and reason, if the policy moves this drone.
fn protective_target(alert: AlertType, state: DroneState) -> Option<(DroneState, &'static str)> {
    match (alert, state) {
        (
            AlertType::CriticalBattery,
            DroneState::Delivering | DroneState::Loaded | DroneState::Returning,
        ) => Some((DroneState::Returning, CRITICAL_REASON)),
        (AlertType::LowBattery, DroneState::Idle | DroneState::Loading) => {
            Some((DroneState::Idle, LOW_REASON))
        }
        _ => None,
    }
}

/// Battery percentage lost per hour between two observations.
///
/// `newer` must be the later entry. Zero when the entries share a timestamp
/// or are out of order.
pub fn drain_rate_per_hour(newer: &BatteryAuditEntry, older: &BatteryAuditEntry) -> f64 {
    let delta_ms = newer.recorded_at - older.recorded_at;
    if delta_ms <= 0 {
        return 0.0;
    }
    let lost = f64::from(older.battery_level) - f64::from(newer.battery_level);
    lost / (delta_ms as f64 / MS_PER_HOUR)
}

#[derive(Debug)]
enum DroneScanError {
    Repo(RepoError),
    Vanished,
    Conflict,
}

impl Display for DroneScanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Vanished => write!(f, "drone disappeared during scan"),
            Self::Conflict => write!(f, "drone changed concurrently twice"),
        }
    }
}

impl From<RepoError> for DroneScanError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

struct Observation {
    drone: Drone,
    alert: AlertType,
    state_update: Option<StateUpdate>,
    forced_return: bool,
}

/// Battery monitor over a drone repository and the audit trail.
pub struct BatteryMonitor<D: DroneRepository, A: AuditRepository> {
    drones: D,
    audit: A,
    bus: Arc<NotificationBus>,
    config: MonitorConfig,
    clock: Clock,
}

pub type SqliteBatteryMonitor<'conn> =
    BatteryMonitor<SqliteDroneRepository<'conn>, SqliteAuditRepository<'conn>>;

pub fn sqlite_battery_monitor(
    conn: &Connection,
    bus: Arc<NotificationBus>,
    config: MonitorConfig,
) -> SqliteBatteryMonitor<'_> {
    BatteryMonitor::new(
        SqliteDroneRepository::new(conn),
        SqliteAuditRepository::new(conn),
        bus,
        config,
    )
}

impl<D: DroneRepository, A: AuditRepository> BatteryMonitor<D, A> {
    pub fn new(drones: D, audit: A, bus: Arc<NotificationBus>, config: MonitorConfig) -> Self {
        Self {
            drones,
            audit,
            bus,
            config,
            clock: system_clock,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn classify(&self, battery: u8) -> AlertType {
        classify(battery, &self.config)
    }

    /// Runs one monitoring cycle over every active drone.
    ///
    /// Only a failure to list the fleet fails the scan.
    pub fn run_scan(&self) -> Result<ScanReport, MonitorError> {
        let started = Instant::now();
        let drones = match self.drones.list_drones(&DroneListQuery::default()) {
            Ok(drones) => drones,
            Err(err) => {
                error!("event=battery_scan module=monitor status=error stage=list error={err}");
                self.publish_alert(
                    MonitoringAlertKind::ScanFailed,
                    format!("battery scan aborted: {err}"),
                    Vec::new(),
                );
                return Err(err.into());
            }
        };

        let mut report = ScanReport {
            scanned: drones.len(),
            ..ScanReport::default()
        };
        for drone in drones {
            let drone_id = drone.id;
            let serial_number = drone.serial_number.clone();
            match self.process_drone(drone) {
                Ok(observation) => {
                    match observation.alert {
                        AlertType::Normal => report.normal += 1,
                        AlertType::LowBattery => report.low += 1,
                        AlertType::CriticalBattery => report.critical += 1,
                    }
                    if observation
                        .state_update
                        .as_ref()
                        .is_some_and(StateUpdate::is_transition)
                    {
                        report.transitions += 1;
                    }
                }
                Err(err) => {
                    warn!(
                        "event=battery_check module=monitor status=error drone_id={drone_id} serial={serial_number} error={err}"
                    );
                    report.failures.push(ScanFailure {
                        drone_id,
                        serial_number,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if !report.failures.is_empty() {
            self.publish_alert(
                MonitoringAlertKind::DroneFailures,
                format!(
                    "{} of {} drones failed battery check",
                    report.failures.len(),
                    report.scanned
                ),
                report.failures.iter().map(|failure| failure.drone_id).collect(),
            );
        }

        info!(
            "event=battery_scan module=monitor status=ok scanned={} normal={} low={} critical={} transitions={} failed={} duration_ms={}",
            report.scanned,
            report.normal,
            report.low,
            report.critical,
            report.transitions,
            report.failures.len(),
            started.elapsed().as_millis()
        );
        Ok(report)
    }

    fn process_drone(&self, drone: Drone) -> Result<Observation, DroneScanError> {
        let now = (self.clock)();
        let observation = self.apply_policy(drone, now)?;

        let entry = BatteryAuditEntry::observe(
            &observation.drone,
            observation.alert,
            observation.state_update.clone(),
            now,
        );
        self.audit.append_entry(&entry)?;

        self.publish_observation(&observation, now);
        Ok(observation)
    }

    fn apply_policy(&self, drone: Drone, now: i64) -> Result<Observation, DroneScanError> {
        let mut observed = drone;
        for attempt in 0..2 {
            let alert = self.classify(observed.battery);
            let Some((target, reason)) = protective_target(alert, observed.state) else {
                let state_update = (alert != AlertType::Normal).then(|| StateUpdate {
                    previous_state: observed.state,
                    new_state: observed.state,
                    reason: UNCHANGED_REASON.to_string(),
                });
                return Ok(Observation {
                    drone: observed,
                    alert,
                    state_update,
                    forced_return: false,
                });
            };

            let transition = StateTransition::from_current(&observed, target, now);
            if self.drones.transition_state(&transition)?.is_some() {
                let state_update = StateUpdate {
                    previous_state: observed.state,
                    new_state: target,
                    reason: reason.to_string(),
                };
                return Ok(Observation {
                    drone: observed,
                    alert,
                    state_update: Some(state_update),
                    forced_return: target == DroneState::Returning,
                });
            }

            if attempt == 0 {
                warn!(
                    "event=battery_check module=monitor status=retry drone_id={} reason=conflict",
                    observed.id
                );
                observed = self
                    .drones
                    .get_drone(observed.id, false)?
                    .ok_or(DroneScanError::Vanished)?;
            }
        }
        Err(DroneScanError::Conflict)
    }

    fn publish_observation(&self, observation: &Observation, now: i64) {
        let drone = &observation.drone;
        let payload = BatteryEventPayload {
            drone_id: drone.id,
            serial_number: drone.serial_number.clone(),
            battery_level: drone.battery,
            state: drone.state,
            timestamp: now,
        };

        if observation.forced_return {
            self.bus.publish(&FleetEvent::EmergencyReturn(EmergencyReturnPayload {
                drone_id: drone.id,
                serial_number: drone.serial_number.clone(),
                battery_level: drone.battery,
            }));
        }

        match observation.alert {
            AlertType::CriticalBattery => {
                self.bus.publish(&FleetEvent::BatteryCritical(payload.clone()));
            }
            AlertType::LowBattery => {
                self.bus.publish(&FleetEvent::BatteryLow(payload.clone()));
            }
            AlertType::Normal => {}
        }
        self.bus.publish(&FleetEvent::BatteryUpdate(payload));
    }

    fn publish_alert(&self, kind: MonitoringAlertKind, message: String, failed_drones: Vec<DroneId>) {
        self.bus.publish(&FleetEvent::MonitoringAlert(MonitoringAlertPayload {
            kind,
            message,
            failed_drones,
            timestamp: (self.clock)(),
        }));
    }

    /// Audit entries for `serial_number`, newest first.
    ///
    /// Defaults: from epoch 0, up to now, `history_default_limit` entries.
    /// A zero limit also means the default.
    pub fn history(
        &self,
        serial_number: &str,
        range: HistoryRange,
    ) -> Result<Vec<BatteryAuditEntry>, MonitorError> {
        let limit = range
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(self.config.history_default_limit);
        let query = AuditHistoryQuery {
            serial_number: serial_number.to_string(),
            start_ms: Some(range.start_ms.unwrap_or(0)),
            end_ms: Some(range.end_ms.unwrap_or_else(|| (self.clock)())),
            limit: Some(limit),
        };
        self.audit.history(&query).map_err(Into::into)
    }

    /// Aggregates over every entry for `serial_number`.
    ///
    /// Unknown serials yield zeroed stats.
    pub fn stats(&self, serial_number: &str) -> Result<BatteryStats, MonitorError> {
        let summary = self.audit.summary(serial_number)?;
        let latest = self.audit.history(&AuditHistoryQuery {
            serial_number: serial_number.to_string(),
            start_ms: None,
            end_ms: None,
            limit: Some(2),
        })?;
        let battery_drain_rate = match latest.as_slice() {
            [newer, older] => drain_rate_per_hour(newer, older),
            _ => 0.0,
        };

        Ok(BatteryStats {
            average_battery_level: summary.average_battery,
            low_battery_incidents: summary.low_battery_count,
            critical_battery_incidents: summary.critical_battery_count,
            battery_drain_rate,
            last_checked: summary.last_recorded_at,
        })
    }
}
