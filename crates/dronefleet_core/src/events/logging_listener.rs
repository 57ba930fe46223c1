//! Listener that turns fleet notifications into log lines.

use super::bus::{EventListener, FleetEvent};
use log::{error, info, warn};

/// Writes every notification to the process log.
pub struct LoggingListener;

impl EventListener for LoggingListener {
    fn listener_id(&self) -> &str {
        "logging"
    }

    fn on_event(&self, event: &FleetEvent) {
        let topic = event.kind().topic();
        match event {
            FleetEvent::BatteryCritical(payload) => warn!(
                "event=battery_alert module=events topic={topic} serial={} battery={} state={}",
                payload.serial_number, payload.battery_level, payload.state
            ),
            FleetEvent::BatteryLow(payload) => warn!(
                "event=battery_alert module=events topic={topic} serial={} battery={} state={}",
                payload.serial_number, payload.battery_level, payload.state
            ),
            FleetEvent::BatteryUpdate(payload) => info!(
                "event=battery_update module=events topic={topic} serial={} battery={}",
                payload.serial_number, payload.battery_level
            ),
            FleetEvent::EmergencyReturn(payload) => warn!(
                "event=emergency_return module=events topic={topic} drone_id={} serial={} battery={}",
                payload.drone_id, payload.serial_number, payload.battery_level
            ),
            FleetEvent::MonitoringAlert(payload) => error!(
                "event=monitoring_alert module=events topic={topic} kind={:?} failed_count={} message={}",
                payload.kind,
                payload.failed_drones.len(),
                payload.message
            ),
        }
    }
}
