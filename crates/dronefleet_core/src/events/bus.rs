//! Event variants and the per-kind handler table.

use crate::model::drone::{DroneId, DroneState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Routing key for listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    BatteryCritical,
    BatteryLow,
    BatteryUpdate,
    EmergencyReturn,
    MonitoringAlert,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::BatteryCritical,
        EventKind::BatteryLow,
        EventKind::BatteryUpdate,
        EventKind::EmergencyReturn,
        EventKind::MonitoringAlert,
    ];

    /// Stable dotted topic name used in logs.
    pub fn topic(self) -> &'static str {
        match self {
            Self::BatteryCritical => "battery.critical",
            Self::BatteryLow => "battery.low",
            Self::BatteryUpdate => "battery.update",
            Self::EmergencyReturn => "drone.emergency_return",
            Self::MonitoringAlert => "monitoring.alert",
        }
    }
}

/// Battery observation broadcast by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryEventPayload {
    pub drone_id: DroneId,
    pub serial_number: String,
    pub battery_level: u8,
    /// State observed before any transition applied in the same cycle.
    pub state: DroneState,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyReturnPayload {
    pub drone_id: DroneId,
    pub serial_number: String,
    pub battery_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringAlertKind {
    /// The fleet could not be listed; nothing was scanned.
    ScanFailed,
    /// Some drones failed while the rest of the scan completed.
    DroneFailures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringAlertPayload {
    pub kind: MonitoringAlertKind,
    pub message: String,
    pub failed_drones: Vec<DroneId>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FleetEvent {
    BatteryCritical(BatteryEventPayload),
    BatteryLow(BatteryEventPayload),
    BatteryUpdate(BatteryEventPayload),
    EmergencyReturn(EmergencyReturnPayload),
    MonitoringAlert(MonitoringAlertPayload),
}

impl FleetEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::BatteryCritical(_) => EventKind::BatteryCritical,
            Self::BatteryLow(_) => EventKind::BatteryLow,
            Self::BatteryUpdate(_) => EventKind::BatteryUpdate,
            Self::EmergencyReturn(_) => EventKind::EmergencyReturn,
            Self::MonitoringAlert(_) => EventKind::MonitoringAlert,
        }
    }
}

/// Consumer of fleet notifications.
pub trait EventListener: Send + Sync {
    fn listener_id(&self) -> &str;
    fn on_event(&self, event: &FleetEvent);
}

/// Handler table keyed by event kind.
///
/// Built mutably at startup, then shared behind `Arc` for publishing.
#[derive(Default)]
pub struct NotificationBus {
    handlers: BTreeMap<EventKind, Vec<Arc<dyn EventListener>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus with the logging listener attached to every kind.
    pub fn with_logging() -> Self {
        let mut bus = Self::new();
        bus.subscribe_all(Arc::new(super::LoggingListener));
        bus
    }

    pub fn subscribe(&mut self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.handlers.entry(kind).or_default().push(listener);
    }

    pub fn subscribe_all(&mut self, listener: Arc<dyn EventListener>) {
        for kind in EventKind::ALL {
            self.subscribe(kind, Arc::clone(&listener));
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Dispatches `event` to every listener of its kind.
    ///
    /// Returns the number of listeners invoked.
    pub fn publish(&self, event: &FleetEvent) -> usize {
        let Some(listeners) = self.handlers.get(&event.kind()) else {
            return 0;
        };
        for listener in listeners {
            listener.on_event(event);
        }
        listeners.len()
    }
}
