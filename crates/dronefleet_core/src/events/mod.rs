//! In-process notification bus.
//!
//! # Responsibility
//! - Define the closed set of fleet notifications as a tagged enum.
//! - Route each notification to the listeners registered for its kind.
//!
//! # Invariants
//! - Publishing is fire-and-forget; zero listeners is a valid outcome.
//! - Listeners run synchronously on the publishing thread, in registration
//!   order.

mod bus;
mod logging_listener;

pub use bus::{
    BatteryEventPayload, EmergencyReturnPayload, EventKind, EventListener, FleetEvent,
    MonitoringAlertKind, MonitoringAlertPayload, NotificationBus,
};
pub use logging_listener::LoggingListener;
