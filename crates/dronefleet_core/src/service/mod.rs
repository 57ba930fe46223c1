//! Fleet use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into the fleet operations callers use.
//! - Own business rules (capacity, eligibility, battery policy) so storage
//!   stays a dumb gateway.
//!
//! # Invariants
//! - Services read time only through their [`Clock`], so tests can pin it.

pub mod battery_monitor;
pub mod capacity;
pub mod fleet_service;
pub mod scheduler;
pub mod serial;

use std::fmt::{Display, Formatter};

/// Source of "now" in epoch milliseconds.
pub type Clock = fn() -> i64;

/// Wall clock backed by `chrono::Utc`.
pub fn system_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Coarse classification shared by every service error type.
///
/// Outer surfaces map this to their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    PreconditionFailed,
    Conflict,
    Allocation,
    Internal,
    Unsupported,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::PreconditionFailed => "precondition_failed",
            Self::Conflict => "conflict",
            Self::Allocation => "allocation",
            Self::Internal => "internal",
            Self::Unsupported => "unsupported",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
