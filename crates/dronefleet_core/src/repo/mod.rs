//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for the fleet core.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Write paths validate entities before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Drone state changes are conditional on expected state and version; a
//!   non-matching condition is reported as `None`, never as success.

pub mod audit_repo;
pub mod drone_repo;
pub mod item_repo;
pub mod order_repo;
pub mod sequence_repo;
