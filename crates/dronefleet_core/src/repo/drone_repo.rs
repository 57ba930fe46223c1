//! Drone repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist and query drone records.
//! - Provide the single conditional-update primitive every state change
//!   goes through.
//!
//! # Invariants
//! - Soft-deleted drones are invisible unless explicitly requested.
//! - `transition_state` only writes when id, state and version all match.

use crate::db::DbError;
use crate::model::drone::{Drone, DroneId, DroneModel, DroneState};
use crate::model::ModelValidationError;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DRONE_COLUMNS: &str = "id,
    serial_number,
    model,
    weight,
    state,
    battery,
    last_state_change,
    version,
    is_deleted,
    created_at,
    updated_at";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for fleet persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ModelValidationError),
    Db(DbError),
    NotFound(Uuid),
    InvalidData(String),
    Serialization(serde_json::Error),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Serialization(err) => write!(f, "metadata serialization failed: {err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ModelValidationError> for RepoError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Query options for listing drones.
#[derive(Debug, Clone, Default)]
pub struct DroneListQuery {
    pub state: Option<DroneState>,
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// One optimistic state change.
///
/// Matches on `drone_id`, `expected_state` and `expected_version`; on match
/// sets `new_state`, deducts `battery_cost` (floored at zero), stamps
/// `last_state_change` and bumps `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub drone_id: DroneId,
    pub expected_state: DroneState,
    pub expected_version: i64,
    pub new_state: DroneState,
    pub battery_cost: u8,
    pub at_ms: i64,
}

impl StateTransition {
    /// Transition from the drone's current state/version with no battery cost.
    pub fn from_current(drone: &Drone, new_state: DroneState, at_ms: i64) -> Self {
        Self {
            drone_id: drone.id,
            expected_state: drone.state,
            expected_version: drone.version,
            new_state,
            battery_cost: 0,
            at_ms,
        }
    }
}

/// Repository interface for drone records.
pub trait DroneRepository {
    fn create_drone(&self, drone: &Drone) -> RepoResult<DroneId>;
    fn get_drone(&self, id: DroneId, include_deleted: bool) -> RepoResult<Option<Drone>>;
    fn get_drone_by_serial(&self, serial_number: &str) -> RepoResult<Option<Drone>>;
    fn list_drones(&self, query: &DroneListQuery) -> RepoResult<Vec<Drone>>;
    /// Applies a conditional state change; `Ok(None)` when the match failed.
    fn transition_state(&self, transition: &StateTransition) -> RepoResult<Option<Drone>>;
    /// Records a telemetry battery reading without touching state.
    fn record_battery_level(&self, id: DroneId, battery: u8, at_ms: i64) -> RepoResult<Drone>;
    fn soft_delete_drone(&self, id: DroneId, at_ms: i64) -> RepoResult<()>;
}

/// SQLite-backed drone repository.
pub struct SqliteDroneRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDroneRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DroneRepository for SqliteDroneRepository<'_> {
    fn create_drone(&self, drone: &Drone) -> RepoResult<DroneId> {
        drone.validate()?;

        self.conn.execute(
            "INSERT INTO drones (
                id,
                serial_number,
                model,
                weight,
                state,
                battery,
                last_state_change,
                version,
                is_deleted,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                drone.id.to_string(),
                drone.serial_number.as_str(),
                drone.model.as_str(),
                drone.weight,
                drone.state.as_str(),
                drone.battery,
                drone.last_state_change,
                drone.version,
                bool_to_int(drone.is_deleted),
                drone.created_at,
                drone.updated_at,
            ],
        )?;

        Ok(drone.id)
    }

    fn get_drone(&self, id: DroneId, include_deleted: bool) -> RepoResult<Option<Drone>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DRONE_COLUMNS}
             FROM drones
             WHERE id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;

        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_drone_row(row)?));
        }

        Ok(None)
    }

    fn get_drone_by_serial(&self, serial_number: &str) -> RepoResult<Option<Drone>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DRONE_COLUMNS}
             FROM drones
             WHERE serial_number = ?1
               AND is_deleted = 0;"
        ))?;

        let mut rows = stmt.query([serial_number])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_drone_row(row)?));
        }

        Ok(None)
    }

    fn list_drones(&self, query: &DroneListQuery) -> RepoResult<Vec<Drone>> {
        let mut sql = format!("SELECT {DRONE_COLUMNS} FROM drones WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }

        if let Some(state) = query.state {
            sql.push_str(" AND state = ?");
            bind_values.push(Value::Text(state.as_str().to_string()));
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut drones = Vec::new();

        while let Some(row) = rows.next()? {
            drones.push(parse_drone_row(row)?);
        }

        Ok(drones)
    }

    fn transition_state(&self, transition: &StateTransition) -> RepoResult<Option<Drone>> {
        apply_transition(self.conn, transition)
    }

    fn record_battery_level(&self, id: DroneId, battery: u8, at_ms: i64) -> RepoResult<Drone> {
        if battery > 100 {
            return Err(ModelValidationError::BatteryOutOfRange(battery).into());
        }

        let mut stmt = self.conn.prepare(&format!(
            "UPDATE drones
             SET
                battery = ?2,
                version = version + 1,
                updated_at = ?3
             WHERE id = ?1
               AND is_deleted = 0
             RETURNING {DRONE_COLUMNS};"
        ))?;

        let mut rows = stmt.query(params![id.to_string(), battery, at_ms])?;
        match rows.next()? {
            Some(row) => parse_drone_row(row),
            None => Err(RepoError::NotFound(id)),
        }
    }

    fn soft_delete_drone(&self, id: DroneId, at_ms: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE drones
             SET
                is_deleted = 1,
                version = version + 1,
                updated_at = ?2
             WHERE id = ?1;",
            params![id.to_string(), at_ms],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }
}

/// Executes one conditional state change on `conn`.
///
/// Shared with the order repository so a load can commit orders and the
/// state change inside one transaction.
pub(crate) fn apply_transition(
    conn: &Connection,
    transition: &StateTransition,
) -> RepoResult<Option<Drone>> {
    let mut stmt = conn.prepare(&format!(
        "UPDATE drones
         SET
            state = ?4,
            battery = MAX(battery - ?5, 0),
            last_state_change = ?6,
            version = version + 1,
            updated_at = ?6
         WHERE id = ?1
           AND state = ?2
           AND version = ?3
           AND is_deleted = 0
         RETURNING {DRONE_COLUMNS};"
    ))?;

    let mut rows = stmt.query(params![
        transition.drone_id.to_string(),
        transition.expected_state.as_str(),
        transition.expected_version,
        transition.new_state.as_str(),
        transition.battery_cost,
        transition.at_ms,
    ])?;

    match rows.next()? {
        Some(row) => Ok(Some(parse_drone_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn parse_drone_row(row: &Row<'_>) -> RepoResult<Drone> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "drones.id")?;

    let model_text: String = row.get("model")?;
    let model = model_text.parse::<DroneModel>().map_err(|_| {
        RepoError::InvalidData(format!("invalid drone model `{model_text}` in drones.model"))
    })?;

    let state_text: String = row.get("state")?;
    let state = state_text.parse::<DroneState>().map_err(|_| {
        RepoError::InvalidData(format!("invalid drone state `{state_text}` in drones.state"))
    })?;

    let is_deleted = match row.get::<_, i64>("is_deleted")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_deleted value `{other}` in drones.is_deleted"
            )));
        }
    };

    let drone = Drone {
        id,
        serial_number: row.get("serial_number")?,
        model,
        weight: row.get("weight")?,
        state,
        battery: row.get("battery")?,
        last_state_change: row.get("last_state_change")?,
        version: row.get("version")?,
        is_deleted,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    drone.validate()?;
    Ok(drone)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
