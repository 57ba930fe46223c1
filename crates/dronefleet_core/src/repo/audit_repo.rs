//! Battery audit log repository.
//!
//! # Invariants
//! - Entries are insert-only; no update or delete path exists.
//! - History reads are newest first.

use crate::model::audit::{AlertType, AuditEntryId, AuditMetadata, BatteryAuditEntry};
use crate::model::drone::DroneState;
use crate::repo::drone_repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const AUDIT_COLUMNS: &str = "id,
    drone_id,
    serial_number,
    state,
    battery_level,
    alert_type,
    recorded_at,
    metadata";

/// Time-bounded history query for one serial number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditHistoryQuery {
    pub serial_number: String,
    /// Inclusive lower bound, epoch milliseconds.
    pub start_ms: Option<i64>,
    /// Inclusive upper bound, epoch milliseconds.
    pub end_ms: Option<i64>,
    pub limit: Option<u32>,
}

/// Aggregate over every entry of one serial number.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditSummary {
    pub entry_count: u64,
    pub average_battery: f64,
    pub low_battery_count: u64,
    pub critical_battery_count: u64,
    pub last_recorded_at: Option<i64>,
}

/// Repository interface for the battery audit trail.
pub trait AuditRepository {
    fn append_entry(&self, entry: &BatteryAuditEntry) -> RepoResult<AuditEntryId>;
    fn history(&self, query: &AuditHistoryQuery) -> RepoResult<Vec<BatteryAuditEntry>>;
    fn summary(&self, serial_number: &str) -> RepoResult<AuditSummary>;
}

/// SQLite-backed audit repository.
pub struct SqliteAuditRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuditRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AuditRepository for SqliteAuditRepository<'_> {
    fn append_entry(&self, entry: &BatteryAuditEntry) -> RepoResult<AuditEntryId> {
        let metadata = serde_json::to_string(&entry.metadata)?;

        self.conn.execute(
            "INSERT INTO battery_audit_log (
                id,
                drone_id,
                serial_number,
                state,
                battery_level,
                alert_type,
                recorded_at,
                metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                entry.id.to_string(),
                entry.drone_id.to_string(),
                entry.serial_number.as_str(),
                entry.state.as_str(),
                entry.battery_level,
                entry.alert_type.as_str(),
                entry.recorded_at,
                metadata,
            ],
        )?;

        Ok(entry.id)
    }

    fn history(&self, query: &AuditHistoryQuery) -> RepoResult<Vec<BatteryAuditEntry>> {
        let mut sql = format!("SELECT {AUDIT_COLUMNS} FROM battery_audit_log WHERE serial_number = ?");
        let mut bind_values = vec![Value::Text(query.serial_number.clone())];

        if let Some(start_ms) = query.start_ms {
            sql.push_str(" AND recorded_at >= ?");
            bind_values.push(Value::Integer(start_ms));
        }
        if let Some(end_ms) = query.end_ms {
            sql.push_str(" AND recorded_at <= ?");
            bind_values.push(Value::Integer(end_ms));
        }

        sql.push_str(" ORDER BY recorded_at DESC, rowid DESC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_audit_row(row)?);
        }
        Ok(entries)
    }

    fn summary(&self, serial_number: &str) -> RepoResult<AuditSummary> {
        let (entry_count, average, low, critical, last): (i64, Option<f64>, i64, i64, Option<i64>) =
            self.conn.query_row(
                "SELECT
                    COUNT(*),
                    AVG(battery_level),
                    COALESCE(SUM(CASE WHEN alert_type = 'LOW_BATTERY' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN alert_type = 'CRITICAL_BATTERY' THEN 1 ELSE 0 END), 0),
                    MAX(recorded_at)
                 FROM battery_audit_log
                 WHERE serial_number = ?1;",
                [serial_number],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )?;

        Ok(AuditSummary {
            entry_count: to_count(entry_count)?,
            average_battery: average.unwrap_or(0.0),
            low_battery_count: to_count(low)?,
            critical_battery_count: to_count(critical)?,
            last_recorded_at: last,
        })
    }
}

fn to_count(value: i64) -> RepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative aggregate count {value}")))
}

fn parse_audit_row(row: &Row<'_>) -> RepoResult<BatteryAuditEntry> {
    let id_text: String = row.get("id")?;
    let drone_text: String = row.get("drone_id")?;

    let state_text: String = row.get("state")?;
    let state = state_text.parse::<DroneState>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid drone state `{state_text}` in battery_audit_log.state"
        ))
    })?;

    let alert_text: String = row.get("alert_type")?;
    let alert_type = alert_text.parse::<AlertType>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid alert type `{alert_text}` in battery_audit_log.alert_type"
        ))
    })?;

    let metadata = match row.get::<_, Option<String>>("metadata")? {
        Some(raw) => serde_json::from_str::<AuditMetadata>(&raw)?,
        None => AuditMetadata::default(),
    };

    Ok(BatteryAuditEntry {
        id: parse_uuid(&id_text, "battery_audit_log.id")?,
        drone_id: parse_uuid(&drone_text, "battery_audit_log.drone_id")?,
        serial_number: row.get("serial_number")?,
        state,
        battery_level: row.get("battery_level")?,
        alert_type,
        recorded_at: row.get("recorded_at")?,
        metadata,
    })
}
