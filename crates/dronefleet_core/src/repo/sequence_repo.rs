//! Named counter repository.
//!
//! # Invariants
//! - `increment` is one `UPDATE ... RETURNING` statement; concurrent callers
//!   never observe the same post-increment value.
//! - An increment that would pass `max_value` does not write.

use crate::model::sequence::{SequenceDefinition, SequenceRecord};
use crate::repo::drone_repo::RepoResult;
use rusqlite::{params, Connection, OptionalExtension, Row};

const SEQUENCE_COLUMNS: &str = "name,
    current_value,
    increment,
    prefix,
    min_value,
    max_value,
    last_updated,
    created_at";

/// Repository interface for named counters.
pub trait SequenceRepository {
    /// Creates the counter when absent and returns the stored record.
    ///
    /// Existing counters are left untouched.
    fn ensure_sequence(
        &self,
        definition: &SequenceDefinition,
        at_ms: i64,
    ) -> RepoResult<SequenceRecord>;
    fn get_sequence(&self, name: &str) -> RepoResult<Option<SequenceRecord>>;
    /// Atomically adds `increment` and returns the post-update record.
    ///
    /// `Ok(None)` when the counter is missing or would exceed `max_value`.
    fn increment(&self, name: &str, at_ms: i64) -> RepoResult<Option<SequenceRecord>>;
}

/// SQLite-backed counter repository.
pub struct SqliteSequenceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSequenceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SequenceRepository for SqliteSequenceRepository<'_> {
    fn ensure_sequence(
        &self,
        definition: &SequenceDefinition,
        at_ms: i64,
    ) -> RepoResult<SequenceRecord> {
        definition.validate()?;
        let metadata = definition
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            "INSERT OR IGNORE INTO sequences (
                name,
                current_value,
                increment,
                prefix,
                min_value,
                max_value,
                description,
                metadata,
                last_updated,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9);",
            params![
                definition.name.as_str(),
                definition.start_value,
                definition.increment,
                definition.prefix.as_str(),
                definition.min_value,
                definition.max_value,
                definition.description.as_deref(),
                metadata,
                at_ms,
            ],
        )?;

        let record = self.conn.query_row(
            &format!("SELECT {SEQUENCE_COLUMNS} FROM sequences WHERE name = ?1;"),
            [definition.name.as_str()],
            parse_sequence_row,
        )?;
        Ok(record)
    }

    fn get_sequence(&self, name: &str) -> RepoResult<Option<SequenceRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {SEQUENCE_COLUMNS} FROM sequences WHERE name = ?1;"),
                [name],
                parse_sequence_row,
            )
            .optional()?;
        Ok(record)
    }

    fn increment(&self, name: &str, at_ms: i64) -> RepoResult<Option<SequenceRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "UPDATE sequences
                     SET
                        current_value = current_value + increment,
                        last_updated = ?2
                     WHERE name = ?1
                       AND (max_value IS NULL OR current_value + increment <= max_value)
                     RETURNING {SEQUENCE_COLUMNS};"
                ),
                params![name, at_ms],
                parse_sequence_row,
            )
            .optional()?;
        Ok(record)
    }
}

fn parse_sequence_row(row: &Row<'_>) -> rusqlite::Result<SequenceRecord> {
    Ok(SequenceRecord {
        name: row.get("name")?,
        current_value: row.get("current_value")?,
        increment: row.get("increment")?,
        prefix: row.get("prefix")?,
        min_value: row.get("min_value")?,
        max_value: row.get("max_value")?,
        last_updated: row.get("last_updated")?,
        created_at: row.get("created_at")?,
    })
}
