//! Fleet database: connection bootstrap and schema versioning.
//!
//! Every drone, item, order, counter and audit row lives in one SQLite file
//! shared by request callers and the battery monitor thread. Callers get a
//! connection only after the schema is at [`migrations::latest_version`].

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer build; refusing to touch fleet data.
    SchemaTooNew { found: u32, supported: u32 },
    /// A migration step failed; the surrounding transaction rolled back.
    Migration { version: u32, source: rusqlite::Error },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "fleet database error: {err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "fleet database is at schema v{found}, this build understands up to v{supported}"
            ),
            Self::Migration { version, source } => {
                write!(f, "fleet schema migration v{version} failed: {source}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
