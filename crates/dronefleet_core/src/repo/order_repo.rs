//! Order repository: load commits, manifest join and committed weight.
//!
//! # Invariants
//! - Orders are append-only.
//! - `commit_load` inserts orders and applies the drone state change in one
//!   transaction; when the state condition no longer matches, nothing is
//!   written.

use crate::model::drone::{Drone, DroneId, DroneModel, DroneState};
use crate::model::item::ItemId;
use crate::model::order::{Manifest, ManifestItem, Order};
use crate::repo::drone_repo::{apply_transition, parse_uuid, RepoError, RepoResult, StateTransition};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

/// Everything needed to commit one successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCommit {
    pub drone_id: DroneId,
    pub item_ids: Vec<ItemId>,
    pub expected_state: DroneState,
    pub expected_version: i64,
    pub new_state: DroneState,
    pub battery_cost: u8,
    pub at_ms: i64,
}

/// Repository interface for orders and their joined views.
pub trait OrderRepository {
    fn list_orders(&self, drone_id: DroneId) -> RepoResult<Vec<Order>>;
    /// Sum of item weights across every order of the drone, in grams.
    fn committed_weight(&self, drone_id: DroneId) -> RepoResult<u64>;
    /// Drone header plus assigned items; `None` when the drone is unknown.
    fn manifest(&self, drone_id: DroneId) -> RepoResult<Option<Manifest>>;
    /// Inserts orders and advances drone state atomically.
    ///
    /// Returns `Ok(None)` without writing when the drone no longer matches
    /// the expected state and version.
    fn commit_load(&self, commit: &LoadCommit) -> RepoResult<Option<Drone>>;
}

/// SQLite-backed order repository.
pub struct SqliteOrderRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteOrderRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl OrderRepository for SqliteOrderRepository<'_> {
    fn list_orders(&self, drone_id: DroneId) -> RepoResult<Vec<Order>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, drone_id, item_id, created_at
             FROM orders
             WHERE drone_id = ?1
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([drone_id.to_string()])?;
        let mut orders = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get("id")?;
            let drone_text: String = row.get("drone_id")?;
            let item_text: String = row.get("item_id")?;
            orders.push(Order {
                id: parse_uuid(&id_text, "orders.id")?,
                drone_id: parse_uuid(&drone_text, "orders.drone_id")?,
                item_id: parse_uuid(&item_text, "orders.item_id")?,
                created_at: row.get("created_at")?,
            });
        }
        Ok(orders)
    }

    fn committed_weight(&self, drone_id: DroneId) -> RepoResult<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(i.weight), 0)
             FROM orders o
             INNER JOIN items i ON i.id = o.item_id
             WHERE o.drone_id = ?1;",
            [drone_id.to_string()],
            |row| row.get(0),
        )?;
        u64::try_from(total).map_err(|_| {
            RepoError::InvalidData(format!("negative committed weight {total} for drone {drone_id}"))
        })
    }

    fn manifest(&self, drone_id: DroneId) -> RepoResult<Option<Manifest>> {
        let mut header_stmt = self.conn.prepare(
            "SELECT serial_number, model
             FROM drones
             WHERE id = ?1
               AND is_deleted = 0;",
        )?;
        let mut header_rows = header_stmt.query([drone_id.to_string()])?;
        let Some(header) = header_rows.next()? else {
            return Ok(None);
        };
        let serial_number: String = header.get("serial_number")?;
        let model_text: String = header.get("model")?;
        let model = model_text.parse::<DroneModel>().map_err(|_| {
            RepoError::InvalidData(format!("invalid drone model `{model_text}` in drones.model"))
        })?;

        let mut item_stmt = self.conn.prepare(
            "SELECT i.id, i.name, i.code, i.weight, i.image
             FROM orders o
             INNER JOIN items i ON i.id = o.item_id
             WHERE o.drone_id = ?1
             ORDER BY o.created_at ASC, o.rowid ASC;",
        )?;
        let mut rows = item_stmt.query([drone_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let item_text: String = row.get("id")?;
            items.push(ManifestItem {
                item_id: parse_uuid(&item_text, "items.id")?,
                name: row.get("name")?,
                code: row.get("code")?,
                weight: row.get("weight")?,
                image: row.get("image")?,
            });
        }

        Ok(Some(Manifest {
            drone_id,
            serial_number,
            model,
            items,
        }))
    }

    fn commit_load(&self, commit: &LoadCommit) -> RepoResult<Option<Drone>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let transition = StateTransition {
            drone_id: commit.drone_id,
            expected_state: commit.expected_state,
            expected_version: commit.expected_version,
            new_state: commit.new_state,
            battery_cost: commit.battery_cost,
            at_ms: commit.at_ms,
        };
        let Some(updated) = apply_transition(&tx, &transition)? else {
            // Dropping the transaction rolls it back.
            return Ok(None);
        };

        {
            let mut insert = tx.prepare(
                "INSERT INTO orders (id, drone_id, item_id, created_at)
                 VALUES (?1, ?2, ?3, ?4);",
            )?;
            for item_id in &commit.item_ids {
                insert.execute(params![
                    Uuid::new_v4().to_string(),
                    commit.drone_id.to_string(),
                    item_id.to_string(),
                    commit.at_ms,
                ])?;
            }
        }

        tx.commit()?;
        Ok(Some(updated))
    }
}
