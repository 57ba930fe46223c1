//! Item catalog adapter.
//!
//! # Responsibility
//! - Resolve catalog items by id for load validation.
//! - Offer a minimal insert path for seeding and tests; catalog management
//!   itself lives outside the fleet core.

use crate::model::item::{DeliverableItem, ItemId};
use crate::repo::drone_repo::{parse_uuid, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const ITEM_COLUMNS: &str = "id, name, weight, code, image";

/// Read contract the loading controller depends on.
pub trait ItemCatalog {
    fn create_item(&self, item: &DeliverableItem, at_ms: i64) -> RepoResult<ItemId>;
    fn get_item(&self, id: ItemId) -> RepoResult<Option<DeliverableItem>>;
    /// Returns the existing items among `ids`; missing ids are skipped.
    fn find_many(&self, ids: &[ItemId]) -> RepoResult<Vec<DeliverableItem>>;
}

/// SQLite-backed item catalog.
pub struct SqliteItemCatalog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemCatalog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ItemCatalog for SqliteItemCatalog<'_> {
    fn create_item(&self, item: &DeliverableItem, at_ms: i64) -> RepoResult<ItemId> {
        item.validate()?;

        self.conn.execute(
            "INSERT INTO items (id, name, weight, code, image, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                item.id.to_string(),
                item.name.as_str(),
                item.weight,
                item.code.as_str(),
                item.image.as_deref(),
                at_ms,
            ],
        )?;

        Ok(item.id)
    }

    fn get_item(&self, id: ItemId) -> RepoResult<Option<DeliverableItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn find_many(&self, ids: &[ItemId]) -> RepoResult<Vec<DeliverableItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id IN ({placeholders}) ORDER BY id ASC;"
        );
        let bind_values: Vec<Value> = ids.iter().map(|id| Value::Text(id.to_string())).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<DeliverableItem> {
    let id_text: String = row.get("id")?;
    let item = DeliverableItem {
        id: parse_uuid(&id_text, "items.id")?,
        name: row.get("name")?,
        weight: row.get("weight")?,
        code: row.get("code")?,
        image: row.get("image")?,
    };
    item.validate()?;
    Ok(item)
}
