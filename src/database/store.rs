/*!
 * Item store.
 *
 * The single authoritative home for item text and session metadata. After
 * ingestion, destination text only changes through `apply_batch` (and the
 * conditional `restore_destination`), each of which runs as one
 * transaction, so concurrent writers never observe half-applied batches.
 */

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

use super::connection::DatabaseConnection;
use super::models::{AssetRecord, GLOSSARY_RULE_TYPE, Item, ItemStatus, Mutation, StatusCounts};
use crate::glossary::{Glossary, GlossaryEntry};

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Transactional persistence of items, meta, rules and assets
#[derive(Clone)]
pub struct ItemStore {
    /// Store connection
    db: DatabaseConnection,
}

impl ItemStore {
    /// Create a store over an open connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Open or create a store file in write-ahead log mode
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new(path)?))
    }

    /// Create a store with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?))
    }

    /// Underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Consolidate the log and release the connection
    pub fn close(self) -> Result<()> {
        self.db.close()
    }

    // =========================================================================
    // Item Operations
    // =========================================================================

    /// Insert new items as pending; ids already present are left untouched
    ///
    /// Returns the number of items inserted.
    pub async fn ingest(&self, items: Vec<(String, String)>) -> Result<usize> {
        self.db
            .transaction_async(move |tx| {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT OR IGNORE INTO items (id, source_text, destination_text, status, updated_at)
                    VALUES (?1, ?2, '', ?3, ?4)
                    "#,
                )?;

                let timestamp = now();
                let mut inserted = 0;
                for (id, source_text) in &items {
                    inserted += stmt.execute(params![
                        id,
                        source_text,
                        ItemStatus::Pending.to_string(),
                        timestamp
                    ])?;
                }
                debug!("Ingested {} of {} items", inserted, items.len());
                Ok(inserted)
            })
            .await
    }

    /// Get one item by id
    pub async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let id = id.to_string();
        self.db
            .execute_async(move |conn| Self::get_item_sync(conn, &id))
            .await
    }

    fn get_item_sync(conn: &Connection, id: &str) -> Result<Option<Item>> {
        let item = conn
            .query_row(
                "SELECT id, source_text, destination_text, status FROM items WHERE id = ?1",
                [id],
                Self::parse_item_row,
            )
            .optional()?;
        Ok(item)
    }

    fn parse_item_row(row: &rusqlite::Row) -> rusqlite::Result<Item> {
        Ok(Item {
            id: row.get(0)?,
            source_text: row.get(1)?,
            destination_text: row.get(2)?,
            status: row.get::<_, String>(3)?.parse::<ItemStatus>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
            })?,
        })
    }

    /// The subset of `ids` present in the store
    pub async fn known_ids(&self, ids: Vec<String>) -> Result<HashSet<String>> {
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare("SELECT 1 FROM items WHERE id = ?1")?;
                let mut known = HashSet::with_capacity(ids.len());
                for id in ids {
                    if stmt.exists([id.as_str()])? {
                        known.insert(id);
                    }
                }
                Ok(known)
            })
            .await
    }

    /// All items in ingestion order
    pub async fn items(&self) -> Result<Vec<Item>> {
        self.db
            .execute_async(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, source_text, destination_text, status FROM items ORDER BY rowid",
                )?;
                let items = stmt
                    .query_map([], Self::parse_item_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await
    }

    /// Items with the given status in ingestion order
    pub async fn items_with_status(&self, status: ItemStatus) -> Result<Vec<Item>> {
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, source_text, destination_text, status
                    FROM items WHERE status = ?1 ORDER BY rowid
                    "#,
                )?;
                let items = stmt
                    .query_map([status.to_string()], Self::parse_item_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await
    }

    /// Number of items per status
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        self.db
            .execute_async(|conn| {
                let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM items GROUP BY status")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;

                let mut counts = StatusCounts::default();
                for row in rows {
                    let (status, count) = row?;
                    match status.parse::<ItemStatus>() {
                        Ok(ItemStatus::Pending) => counts.pending = count as usize,
                        Ok(ItemStatus::Done) => counts.done = count as usize,
                        Ok(ItemStatus::Failed) => counts.failed = count as usize,
                        Err(e) => warn!("Ignoring items with unknown status: {}", e),
                    }
                }
                Ok(counts)
            })
            .await
    }

    // =========================================================================
    // Batch Operations
    // =========================================================================

    /// Apply all mutations as one atomic unit
    ///
    /// A mutation naming an unknown item aborts the whole batch and nothing
    /// becomes visible.
    pub async fn apply_batch(&self, mutations: Vec<Mutation>) -> Result<()> {
        if mutations.is_empty() {
            return Ok(());
        }

        self.db
            .transaction_async(move |tx| {
                let timestamp = now();
                for mutation in &mutations {
                    match mutation {
                        Mutation::SetDestination { id, text, status } => {
                            let changed = tx.execute(
                                r#"
                                UPDATE items SET destination_text = ?2, status = ?3, updated_at = ?4
                                WHERE id = ?1
                                "#,
                                params![id, text, status.to_string(), timestamp],
                            )?;
                            if changed == 0 {
                                bail!("Unknown item id: {}", id);
                            }
                        }
                        Mutation::SetStatus { id, status } => {
                            let changed = tx.execute(
                                "UPDATE items SET status = ?2, updated_at = ?3 WHERE id = ?1",
                                params![id, status.to_string(), timestamp],
                            )?;
                            if changed == 0 {
                                bail!("Unknown item id: {}", id);
                            }
                        }
                        Mutation::SetMeta { key, value } => {
                            tx.execute(
                                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                                params![key, value.to_string()],
                            )?;
                        }
                    }
                }
                debug!("Applied batch of {} mutations", mutations.len());
                Ok(())
            })
            .await
    }

    /// Put back an item's destination text if it differs from `text`
    ///
    /// Returns whether a write happened.
    pub async fn restore_destination(&self, id: &str, text: &str) -> Result<bool> {
        let id = id.to_string();
        let text = text.to_string();

        self.db
            .transaction_async(move |tx| {
                let current: Option<String> = tx
                    .query_row(
                        "SELECT destination_text FROM items WHERE id = ?1",
                        [&id],
                        |row| row.get(0),
                    )
                    .optional()?;

                match current {
                    None => bail!("Unknown item id: {}", id),
                    Some(current) if current == text => Ok(false),
                    Some(_) => {
                        tx.execute(
                            "UPDATE items SET destination_text = ?2, updated_at = ?3 WHERE id = ?1",
                            params![id, text, now()],
                        )?;
                        debug!("Restored destination text of item {}", id);
                        Ok(true)
                    }
                }
            })
            .await
    }

    // =========================================================================
    // Meta Operations
    // =========================================================================

    /// Read a session property
    pub async fn get_meta<T: DeserializeOwned + Send + 'static>(&self, key: &str) -> Result<Option<T>> {
        let key = key.to_string();
        self.db
            .execute_async(move |conn| {
                let raw: Option<String> = conn
                    .query_row("SELECT value FROM meta WHERE key = ?1", [&key], |row| row.get(0))
                    .optional()?;
                raw.map(|raw| {
                    serde_json::from_str(&raw)
                        .with_context(|| format!("Failed to decode meta value for key '{}'", key))
                })
                .transpose()
            })
            .await
    }

    /// Write a session property
    pub async fn set_meta<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).context("Failed to encode meta value")?;
        self.apply_batch(vec![Mutation::SetMeta {
            key: key.to_string(),
            value,
        }])
        .await
    }

    // =========================================================================
    // Rule Operations
    // =========================================================================

    /// Replace the stored glossary
    pub async fn save_glossary(&self, glossary: &Glossary) -> Result<()> {
        let encoded = glossary
            .entries()
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to encode glossary entries")?;

        self.db
            .transaction_async(move |tx| {
                tx.execute("DELETE FROM rules WHERE type = ?1", [GLOSSARY_RULE_TYPE])?;
                let mut stmt = tx.prepare("INSERT INTO rules (type, data) VALUES (?1, ?2)")?;
                for data in &encoded {
                    stmt.execute(params![GLOSSARY_RULE_TYPE, data])?;
                }
                Ok(())
            })
            .await
    }

    /// Load the stored glossary in saved order
    pub async fn load_glossary(&self) -> Result<Glossary> {
        self.db
            .execute_async(|conn| {
                let mut stmt = conn.prepare("SELECT data FROM rules WHERE type = ?1 ORDER BY id")?;
                let rows = stmt
                    .query_map([GLOSSARY_RULE_TYPE], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let entries = rows
                    .iter()
                    .map(|raw| serde_json::from_str::<GlossaryEntry>(raw))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .context("Failed to decode glossary rule")?;
                Ok(Glossary::new(entries))
            })
            .await
    }

    // =========================================================================
    // Asset Operations
    // =========================================================================

    /// Compute SHA256 hash of a blob
    pub fn hash_bytes(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Store or replace an opaque asset
    pub async fn put_asset(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let path = path.to_string();
        let sha256 = Self::hash_bytes(&data);
        let size = data.len() as i64;

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO assets (path, data, size, sha256) VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(path) DO UPDATE SET data = excluded.data, size = excluded.size, sha256 = excluded.sha256
                    "#,
                    params![path, data, size, sha256],
                )?;
                Ok(())
            })
            .await
    }

    /// Read an asset by path
    pub async fn get_asset(&self, path: &str) -> Result<Option<AssetRecord>> {
        let path = path.to_string();
        self.db
            .execute_async(move |conn| {
                let asset = conn
                    .query_row(
                        "SELECT path, data, size, sha256 FROM assets WHERE path = ?1",
                        [&path],
                        |row| {
                            Ok(AssetRecord {
                                path: row.get(0)?,
                                data: row.get(1)?,
                                size: row.get(2)?,
                                sha256: row.get(3)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(asset)
            })
            .await
    }
}
