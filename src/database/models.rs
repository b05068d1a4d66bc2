/*!
 * Item store entity models.
 *
 * These structures map directly to store tables and describe the
 * mutations accepted by `ItemStore::apply_batch`.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule type under which glossary entries are stored
pub const GLOSSARY_RULE_TYPE: &str = "GLOSSARY";

/// Translation status of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Never attempted
    Pending,
    /// Destination text is present
    Done,
    /// First pass failed; left for repair or a later re-run
    Failed,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Done => write!(f, "done"),
            ItemStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ItemStatus::Pending),
            "done" => Ok(ItemStatus::Done),
            "failed" => Ok(ItemStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid item status: {}", s)),
        }
    }
}

/// One translation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identity supplied at ingestion
    pub id: String,
    /// Text to translate
    pub source_text: String,
    /// Current authoritative translation
    #[serde(default)]
    pub destination_text: String,
    /// Translation status
    #[serde(default = "default_status")]
    pub status: ItemStatus,
}

fn default_status() -> ItemStatus {
    ItemStatus::Pending
}

impl Item {
    /// Create a pending item with no translation
    pub fn new(id: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_text: source_text.into(),
            destination_text: String::new(),
            status: ItemStatus::Pending,
        }
    }

    /// Builder-style destination and status, mostly for tests
    pub fn translated(mut self, destination_text: impl Into<String>) -> Self {
        self.destination_text = destination_text.into();
        self.status = ItemStatus::Done;
        self
    }
}

/// A single change applied through `ItemStore::apply_batch`
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Replace an item's destination text and status together
    SetDestination {
        id: String,
        text: String,
        status: ItemStatus,
    },
    /// Change an item's status only
    SetStatus { id: String, status: ItemStatus },
    /// Write a session property
    SetMeta { key: String, value: serde_json::Value },
}

impl Mutation {
    /// Successful translation of an item
    pub fn translated(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::SetDestination {
            id: id.into(),
            text: text.into(),
            status: ItemStatus::Done,
        }
    }

    /// Failed first pass of an item
    pub fn failed(id: impl Into<String>) -> Self {
        Self::SetStatus {
            id: id.into(),
            status: ItemStatus::Failed,
        }
    }
}

/// Number of items per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub done: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.done + self.failed
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Items: {}, Done: {}, Failed: {}, Pending: {}",
            self.total(),
            self.done,
            self.failed,
            self.pending
        )
    }
}

/// Opaque binary blob stored with the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    /// Logical path of the asset
    pub path: String,
    /// Raw bytes
    pub data: Vec<u8>,
    /// Length of `data`
    pub size: i64,
    /// Hex SHA-256 of `data`
    pub sha256: String,
}
