/*!
 * Store connection management.
 *
 * This module handles SQLite connection creation, the write-ahead log
 * lifecycle, and async-safe access patterns using tokio's spawn_blocking.
 * One long-lived connection is held for the whole session; closing it
 * consolidates the log into the main file.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::schema;

/// Default store filename
const DEFAULT_DB_FILENAME: &str = "session.db";

/// Default store directory name under user's data directory
const DEFAULT_DB_DIRNAME: &str = "transfix";

/// Path reported for in-memory stores
const IN_MEMORY_PATH: &str = ":memory:";

/// Result of a WAL checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointResult {
    /// Whether the checkpoint could not complete because of concurrent readers
    pub busy: bool,
    /// Frames in the log before the checkpoint
    pub log_frames: i64,
    /// Frames moved into the database file
    pub checkpointed_frames: i64,
}

/// Store connection wrapper with thread-safe access
#[derive(Clone)]
pub struct DatabaseConnection {
    /// Path to the store file
    db_path: PathBuf,
    /// Thread-safe connection wrapped in Arc<Mutex>
    connection: Arc<Mutex<Connection>>,
}

impl DatabaseConnection {
    /// Open a store at the default location
    pub fn new_default() -> Result<Self> {
        let db_path = Self::default_database_path()?;
        Self::new(&db_path)
    }

    /// Open a store at the specified path in write-ahead log mode
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create store directory: {:?}", parent))?;
            }
        }

        info!("Opening store at: {:?}", db_path);

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open store: {:?}", db_path))?;

        // journal_mode answers with the resulting mode, so it has to be read as a query
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .context("Failed to enable write-ahead log")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")
            .context("Failed to set synchronous mode")?;
        debug!("Store journal mode: {}", mode);

        schema::initialize_schema(&conn)?;

        Ok(Self {
            db_path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing)
    pub fn new_in_memory() -> Result<Self> {
        debug!("Creating in-memory store");

        let conn = Connection::open_in_memory().context("Failed to create in-memory store")?;

        schema::initialize_schema(&conn)?;

        Ok(Self {
            db_path: PathBuf::from(IN_MEMORY_PATH),
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get the default store path
    pub fn default_database_path() -> Result<PathBuf> {
        let base_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

        Ok(base_dir.join(DEFAULT_DB_DIRNAME).join(DEFAULT_DB_FILENAME))
    }

    /// Get the store file path
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Whether this store lives in memory only
    pub fn is_in_memory(&self) -> bool {
        self.db_path.to_string_lossy() == IN_MEMORY_PATH
    }

    /// Execute an operation with the connection
    ///
    /// This method acquires the mutex lock and executes the provided closure
    /// with access to the connection. For async contexts, use `execute_async`.
    pub fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .connection
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire store lock: {}", e))?;

        f(&conn)
    }

    /// Execute an operation asynchronously using spawn_blocking
    ///
    /// This is the preferred method for async contexts as it prevents
    /// blocking the async runtime.
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("Failed to acquire store lock: {}", e))?;

            f(&conn)
        })
        .await
        .context("Store task panicked")?
    }

    /// Begin a transaction and execute operations within it
    ///
    /// The transaction is rolled back if `f` fails.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T>,
    {
        let mut conn = self
            .connection
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire store lock: {}", e))?;

        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;

        Ok(result)
    }

    /// Begin an async transaction and execute operations within it
    pub async fn transaction_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("Failed to acquire store lock: {}", e))?;

            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;

            Ok(result)
        })
        .await
        .context("Store transaction task panicked")?
    }

    /// Current journal mode, e.g. `wal` or `memory`
    pub fn journal_mode(&self) -> Result<String> {
        self.execute(|conn| {
            let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            Ok(mode.to_lowercase())
        })
    }

    /// Move the write-ahead log into the main file and truncate it
    pub fn checkpoint(&self) -> Result<CheckpointResult> {
        self.execute(|conn| {
            let result = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
                Ok(CheckpointResult {
                    busy: row.get::<_, i64>(0)? != 0,
                    log_frames: row.get(1)?,
                    checkpointed_frames: row.get(2)?,
                })
            })?;
            Ok(result)
        })
    }

    /// Checkpoint and release the connection
    ///
    /// Other clones keep the connection alive; it is closed once the last
    /// one goes away.
    pub fn close(self) -> Result<()> {
        if !self.is_in_memory() {
            let result = self.checkpoint().context("Failed to checkpoint store on close")?;
            debug!(
                "Checkpointed {} of {} log frames",
                result.checkpointed_frames, result.log_frames
            );
        }

        if let Ok(mutex) = Arc::try_unwrap(self.connection) {
            let conn = mutex
                .into_inner()
                .map_err(|e| anyhow::anyhow!("Store lock poisoned: {}", e))?;
            conn.close()
                .map_err(|(_, e)| anyhow::anyhow!("Failed to close store: {}", e))?;
        }

        info!("Closed store at: {:?}", self.db_path);
        Ok(())
    }
}
