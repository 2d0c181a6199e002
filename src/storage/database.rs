// Database connection manager for local SQLite storage
// Handles app data directory resolution, schema setup and change fan-out

use rusqlite::{Connection, ErrorCode, Result as SqliteResult};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::favorites::types::ChangeNotification;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to get app data directory")]
    AppDataDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Storage connection poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        // Busy/locked means the busy timeout expired; report it as a transient outage
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                StorageError::Unavailable(err.to_string())
            }
            _ => StorageError::Sqlite(err),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Database manager for local SQLite storage
pub struct DatabaseManager {
    connection: Mutex<Connection>,
    db_path: PathBuf,
    /// Sole change-notification listener, replaced on every subscribe
    subscriber: Mutex<Option<UnboundedSender<ChangeNotification>>>,
}

impl DatabaseManager {
    /// Create a new database manager with the given database path
    pub fn new(db_path: PathBuf) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(&db_path)?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;

        let manager = Self {
            connection: Mutex::new(connection),
            db_path,
            subscriber: Mutex::new(None),
        };

        manager.init_schema()?;

        // Apply the configured storage timeout once the settings table exists
        let settings = manager.get_favorites_settings()?;
        manager.set_busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;

        Ok(manager)
    }

    /// Get the database path
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Set how long a statement waits on a locked database before failing
    pub fn set_busy_timeout(&self, timeout: Duration) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Initialize the database schema
    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Bookmarks table: favorites are bookmarks with is_favorite set
            CREATE TABLE IF NOT EXISTS bookmarks (
                id TEXT PRIMARY KEY,
                title TEXT,
                url TEXT,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- App state table: general key-value persistence
            CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_bookmarks_favorite_order ON bookmarks(is_favorite, sort_order);
            "#,
        )?;

        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Execute a function with database connection access
    pub fn with_connection<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> SqliteResult<T>,
    {
        let conn = self.lock()?;
        f(&conn).map_err(StorageError::from)
    }

    /// Execute a function with mutable database connection access
    pub fn with_connection_mut<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> SqliteResult<T>,
    {
        let mut conn = self.lock()?;
        f(&mut conn).map_err(StorageError::from)
    }

    /// Install the sole change listener, dropping any previous one
    pub(crate) fn set_subscriber(&self, sender: UnboundedSender<ChangeNotification>) {
        if let Ok(mut slot) = self.subscriber.lock() {
            *slot = Some(sender);
        }
    }

    /// Deliver a change notification to the current listener, if any
    pub(crate) fn notify(&self, notification: ChangeNotification) {
        let Ok(mut slot) = self.subscriber.lock() else {
            return;
        };
        if let Some(sender) = slot.as_ref() {
            if sender.send(notification).is_err() {
                tracing::debug!("change listener went away, dropping subscription");
                *slot = None;
            }
        }
    }
}

/// Get the default database path in the app data directory
pub fn get_default_db_path() -> StorageResult<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "favorites", "favorites-reconciler")
        .ok_or(StorageError::AppDataDir)?;

    let data_dir = proj_dirs.data_dir();
    Ok(data_dir.join("favorites.db"))
}
