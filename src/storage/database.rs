//! Durable store backed by SQLite (rusqlite).

use crate::storage::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};
use crate::storage::{StoreError, StoreHandle, TrackStore};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Database wrapper for SQLite operations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::IoError(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        let current_version = self.get_schema_version()?;

        if current_version < CURRENT_VERSION {
            self.migrate(current_version)?;
        }

        Ok(())
    }

    /// Get the current schema version.
    fn get_schema_version(&self) -> Result<i32, DatabaseError> {
        let result: SqliteResult<i32> = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Run database migrations.
    fn migrate(&self, from_version: i32) -> Result<(), DatabaseError> {
        if from_version < 1 {
            self.conn
                .execute_batch(SCHEMA)
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            self.conn
                .execute(
                    "INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now'))",
                    [CURRENT_VERSION],
                )
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            tracing::info!("Database migrated to version {}", CURRENT_VERSION);
        }

        Ok(())
    }

    /// Insert or replace a named blob.
    pub fn put_blob(&self, name: &str, data: &[u8]) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO blobs (name, data, size_bytes, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, data, data.len() as i64, Utc::now().to_rfc3339()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Load a named blob.
    pub fn get_blob(&self, name: &str) -> Result<Option<Vec<u8>>, DatabaseError> {
        self.conn
            .query_row(
                "SELECT data FROM blobs WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }

    /// Delete a named blob. Deleting a missing blob is not an error.
    pub fn delete_blob(&self, name: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM blobs WHERE name = ?1", params![name])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// List blob names starting with `prefix`, newest first.
    pub fn list_blobs(&self, prefix: &str) -> Result<Vec<String>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM blobs WHERE substr(name, 1, length(?1)) = ?1
                 ORDER BY updated_at DESC, name",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        rows.collect::<SqliteResult<Vec<_>>>()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }
}

impl From<DatabaseError> for StoreError {
    fn from(e: DatabaseError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl TrackStore for Mutex<Database> {
    fn write(&self, name: &str, bytes: &[u8]) -> Result<StoreHandle, StoreError> {
        let db = self
            .lock()
            .map_err(|e| StoreError::Backend(format!("Database lock failed: {}", e)))?;
        db.put_blob(name, bytes)?;
        Ok(StoreHandle::new(name, bytes.len()))
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let db = self
            .lock()
            .map_err(|e| StoreError::Backend(format!("Database lock failed: {}", e)))?;
        Ok(db.get_blob(name)?)
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        let db = self
            .lock()
            .map_err(|e| StoreError::Backend(format!("Database lock failed: {}", e)))?;
        Ok(db.delete_blob(name)?)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let db = self
            .lock()
            .map_err(|e| StoreError::Backend(format!("Database lock failed: {}", e)))?;
        Ok(db.list_blobs(prefix)?)
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}
