//! SQLite database module
//!
//! One SQLite file holds the relational stores:
//!
//! - `nodes` - per-node audit/uptime counters and ratios
//! - `irreparable_segments` - segments whose repair failed
//!
//! The connection sits behind a mutex; every store operation is a single
//! statement, so the mutex is the only serialization SQLite needs.

pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StoreError;

/// SQLite database shared by the relational store backends
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Open or create the database file
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| StoreError::Internal(format!("Failed to open SQLite: {}", e)))?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::Internal(format!("Failed to open in-memory SQLite: {}", e))
        })?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.with_conn(schema::init_schema)
    }

    /// Run a closure with exclusive access to the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }
}
