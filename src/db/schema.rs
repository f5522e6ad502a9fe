//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version != SCHEMA_VERSION {
        return Err(StoreError::Config(format!(
            "unsupported database schema v{} (expected v{})",
            current_version, SCHEMA_VERSION
        )));
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| StoreError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| StoreError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| StoreError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(NODES_SCHEMA)
        .map_err(|e| StoreError::Internal(format!("Failed to create nodes table: {}", e)))?;

    conn.execute_batch(IRREPARABLE_SCHEMA)
        .map_err(|e| StoreError::Internal(format!("Failed to create irreparable table: {}", e)))?;

    Ok(())
}

/// Node reputation statistics, one row per storage node
const NODES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id BLOB PRIMARY KEY NOT NULL,

    audit_success_count INTEGER NOT NULL DEFAULT 0,
    total_audit_count INTEGER NOT NULL DEFAULT 0,
    audit_success_ratio REAL NOT NULL DEFAULT 0,

    uptime_success_count INTEGER NOT NULL DEFAULT 0,
    total_uptime_count INTEGER NOT NULL DEFAULT 0,
    uptime_ratio REAL NOT NULL DEFAULT 0,

    created_at TEXT NOT NULL,

    CHECK (audit_success_count >= 0 AND audit_success_count <= total_audit_count),
    CHECK (uptime_success_count >= 0 AND uptime_success_count <= total_uptime_count)
);
"#;

/// Segments the repair pipeline could not restore
const IRREPARABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS irreparable_segments (
    segment_path BLOB PRIMARY KEY NOT NULL,
    segment_detail BLOB NOT NULL,
    lost_pieces_count INTEGER NOT NULL,
    damaged_at_unix_sec INTEGER NOT NULL,
    repair_attempt_count INTEGER NOT NULL
);
"#;
