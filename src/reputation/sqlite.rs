//! SQLite reputation backend
//!
//! Increments are one `UPDATE ... RETURNING` statement that bumps the
//! counters and recomputes the ratio from the pre-update values, so no
//! caller ever observes counters and ratio out of step.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::Arc;

use super::{NodeStats, RatioCounter, ReputationBackend, SelectionCriteria};
use crate::db::SqliteDb;
use crate::error::{StoreError, StoreResult};
use crate::identity::NodeId;

/// Candidates per `IN (...)` query
const FIND_CHUNK: usize = 500;

const NODE_COLUMNS: &str = "id, audit_success_count, total_audit_count, audit_success_ratio, \
     uptime_success_count, total_uptime_count, uptime_ratio, created_at";

/// Raw row before invariant checks
struct NodeRow {
    id: Vec<u8>,
    audit_success_count: i64,
    total_audit_count: i64,
    uptime_success_count: i64,
    total_uptime_count: i64,
    created_at: String,
}

impl NodeRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            audit_success_count: row.get("audit_success_count")?,
            total_audit_count: row.get("total_audit_count")?,
            uptime_success_count: row.get("uptime_success_count")?,
            total_uptime_count: row.get("total_uptime_count")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_stats(self) -> StoreResult<NodeStats> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StoreError::Decode(format!("created_at: {}", e)))?
            .with_timezone(&Utc);

        let corrupt = |e: StoreError| StoreError::Decode(format!("nodes row: {}", e));
        Ok(NodeStats {
            id: NodeId::from_bytes(&self.id).map_err(corrupt)?,
            audit: RatioCounter::new(self.audit_success_count, self.total_audit_count)
                .map_err(corrupt)?,
            uptime: RatioCounter::new(self.uptime_success_count, self.total_uptime_count)
                .map_err(corrupt)?,
            created_at,
        })
    }
}

/// Reputation rows in the `nodes` table
pub struct SqliteReputation {
    db: Arc<SqliteDb>,
}

impl SqliteReputation {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }
}

fn get_node(conn: &Connection, id: &NodeId) -> StoreResult<Option<NodeStats>> {
    let sql = format!("SELECT {} FROM nodes WHERE id = ?", NODE_COLUMNS);
    conn.query_row(&sql, params![id.as_bytes()], NodeRow::from_row)
        .optional()?
        .map(NodeRow::into_stats)
        .transpose()
}

/// `(success delta, total delta)` for an optional outcome
fn deltas(outcome: Option<bool>) -> (i64, i64) {
    match outcome {
        Some(success) => (i64::from(success), 1),
        None => (0, 0),
    }
}

impl ReputationBackend for SqliteReputation {
    fn insert_if_absent(&self, stats: &NodeStats) -> StoreResult<bool> {
        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO nodes (
                    id, audit_success_count, total_audit_count, audit_success_ratio,
                    uptime_success_count, total_uptime_count, uptime_ratio, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO NOTHING",
                params![
                    stats.id.as_bytes(),
                    stats.audit.success_count(),
                    stats.audit.total_count(),
                    stats.audit.ratio(),
                    stats.uptime.success_count(),
                    stats.uptime.total_count(),
                    stats.uptime.ratio(),
                    stats.created_at.to_rfc3339(),
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    fn get(&self, id: &NodeId) -> StoreResult<Option<NodeStats>> {
        self.db.with_conn(|conn| get_node(conn, id))
    }

    fn record_outcomes(
        &self,
        id: &NodeId,
        audit: Option<bool>,
        uptime: Option<bool>,
    ) -> StoreResult<Option<NodeStats>> {
        let (audit_success, audit_total) = deltas(audit);
        let (uptime_success, uptime_total) = deltas(uptime);

        // Right-hand sides see the pre-update row. The guard keeps totals
        // from overflowing into REAL.
        let sql = format!(
            "UPDATE nodes SET
                audit_success_count = audit_success_count + ?2,
                total_audit_count = total_audit_count + ?3,
                audit_success_ratio = CASE
                    WHEN ?3 = 0 THEN audit_success_ratio
                    ELSE CAST(audit_success_count + ?2 AS REAL) / (total_audit_count + ?3)
                END,
                uptime_success_count = uptime_success_count + ?4,
                total_uptime_count = total_uptime_count + ?5,
                uptime_ratio = CASE
                    WHEN ?5 = 0 THEN uptime_ratio
                    ELSE CAST(uptime_success_count + ?4 AS REAL) / (total_uptime_count + ?5)
                END
            WHERE id = ?1
              AND total_audit_count <= {max} - ?3
              AND total_uptime_count <= {max} - ?5
            RETURNING {cols}",
            cols = NODE_COLUMNS,
            max = i64::MAX
        );

        self.db.with_conn(|conn| {
            let updated = conn
                .query_row(
                    &sql,
                    params![id.as_bytes(), audit_success, audit_total, uptime_success, uptime_total],
                    NodeRow::from_row,
                )
                .optional()?;

            match updated {
                Some(row) => row.into_stats().map(Some),
                // Either the node is missing or a counter is full
                None => match get_node(conn, id)? {
                    Some(_) => Err(StoreError::Validation(format!(
                        "counter overflow for node {}",
                        id
                    ))),
                    None => Ok(None),
                },
            }
        })
    }

    fn find_valid(
        &self,
        candidates: &[NodeId],
        criteria: &SelectionCriteria,
    ) -> StoreResult<Vec<NodeId>> {
        self.db.with_conn(|conn| {
            let mut passed = Vec::new();

            for chunk in candidates.chunks(FIND_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "SELECT id FROM nodes
                     WHERE total_audit_count >= ?
                       AND audit_success_ratio >= ?
                       AND uptime_ratio >= ?
                       AND id IN ({})",
                    placeholders
                );

                let mut values = vec![
                    Value::Integer(criteria.min_audit_count),
                    Value::Real(criteria.min_audit_ratio),
                    Value::Real(criteria.min_uptime_ratio),
                ];
                values.extend(chunk.iter().map(|id| Value::Blob(id.as_bytes().to_vec())));

                let mut stmt = conn.prepare(&sql)?;
                let ids = stmt
                    .query_map(params_from_iter(values.iter()), |row| row.get::<_, Vec<u8>>(0))?
                    .collect::<Result<Vec<_>, _>>()?;

                for raw in ids {
                    passed.push(NodeId::from_bytes(&raw)?);
                }
            }

            Ok(passed)
        })
    }

    fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<NodeStats>> {
        let sql = format!("SELECT {} FROM nodes ORDER BY id LIMIT ? OFFSET ?", NODE_COLUMNS);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit as i64, offset as i64], NodeRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(NodeRow::into_stats).collect()
        })
    }
}
