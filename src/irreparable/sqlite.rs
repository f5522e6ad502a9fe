//! SQLite irreparable-segment backend

use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

use super::{attempt_overflow, IrreparableBackend, IrreparableSegment};
use crate::db::SqliteDb;
use crate::error::StoreResult;

const SEGMENT_COLUMNS: &str =
    "segment_path, segment_detail, lost_pieces_count, damaged_at_unix_sec, repair_attempt_count";

fn segment_from_row(row: &Row) -> Result<IrreparableSegment, rusqlite::Error> {
    Ok(IrreparableSegment {
        segment_path: row.get("segment_path")?,
        segment_detail: row.get("segment_detail")?,
        lost_pieces_count: row.get("lost_pieces_count")?,
        damaged_at_unix_sec: row.get("damaged_at_unix_sec")?,
        repair_attempt_count: row.get("repair_attempt_count")?,
    })
}

pub struct SqliteIrreparable {
    db: Arc<SqliteDb>,
}

impl SqliteIrreparable {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }
}

impl IrreparableBackend for SqliteIrreparable {
    fn increment_repair_attempts(
        &self,
        segment: &IrreparableSegment,
    ) -> StoreResult<IrreparableSegment> {
        let sql = format!(
            "INSERT INTO irreparable_segments ({cols})
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(segment_path) DO UPDATE SET
                repair_attempt_count = irreparable_segments.repair_attempt_count + 1
             WHERE irreparable_segments.repair_attempt_count < {max}
             RETURNING {cols}",
            cols = SEGMENT_COLUMNS,
            max = i64::MAX
        );

        // A skipped conflict update returns no row
        self.db.with_conn(|conn| {
            conn.query_row(
                &sql,
                params![
                    segment.segment_path,
                    segment.segment_detail,
                    segment.lost_pieces_count,
                    segment.damaged_at_unix_sec,
                    segment.repair_attempt_count,
                ],
                segment_from_row,
            )
            .optional()?
            .ok_or_else(|| attempt_overflow(&segment.segment_path))
        })
    }

    fn get(&self, segment_path: &[u8]) -> StoreResult<Option<IrreparableSegment>> {
        let sql = format!(
            "SELECT {} FROM irreparable_segments WHERE segment_path = ?",
            SEGMENT_COLUMNS
        );
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(&sql, params![segment_path], segment_from_row)
                .optional()?)
        })
    }

    fn delete(&self, segment_path: &[u8]) -> StoreResult<bool> {
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM irreparable_segments WHERE segment_path = ?",
                params![segment_path],
            )?;
            Ok(removed > 0)
        })
    }

    fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<IrreparableSegment>> {
        let sql = format!(
            "SELECT {} FROM irreparable_segments ORDER BY segment_path LIMIT ? OFFSET ?",
            SEGMENT_COLUMNS
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit as i64, offset as i64], segment_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
