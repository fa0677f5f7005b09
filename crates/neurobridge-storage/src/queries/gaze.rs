// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gaze telemetry: per-block aggregate rows and raw hit rows.

use std::collections::BTreeMap;

use neurobridge_core::types::{GazeBlockStat, GazeEvent};
use neurobridge_core::{Metadata, NeuroError};
use rusqlite::{OptionalExtension, params};
use serde_json::Value;

use crate::database::Executor;
use crate::queries::{json_column, json_text};

/// Aggregated hits for one block, to be added onto its stat row.
#[derive(Debug, Clone)]
pub struct BlockStatDelta {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub block_id: String,
    pub path_id: Option<String>,
    pub node_id: Option<String>,
    pub fixation_ms: i64,
    pub fixation_count: i64,
    pub read_credit: f64,
    pub last_seen_at: String,
    /// Per-line dt sums, merged into `metadata.lines`.
    pub line_ms: BTreeMap<String, i64>,
}

/// Add `lines` onto the `lines` map of an existing metadata object.
pub fn merge_line_sums(mut metadata: Metadata, lines: &BTreeMap<String, i64>) -> Metadata {
    if lines.is_empty() {
        return metadata;
    }
    let entry = metadata
        .entry("lines")
        .or_insert_with(|| Value::Object(Metadata::new()));
    if !entry.is_object() {
        *entry = Value::Object(Metadata::new());
    }
    if let Value::Object(map) = entry {
        for (line, ms) in lines {
            let current = map.get(line).and_then(Value::as_i64).unwrap_or(0);
            map.insert(line.clone(), Value::from(current + ms));
        }
    }
    metadata
}

/// Upsert one block's stat row: sums add, read credit keeps the maximum,
/// `last_seen_at` moves forward, and line sums merge into the metadata.
pub async fn upsert_block_stat(
    db: &impl Executor,
    delta: &BlockStatDelta,
    now: &str,
) -> Result<(), NeuroError> {
    let delta = delta.clone();
    let now = now.to_string();
    db.call(move |conn| {
        let sp = conn.savepoint()?;
        let existing: Option<String> = sp
            .query_row(
                "SELECT metadata FROM user_gaze_block_stat
                 WHERE user_id = ?1 AND session_id = ?2 AND block_id = ?3",
                params![delta.user_id, delta.session_id, delta.block_id],
                |row| row.get(0),
            )
            .optional()?;
        // Unreadable metadata is replaced rather than failing the ingest.
        let metadata: Metadata = existing
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let metadata = merge_line_sums(metadata, &delta.line_ms);

        sp.execute(
            "INSERT INTO user_gaze_block_stat
                (id, user_id, session_id, block_id, path_id, node_id, fixation_ms, fixation_count,
                 read_credit, last_seen_at, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             ON CONFLICT (user_id, session_id, block_id) DO UPDATE SET
                path_id = COALESCE(excluded.path_id, path_id),
                node_id = COALESCE(excluded.node_id, node_id),
                fixation_ms = fixation_ms + excluded.fixation_ms,
                fixation_count = fixation_count + excluded.fixation_count,
                read_credit = MAX(read_credit, excluded.read_credit),
                last_seen_at = MAX(last_seen_at, excluded.last_seen_at),
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![
                delta.id,
                delta.user_id,
                delta.session_id,
                delta.block_id,
                delta.path_id,
                delta.node_id,
                delta.fixation_ms,
                delta.fixation_count,
                delta.read_credit,
                delta.last_seen_at,
                json_text(&metadata),
                now,
            ],
        )?;
        sp.commit()
    })
    .await
}

/// Stat rows for a user's session, ordered by block id.
pub async fn list_block_stats(
    db: &impl Executor,
    user_id: &str,
    session_id: &str,
) -> Result<Vec<GazeBlockStat>, NeuroError> {
    let user_id = user_id.to_string();
    let session_id = session_id.to_string();
    db.query(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT user_id, session_id, block_id, path_id, node_id, fixation_ms, fixation_count,
                    read_credit, last_seen_at, metadata
             FROM user_gaze_block_stat WHERE user_id = ?1 AND session_id = ?2
             ORDER BY block_id ASC",
        )?;
        let rows = stmt.query_map(params![user_id, session_id], |row| {
            Ok(GazeBlockStat {
                user_id: row.get(0)?,
                session_id: row.get(1)?,
                block_id: row.get(2)?,
                path_id: row.get(3)?,
                node_id: row.get(4)?,
                fixation_ms: row.get(5)?,
                fixation_count: row.get(6)?,
                read_credit: row.get(7)?,
                last_seen_at: row.get(8)?,
                metadata: json_column(row, 9)?,
            })
        })?;
        rows.collect()
    })
    .await
}

/// Append raw hit rows in one savepoint.
pub async fn insert_events(db: &impl Executor, events: Vec<GazeEvent>) -> Result<usize, NeuroError> {
    if events.is_empty() {
        return Ok(0);
    }
    db.call(move |conn| {
        let sp = conn.savepoint()?;
        {
            let mut stmt = sp.prepare(
                "INSERT INTO user_gaze_events
                    (id, user_id, session_id, path_id, node_id, block_id, line_id, x, y,
                     confidence, dt_ms, read_credit, occurred_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            for e in &events {
                stmt.execute(params![
                    e.id,
                    e.user_id,
                    e.session_id,
                    e.path_id,
                    e.node_id,
                    e.block_id,
                    e.line_id,
                    e.x,
                    e.y,
                    e.confidence,
                    e.dt_ms,
                    e.read_credit,
                    e.occurred_at,
                    e.created_at,
                ])?;
            }
        }
        sp.commit()?;
        Ok(events.len())
    })
    .await
}

/// Delete a user's raw events created before `cutoff`.
pub async fn delete_events_before(
    db: &impl Executor,
    user_id: &str,
    cutoff: &str,
) -> Result<usize, NeuroError> {
    let user_id = user_id.to_string();
    let cutoff = cutoff.to_string();
    db.call(move |conn| {
        conn.execute(
            "DELETE FROM user_gaze_events WHERE user_id = ?1 AND created_at < ?2",
            params![user_id, cutoff],
        )
    })
    .await
}

pub async fn count_events(db: &impl Executor, user_id: &str) -> Result<i64, NeuroError> {
    let user_id = user_id.to_string();
    db.query(move |conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM user_gaze_events WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::db_with_users;

    fn delta(id: &str, ms: i64, count: i64, credit: f64, seen: &str, lines: &[(&str, i64)]) -> BlockStatDelta {
        BlockStatDelta {
            id: id.to_string(),
            user_id: "u1".to_string(),
            session_id: "sess".to_string(),
            block_id: "b1".to_string(),
            path_id: Some("p1".to_string()),
            node_id: None,
            fixation_ms: ms,
            fixation_count: count,
            read_credit: credit,
            last_seen_at: seen.to_string(),
            line_ms: lines.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[tokio::test]
    async fn upsert_accumulates_and_keeps_max_credit() {
        let db = db_with_users(&["u1"]).await;
        let now = "2026-03-01T10:00:00.000Z";
        upsert_block_stat(
            &db,
            &delta("s1", 300, 3, 0.7, "2026-03-01T10:00:01.000Z", &[("l1", 200), ("l2", 100)]),
            now,
        )
        .await
        .unwrap();
        upsert_block_stat(
            &db,
            &delta("s2", 100, 1, 0.2, "2026-03-01T10:00:05.000Z", &[("l1", 100)]),
            now,
        )
        .await
        .unwrap();

        let stats = list_block_stats(&db, "u1", "sess").await.unwrap();
        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.fixation_ms, 400);
        assert_eq!(s.fixation_count, 4);
        assert!((s.read_credit - 0.7).abs() < f64::EPSILON);
        assert_eq!(s.last_seen_at, "2026-03-01T10:00:05.000Z");
        assert_eq!(s.metadata["lines"]["l1"], 300);
        assert_eq!(s.metadata["lines"]["l2"], 100);
    }

    #[test]
    fn merge_replaces_non_object_lines() {
        let mut metadata = Metadata::new();
        metadata.insert("lines".into(), Value::from("garbage"));
        metadata.insert("other".into(), Value::from(1));
        let lines = BTreeMap::from([("l9".to_string(), 50)]);
        let merged = merge_line_sums(metadata, &lines);
        assert_eq!(merged["lines"]["l9"], 50);
        assert_eq!(merged["other"], 1);
    }

    #[tokio::test]
    async fn retention_deletes_only_old_rows_for_user() {
        let db = db_with_users(&["u1"]).await;
        let event = |id: &str, created_at: &str| GazeEvent {
            id: id.to_string(),
            user_id: "u1".to_string(),
            session_id: "sess".to_string(),
            path_id: None,
            node_id: None,
            block_id: "b1".to_string(),
            line_id: None,
            x: 0.5,
            y: 0.5,
            confidence: 0.9,
            dt_ms: 100,
            read_credit: 0.0,
            occurred_at: created_at.to_string(),
            created_at: created_at.to_string(),
        };
        let inserted = insert_events(
            &db,
            vec![
                event("e1", "2026-01-01T00:00:00.000Z"),
                event("e2", "2026-03-01T00:00:00.000Z"),
            ],
        )
        .await
        .unwrap();
        assert_eq!(inserted, 2);

        let removed = delete_events_before(&db, "u1", "2026-02-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(count_events(&db, "u1").await.unwrap(), 1);
    }
}
