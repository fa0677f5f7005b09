// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Learning path queries.

use neurobridge_core::NeuroError;
use neurobridge_core::types::Path;
use rusqlite::{OptionalExtension, params};

use crate::database::Executor;
use crate::queries::{enum_column, json_column, json_text};

const PATH_COLUMNS: &str =
    "id, user_id, title, description, status, metadata, job_id, created_at, updated_at";

fn row_to_path(row: &rusqlite::Row<'_>) -> rusqlite::Result<Path> {
    Ok(Path {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: enum_column(row, 4)?,
        metadata: json_column(row, 5)?,
        job_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub async fn insert_path(db: &impl Executor, path: &Path) -> Result<(), NeuroError> {
    let path = path.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO paths (id, user_id, title, description, status, metadata, job_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                path.id,
                path.user_id,
                path.title,
                path.description,
                path.status.to_string(),
                json_text(&path.metadata),
                path.job_id,
                path.created_at,
                path.updated_at,
            ],
        )?;
        Ok(())
    })
    .await
}

pub async fn get_path(db: &impl Executor, id: &str) -> Result<Option<Path>, NeuroError> {
    let id = id.to_string();
    db.query(move |conn| {
        conn.query_row(
            &format!("SELECT {PATH_COLUMNS} FROM paths WHERE id = ?1"),
            params![id],
            row_to_path,
        )
        .optional()
    })
    .await
}

pub async fn list_paths_for_user(
    db: &impl Executor,
    user_id: &str,
    limit: i64,
) -> Result<Vec<Path>, NeuroError> {
    let user_id = user_id.to_string();
    db.query(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATH_COLUMNS} FROM paths WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![user_id, limit], row_to_path)?;
        rows.collect()
    })
    .await
}

/// Backlink the path to the job building it.
pub async fn set_path_job(
    db: &impl Executor,
    path_id: &str,
    job_id: &str,
    now: &str,
) -> Result<bool, NeuroError> {
    let path_id = path_id.to_string();
    let job_id = job_id.to_string();
    let now = now.to_string();
    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE paths SET job_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![path_id, job_id, now],
        )?;
        Ok(changed > 0)
    })
    .await
}

/// Number of paths owned by a user (used by tests and diagnostics).
pub async fn count_paths_for_user(db: &impl Executor, user_id: &str) -> Result<i64, NeuroError> {
    let user_id = user_id.to_string();
    db.query(move |conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM paths WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
    })
    .await
}
