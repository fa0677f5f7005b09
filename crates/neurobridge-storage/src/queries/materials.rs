// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Material set and material file queries.

use neurobridge_core::NeuroError;
use neurobridge_core::types::{MaterialFile, MaterialFileStatus, MaterialSet, MaterialSetStatus};
use rusqlite::{OptionalExtension, params};

use crate::database::Executor;
use crate::queries::enum_column;

fn row_to_set(row: &rusqlite::Row<'_>) -> rusqlite::Result<MaterialSet> {
    Ok(MaterialSet {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: enum_column(row, 2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<MaterialFile> {
    Ok(MaterialFile {
        id: row.get(0)?,
        material_set_id: row.get(1)?,
        original_name: row.get(2)?,
        mime_type: row.get(3)?,
        size_bytes: row.get(4)?,
        storage_key: row.get(5)?,
        status: enum_column(row, 6)?,
        file_url: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const FILE_COLUMNS: &str = "id, material_set_id, original_name, mime_type, size_bytes, storage_key, status, file_url, created_at, updated_at";

pub async fn insert_set(db: &impl Executor, set: &MaterialSet) -> Result<(), NeuroError> {
    let set = set.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO material_sets (id, user_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![set.id, set.user_id, set.status.to_string(), set.created_at, set.updated_at],
        )?;
        Ok(())
    })
    .await
}

pub async fn update_set_status(
    db: &impl Executor,
    id: &str,
    status: MaterialSetStatus,
    now: &str,
) -> Result<bool, NeuroError> {
    let id = id.to_string();
    let now = now.to_string();
    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE material_sets SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.to_string(), now],
        )?;
        Ok(changed > 0)
    })
    .await
}

pub async fn get_set(db: &impl Executor, id: &str) -> Result<Option<MaterialSet>, NeuroError> {
    let id = id.to_string();
    db.query(move |conn| {
        conn.query_row(
            "SELECT id, user_id, status, created_at, updated_at FROM material_sets WHERE id = ?1",
            params![id],
            row_to_set,
        )
        .optional()
    })
    .await
}

/// A user's material sets, newest first.
pub async fn list_sets_for_user(
    db: &impl Executor,
    user_id: &str,
    limit: i64,
) -> Result<Vec<MaterialSet>, NeuroError> {
    let user_id = user_id.to_string();
    db.query(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, status, created_at, updated_at FROM material_sets
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], row_to_set)?;
        rows.collect()
    })
    .await
}

/// Deletes the set; file rows and the library index cascade.
pub async fn delete_set(db: &impl Executor, id: &str) -> Result<bool, NeuroError> {
    let id = id.to_string();
    db.call(move |conn| Ok(conn.execute("DELETE FROM material_sets WHERE id = ?1", params![id])? > 0))
        .await
}

pub async fn insert_file(db: &impl Executor, file: &MaterialFile) -> Result<(), NeuroError> {
    let file = file.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO material_files
                (id, material_set_id, original_name, mime_type, size_bytes, storage_key, status, file_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                file.id,
                file.material_set_id,
                file.original_name,
                file.mime_type,
                file.size_bytes,
                file.storage_key,
                file.status.to_string(),
                file.file_url,
                file.created_at,
                file.updated_at,
            ],
        )?;
        Ok(())
    })
    .await
}

pub async fn get_file(db: &impl Executor, id: &str) -> Result<Option<MaterialFile>, NeuroError> {
    let id = id.to_string();
    db.query(move |conn| {
        conn.query_row(
            &format!("SELECT {FILE_COLUMNS} FROM material_files WHERE id = ?1"),
            params![id],
            row_to_file,
        )
        .optional()
    })
    .await
}

/// Files of a set in insertion order.
pub async fn list_files(db: &impl Executor, set_id: &str) -> Result<Vec<MaterialFile>, NeuroError> {
    let set_id = set_id.to_string();
    db.query(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM material_files
             WHERE material_set_id = ?1 ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![set_id], row_to_file)?;
        rows.collect()
    })
    .await
}

/// Record the outcome of a blob upload.
pub async fn set_file_upload_result(
    db: &impl Executor,
    id: &str,
    status: MaterialFileStatus,
    file_url: Option<&str>,
    now: &str,
) -> Result<bool, NeuroError> {
    let id = id.to_string();
    let file_url = file_url.map(str::to_string);
    let now = now.to_string();
    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE material_files SET status = ?2, file_url = COALESCE(?3, file_url), updated_at = ?4
             WHERE id = ?1",
            params![id, status.to_string(), file_url, now],
        )?;
        Ok(changed > 0)
    })
    .await
}
