// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User library index: one row per (user, material set), pointing at the
//! path built from it.
//!
//! Reads here only serialize against other writers when issued through a
//! [`Tx`](crate::Tx), which already holds SQLite's write lock.

use neurobridge_core::NeuroError;
use neurobridge_core::types::LibraryIndexEntry;
use rusqlite::{OptionalExtension, params};

use crate::database::Executor;

pub async fn get_entry(
    db: &impl Executor,
    user_id: &str,
    material_set_id: &str,
) -> Result<Option<LibraryIndexEntry>, NeuroError> {
    let user_id = user_id.to_string();
    let material_set_id = material_set_id.to_string();
    db.query(move |conn| {
        conn.query_row(
            "SELECT id, user_id, material_set_id, path_id, created_at, updated_at
             FROM user_library_index WHERE user_id = ?1 AND material_set_id = ?2",
            params![user_id, material_set_id],
            |row| {
                Ok(LibraryIndexEntry {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    material_set_id: row.get(2)?,
                    path_id: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()
    })
    .await
}

/// Insert the entry, or point the existing (user, set) row at `entry.path_id`.
pub async fn upsert_entry(db: &impl Executor, entry: &LibraryIndexEntry) -> Result<(), NeuroError> {
    let entry = entry.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO user_library_index (id, user_id, material_set_id, path_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (user_id, material_set_id)
             DO UPDATE SET path_id = excluded.path_id, updated_at = excluded.updated_at",
            params![
                entry.id,
                entry.user_id,
                entry.material_set_id,
                entry.path_id,
                entry.created_at,
                entry.updated_at,
            ],
        )?;
        Ok(())
    })
    .await
}
