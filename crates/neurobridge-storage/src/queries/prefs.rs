// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user personalization preferences (opaque JSON).

use neurobridge_core::{Metadata, NeuroError};
use rusqlite::{OptionalExtension, params};

use crate::database::Executor;
use crate::queries::{json_column, json_text};

pub async fn get_prefs(db: &impl Executor, user_id: &str) -> Result<Option<Metadata>, NeuroError> {
    let user_id = user_id.to_string();
    db.query(move |conn| {
        conn.query_row(
            "SELECT prefs FROM user_personalization_prefs WHERE user_id = ?1",
            params![user_id],
            |row| json_column(row, 0),
        )
        .optional()
    })
    .await
}

/// Replace a user's prefs document. `id` is used only when the row is new.
pub async fn upsert_prefs(
    db: &impl Executor,
    id: &str,
    user_id: &str,
    prefs: &Metadata,
    now: &str,
) -> Result<(), NeuroError> {
    let id = id.to_string();
    let user_id = user_id.to_string();
    let prefs = json_text(prefs);
    let now = now.to_string();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO user_personalization_prefs (id, user_id, prefs, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (user_id) DO UPDATE SET prefs = excluded.prefs, updated_at = excluded.updated_at",
            params![id, user_id, prefs, now],
        )?;
        Ok(())
    })
    .await
}
