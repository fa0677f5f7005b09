// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat thread queries.

use neurobridge_core::types::ChatThread;
use neurobridge_core::{Metadata, NeuroError};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};

use crate::database::Executor;
use crate::queries::{json_column, json_text};

const THREAD_COLUMNS: &str = "id, user_id, path_id, job_id, title, status, next_seq, last_message_at, last_viewed_at, metadata, created_at, updated_at";

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatThread> {
    Ok(ChatThread {
        id: row.get(0)?,
        user_id: row.get(1)?,
        path_id: row.get(2)?,
        job_id: row.get(3)?,
        title: row.get(4)?,
        status: row.get(5)?,
        next_seq: row.get(6)?,
        last_message_at: row.get(7)?,
        last_viewed_at: row.get(8)?,
        metadata: json_column(row, 9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub async fn insert_thread(db: &impl Executor, thread: &ChatThread) -> Result<(), NeuroError> {
    let thread = thread.clone();
    db.call(move |conn| {
        conn.execute(
            &format!(
                "INSERT INTO chat_threads ({THREAD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                thread.id,
                thread.user_id,
                thread.path_id,
                thread.job_id,
                thread.title,
                thread.status,
                thread.next_seq,
                thread.last_message_at,
                thread.last_viewed_at,
                json_text(&thread.metadata),
                thread.created_at,
                thread.updated_at,
            ],
        )?;
        Ok(())
    })
    .await
}

pub async fn get_thread(db: &impl Executor, id: &str) -> Result<Option<ChatThread>, NeuroError> {
    let id = id.to_string();
    db.query(move |conn| {
        conn.query_row(
            &format!("SELECT {THREAD_COLUMNS} FROM chat_threads WHERE id = ?1"),
            params![id],
            row_to_thread,
        )
        .optional()
    })
    .await
}

/// Claim the next message sequence number.
///
/// Increments `next_seq` and bumps `last_message_at`/`updated_at` in one
/// statement, returning the new value, or `None` if the thread is missing.
/// Must run inside a [`Tx`](crate::Tx) together with the message insert.
pub async fn claim_next_seq(
    db: &impl Executor,
    thread_id: &str,
    now: &str,
) -> Result<Option<i64>, NeuroError> {
    let thread_id = thread_id.to_string();
    let now = now.to_string();
    db.call(move |conn| {
        conn.query_row(
            "UPDATE chat_threads
             SET next_seq = next_seq + 1, last_message_at = ?2, updated_at = ?2
             WHERE id = ?1
             RETURNING next_seq",
            params![thread_id, now],
            |row| row.get(0),
        )
        .optional()
    })
    .await
}

/// Partial update of a thread. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ThreadUpdate {
    pub job_id: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub last_viewed_at: Option<String>,
    /// Replaces the whole metadata object.
    pub metadata: Option<Metadata>,
}

impl ThreadUpdate {
    pub fn is_empty(&self) -> bool {
        self.job_id.is_none()
            && self.title.is_none()
            && self.status.is_none()
            && self.last_viewed_at.is_none()
            && self.metadata.is_none()
    }
}

/// Apply a [`ThreadUpdate`]; returns false when the thread does not exist.
pub async fn update_thread_fields(
    db: &impl Executor,
    thread_id: &str,
    update: &ThreadUpdate,
    now: &str,
) -> Result<bool, NeuroError> {
    let mut sets = vec!["updated_at = ?1".to_string()];
    let mut values = vec![Value::Text(now.to_string())];
    let mut push = |column: &str, value: String| {
        values.push(Value::Text(value));
        sets.push(format!("{column} = ?{}", values.len()));
    };

    if let Some(job_id) = &update.job_id {
        push("job_id", job_id.clone());
    }
    if let Some(title) = &update.title {
        push("title", title.clone());
    }
    if let Some(status) = &update.status {
        push("status", status.clone());
    }
    if let Some(viewed) = &update.last_viewed_at {
        push("last_viewed_at", viewed.clone());
    }
    if let Some(metadata) = &update.metadata {
        push("metadata", json_text(metadata));
    }

    values.push(Value::Text(thread_id.to_string()));
    let sql = format!(
        "UPDATE chat_threads SET {} WHERE id = ?{}",
        sets.join(", "),
        values.len()
    );

    db.call(move |conn| Ok(conn.execute(&sql, params_from_iter(values))? > 0))
        .await
}
