// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat message queries.

use neurobridge_core::NeuroError;
use neurobridge_core::types::ChatMessage;
use rusqlite::params;

use crate::database::Executor;
use crate::queries::{enum_column, json_column, json_text};

/// Insert a message. A duplicate `(thread_id, seq)` is a conflict.
pub async fn insert_message(db: &impl Executor, msg: &ChatMessage) -> Result<(), NeuroError> {
    let msg = msg.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO chat_messages (id, thread_id, user_id, seq, role, status, content, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                msg.id,
                msg.thread_id,
                msg.user_id,
                msg.seq,
                msg.role.to_string(),
                msg.status,
                msg.content,
                json_text(&msg.metadata),
                msg.created_at,
                msg.updated_at,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Messages with `seq > after_seq`, ascending, at most `limit`.
pub async fn list_messages(
    db: &impl Executor,
    thread_id: &str,
    after_seq: i64,
    limit: i64,
) -> Result<Vec<ChatMessage>, NeuroError> {
    let thread_id = thread_id.to_string();
    db.query(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, thread_id, user_id, seq, role, status, content, metadata, created_at, updated_at
             FROM chat_messages WHERE thread_id = ?1 AND seq > ?2
             ORDER BY seq ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![thread_id, after_seq, limit], |row| {
            Ok(ChatMessage {
                id: row.get(0)?,
                thread_id: row.get(1)?,
                user_id: row.get(2)?,
                seq: row.get(3)?,
                role: enum_column(row, 4)?,
                status: row.get(5)?,
                content: row.get(6)?,
                metadata: json_column(row, 7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            })
        })?;
        rows.collect()
    })
    .await
}

/// All seq values of a thread, ascending.
pub async fn list_seqs(db: &impl Executor, thread_id: &str) -> Result<Vec<i64>, NeuroError> {
    let thread_id = thread_id.to_string();
    db.query(move |conn| {
        let mut stmt =
            conn.prepare("SELECT seq FROM chat_messages WHERE thread_id = ?1 ORDER BY seq ASC")?;
        let rows = stmt.query_map(params![thread_id], |row| row.get(0))?;
        rows.collect()
    })
    .await
}
