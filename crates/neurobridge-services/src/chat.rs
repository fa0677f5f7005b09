// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat threads and their densely sequenced messages.

use neurobridge_core::types::{ChatMessage, ChatThread, MessageRole, now_timestamp};
use neurobridge_core::{Metadata, NeuroError, RequestContext};
use neurobridge_storage::queries::threads::{self, ThreadUpdate};
use neurobridge_storage::queries::messages;
use neurobridge_storage::{Database, Tx};
use tracing::debug;

use crate::new_id;

/// Status written on messages that are complete.
pub const MESSAGE_SENT: &str = "sent";

/// Status of a placeholder the assistant has not filled in yet.
pub const MESSAGE_PENDING: &str = "pending";

/// A message to append to a thread.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub thread_id: String,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub status: String,
    pub metadata: Metadata,
}

#[derive(Clone)]
pub struct ChatWriter {
    db: Database,
}

impl ChatWriter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create_thread(
        &self,
        tx: &Tx,
        user_id: &str,
        path_id: Option<&str>,
        title: &str,
        metadata: Metadata,
    ) -> Result<ChatThread, NeuroError> {
        if user_id.is_empty() {
            return Err(NeuroError::Validation("thread needs an owner".into()));
        }
        let now = now_timestamp();
        let thread = ChatThread {
            id: new_id(),
            user_id: user_id.to_string(),
            path_id: path_id.map(str::to_string),
            job_id: None,
            title: title.to_string(),
            status: "active".to_string(),
            next_seq: 0,
            last_message_at: now.clone(),
            last_viewed_at: None,
            metadata,
            created_at: now.clone(),
            updated_at: now,
        };
        threads::insert_thread(tx, &thread).await?;
        debug!(user_id, thread_id = %thread.id, "chat thread created");
        Ok(thread)
    }

    /// Claim the thread's next seq and write the message under it.
    ///
    /// Both statements run in `tx`, whose write lock keeps concurrent
    /// appenders from observing the same counter value.
    pub async fn append_message(&self, tx: &Tx, msg: NewMessage) -> Result<ChatMessage, NeuroError> {
        let thread = threads::get_thread(tx, &msg.thread_id)
            .await?
            .ok_or_else(|| NeuroError::not_found("chat_thread", &msg.thread_id))?;
        if thread.user_id != msg.user_id {
            return Err(NeuroError::Forbidden(format!(
                "thread {} belongs to another user",
                msg.thread_id
            )));
        }

        let now = now_timestamp();
        let seq = threads::claim_next_seq(tx, &msg.thread_id, &now)
            .await?
            .ok_or_else(|| NeuroError::not_found("chat_thread", &msg.thread_id))?;

        let message = ChatMessage {
            id: new_id(),
            thread_id: msg.thread_id,
            user_id: msg.user_id,
            seq,
            role: msg.role,
            status: msg.status,
            content: msg.content,
            metadata: msg.metadata,
            created_at: now.clone(),
            updated_at: now,
        };
        messages::insert_message(tx, &message).await?;
        debug!(thread_id = %message.thread_id, seq, role = %message.role, "message appended");
        Ok(message)
    }

    /// Apply a partial update; an empty update is a no-op.
    pub async fn update_thread_fields(
        &self,
        tx: &Tx,
        thread_id: &str,
        update: &ThreadUpdate,
    ) -> Result<(), NeuroError> {
        if update.is_empty() {
            return Ok(());
        }
        if threads::update_thread_fields(tx, thread_id, update, &now_timestamp()).await? {
            Ok(())
        } else {
            Err(NeuroError::not_found("chat_thread", thread_id))
        }
    }

    pub async fn get_thread(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
    ) -> Result<ChatThread, NeuroError> {
        let user_id = ctx.user_id()?;
        threads::get_thread(&self.db, thread_id)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| NeuroError::not_found("chat_thread", thread_id))
    }

    /// Messages after `after_seq`, oldest first.
    pub async fn list_messages(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        after_seq: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, NeuroError> {
        self.get_thread(ctx, thread_id).await?;
        messages::list_messages(&self.db, thread_id, after_seq.max(0), limit).await
    }

    /// Stamp `last_viewed_at` on one of the caller's threads.
    pub async fn mark_viewed(&self, ctx: &RequestContext, thread_id: &str) -> Result<ChatThread, NeuroError> {
        self.get_thread(ctx, thread_id).await?;
        let tx = self.db.begin().await?;
        let update = ThreadUpdate {
            last_viewed_at: Some(now_timestamp()),
            ..ThreadUpdate::default()
        };
        self.update_thread_fields(&tx, thread_id, &update).await?;
        let thread = threads::get_thread(&tx, thread_id)
            .await?
            .ok_or_else(|| NeuroError::not_found("chat_thread", thread_id))?;
        tx.commit().await?;
        Ok(thread)
    }
}
