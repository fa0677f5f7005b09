// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User account queries.

use neurobridge_core::NeuroError;
use neurobridge_core::types::User;
use rusqlite::{OptionalExtension, params};

use crate::database::Executor;

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, avatar_url, created_at, updated_at, deleted_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        avatar_url: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        deleted_at: row.get(8)?,
    })
}

/// Insert a user. A duplicate email surfaces as [`NeuroError::Conflict`].
pub async fn insert_user(db: &impl Executor, user: &User) -> Result<(), NeuroError> {
    let user = user.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, avatar_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id,
                user.email,
                user.password_hash,
                user.first_name,
                user.last_name,
                user.avatar_url,
                user.created_at,
                user.updated_at,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Get a live (not soft-deleted) user by id.
pub async fn get_user(db: &impl Executor, id: &str) -> Result<Option<User>, NeuroError> {
    let id = id.to_string();
    db.query(move |conn| {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1 AND deleted_at IS NULL"),
            params![id],
            row_to_user,
        )
        .optional()
    })
    .await
}

/// Get a live user by normalized email.
pub async fn get_user_by_email(db: &impl Executor, email: &str) -> Result<Option<User>, NeuroError> {
    let email = email.to_string();
    db.query(move |conn| {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 AND deleted_at IS NULL"),
            params![email],
            row_to_user,
        )
        .optional()
    })
    .await
}

/// Fields a user may change on their own profile. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Apply a profile update; returns false when the user does not exist.
pub async fn update_profile(
    db: &impl Executor,
    id: &str,
    update: &ProfileUpdate,
    now: &str,
) -> Result<bool, NeuroError> {
    let id = id.to_string();
    let update = update.clone();
    let now = now.to_string();
    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE users SET
                first_name = COALESCE(?2, first_name),
                last_name = COALESCE(?3, last_name),
                avatar_url = COALESCE(?4, avatar_url),
                updated_at = ?5
             WHERE id = ?1 AND deleted_at IS NULL",
            params![id, update.first_name, update.last_name, update.avatar_url, now],
        )?;
        Ok(changed > 0)
    })
    .await
}

/// Soft-delete a user. The email is suffixed so it can be registered again.
pub async fn soft_delete_user(db: &impl Executor, id: &str, now: &str) -> Result<bool, NeuroError> {
    let id = id.to_string();
    let now = now.to_string();
    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE users SET deleted_at = ?2, updated_at = ?2, email = email || '#deleted:' || id
             WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now],
        )?;
        Ok(changed > 0)
    })
    .await
}
