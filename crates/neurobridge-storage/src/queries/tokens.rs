// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session token rows (access + refresh pairs).

use neurobridge_core::NeuroError;
use neurobridge_core::types::UserToken;
use rusqlite::{OptionalExtension, params};

use crate::database::Executor;

fn row_to_token(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserToken> {
    Ok(UserToken {
        id: row.get(0)?,
        user_id: row.get(1)?,
        access_token: row.get(2)?,
        refresh_token: row.get(3)?,
        expires_at: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub async fn insert_token(db: &impl Executor, token: &UserToken) -> Result<(), NeuroError> {
    let token = token.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO user_tokens (id, user_id, access_token, refresh_token, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.id,
                token.user_id,
                token.access_token,
                token.refresh_token,
                token.expires_at,
                token.created_at,
            ],
        )?;
        Ok(())
    })
    .await
}

pub async fn get_by_refresh_token(
    db: &impl Executor,
    refresh_token: &str,
) -> Result<Option<UserToken>, NeuroError> {
    let refresh_token = refresh_token.to_string();
    db.query(move |conn| {
        conn.query_row(
            "SELECT id, user_id, access_token, refresh_token, expires_at, created_at
             FROM user_tokens WHERE refresh_token = ?1",
            params![refresh_token],
            row_to_token,
        )
        .optional()
    })
    .await
}

pub async fn get_by_access_token(
    db: &impl Executor,
    access_token: &str,
) -> Result<Option<UserToken>, NeuroError> {
    let access_token = access_token.to_string();
    db.query(move |conn| {
        conn.query_row(
            "SELECT id, user_id, access_token, refresh_token, expires_at, created_at
             FROM user_tokens WHERE access_token = ?1",
            params![access_token],
            row_to_token,
        )
        .optional()
    })
    .await
}

pub async fn delete_token(db: &impl Executor, id: &str) -> Result<bool, NeuroError> {
    let id = id.to_string();
    db.call(move |conn| Ok(conn.execute("DELETE FROM user_tokens WHERE id = ?1", params![id])? > 0))
        .await
}

/// Delete by access token. Returns the number of rows removed (0 or 1).
pub async fn delete_by_access_token(db: &impl Executor, access_token: &str) -> Result<usize, NeuroError> {
    let access_token = access_token.to_string();
    db.call(move |conn| {
        conn.execute(
            "DELETE FROM user_tokens WHERE access_token = ?1",
            params![access_token],
        )
    })
    .await
}

/// Reap a user's rows whose `expires_at` is before `now`.
pub async fn delete_expired_for_user(
    db: &impl Executor,
    user_id: &str,
    now: &str,
) -> Result<usize, NeuroError> {
    let user_id = user_id.to_string();
    let now = now.to_string();
    db.call(move |conn| {
        conn.execute(
            "DELETE FROM user_tokens WHERE user_id = ?1 AND expires_at < ?2",
            params![user_id, now],
        )
    })
    .await
}

pub async fn delete_all_for_user(db: &impl Executor, user_id: &str) -> Result<usize, NeuroError> {
    let user_id = user_id.to_string();
    db.call(move |conn| conn.execute("DELETE FROM user_tokens WHERE user_id = ?1", params![user_id]))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::db_with_users;

    fn token(id: &str, expires_at: &str) -> UserToken {
        UserToken {
            id: id.to_string(),
            user_id: "u1".to_string(),
            access_token: format!("access-{id}"),
            refresh_token: format!("refresh-{id}"),
            expires_at: expires_at.to_string(),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn lookup_by_either_token() {
        let db = db_with_users(&["u1"]).await;
        insert_token(&db, &token("t1", "2099-01-01T00:00:00.000Z")).await.unwrap();

        let by_refresh = get_by_refresh_token(&db, "refresh-t1").await.unwrap().unwrap();
        assert_eq!(by_refresh.id, "t1");
        let by_access = get_by_access_token(&db, "access-t1").await.unwrap().unwrap();
        assert_eq!(by_access.id, "t1");
        assert!(get_by_access_token(&db, "access-nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_rows_are_reaped_per_user() {
        let db = db_with_users(&["u1"]).await;
        insert_token(&db, &token("old", "2020-01-01T00:00:00.000Z")).await.unwrap();
        insert_token(&db, &token("live", "2099-01-01T00:00:00.000Z")).await.unwrap();

        let removed = delete_expired_for_user(&db, "u1", "2026-06-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(get_by_refresh_token(&db, "refresh-live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_by_access_is_idempotent() {
        let db = db_with_users(&["u1"]).await;
        insert_token(&db, &token("t1", "2099-01-01T00:00:00.000Z")).await.unwrap();
        assert_eq!(delete_by_access_token(&db, "access-t1").await.unwrap(), 1);
        assert_eq!(delete_by_access_token(&db, "access-t1").await.unwrap(), 0);
    }
}
