// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small fixtures shared by unit and integration tests.

use neurobridge_core::types::{User, now_timestamp};
use neurobridge_core::{Identity, RequestContext};
use neurobridge_storage::Database;
use neurobridge_storage::queries::users;

/// A context authenticated as `user_id` with a synthetic session.
pub fn authenticated(user_id: &str) -> RequestContext {
    RequestContext::authenticated(Identity {
        user_id: user_id.to_string(),
        session_id: format!("session-{user_id}"),
        access_token: format!("access-{user_id}"),
        refresh_token: format!("refresh-{user_id}"),
    })
}

/// Insert a user row with id `id` and email `{id}@example.test`.
///
/// Panics on failure; only meant for test setup.
pub async fn seed_user(db: &Database, id: &str) -> User {
    let now = now_timestamp();
    let user = User {
        id: id.to_string(),
        email: format!("{id}@example.test"),
        password_hash: "not-a-real-hash".to_string(),
        first_name: "Test".to_string(),
        last_name: id.to_string(),
        avatar_url: None,
        created_at: now.clone(),
        updated_at: now,
        deleted_at: None,
    };
    users::insert_user(db, &user)
        .await
        .unwrap_or_else(|e| panic!("seed_user({id}) failed: {e}"));
    user
}
