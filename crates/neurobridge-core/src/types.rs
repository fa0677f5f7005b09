// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain entities and status enums shared by storage, services, and the gateway.
//!
//! Timestamps are UTC ISO 8601 strings with millisecond precision so they
//! order lexically inside SQLite.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque JSON metadata. Consumers must tolerate unknown keys.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Title given to a path before generation fills it in.
pub const DRAFT_PATH_TITLE: &str = "Generating path…";

/// Title given to the chat thread opened by a learning build.
pub const NEW_THREAD_TITLE: &str = "New chat";

/// Job kind for the multi-stage learning build workflow.
pub const LEARNING_BUILD_JOB: &str = "learning_build";

/// Object-storage category for uploaded materials.
pub const MATERIALS_CATEGORY: &str = "materials";

/// Current time formatted the way every persisted timestamp is.
pub fn now_timestamp() -> String {
    format_timestamp(chrono::Utc::now())
}

pub fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Deterministic object key for a material file.
pub fn material_storage_key(set_id: &str, file_id: &str) -> String {
    format!("materials/{set_id}/{file_id}")
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies which external collaborator an adapter stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum AdapterType {
    ObjectStore,
    WorkflowEngine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MaterialSetStatus {
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MaterialFileStatus {
    PendingUpload,
    Uploaded,
    UploadFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Draft,
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Lifecycle state of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Dispatched,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether the ledger accepts a move from `self` to `next`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Dispatched)
                | (Queued, Cancelled)
                | (Queued, Failed)
                | (Dispatched, Running)
                | (Dispatched, Succeeded)
                | (Dispatched, Failed)
                | (Dispatched, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialSet {
    pub id: String,
    pub user_id: String,
    pub status: MaterialSetStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialFile {
    pub id: String,
    pub material_set_id: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub status: MaterialFileStatus,
    pub file_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Description of a file about to be stored (the bytes travel separately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialFileInput {
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryIndexEntry {
    pub id: String,
    pub user_id: String,
    pub material_set_id: String,
    pub path_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    pub id: String,
    pub user_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: PathStatus,
    pub metadata: Metadata,
    pub job_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: String,
    pub user_id: String,
    pub path_id: Option<String>,
    pub job_id: Option<String>,
    pub title: String,
    pub status: String,
    pub next_seq: i64,
    pub last_message_at: String,
    pub last_viewed_at: Option<String>,
    pub metadata: Metadata,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub seq: i64,
    pub role: MessageRole,
    pub status: String,
    pub content: String,
    pub metadata: Metadata,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub owner_user_id: String,
    pub job_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: Metadata,
    pub status: JobState,
    pub stage: Option<String>,
    pub progress: i64,
    pub attempts: i64,
    pub error: Option<String>,
    pub saga_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub dispatched_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UserToken {
    pub id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: String,
    pub created_at: String,
}

impl std::fmt::Debug for UserToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserToken")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeBlockStat {
    pub user_id: String,
    pub session_id: String,
    pub block_id: String,
    pub path_id: Option<String>,
    pub node_id: Option<String>,
    pub fixation_ms: i64,
    pub fixation_count: i64,
    pub read_credit: f64,
    pub last_seen_at: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeEvent {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub path_id: Option<String>,
    pub node_id: Option<String>,
    pub block_id: String,
    pub line_id: Option<String>,
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
    pub dt_ms: i64,
    pub read_credit: f64,
    pub occurred_at: String,
    pub created_at: String,
}

/// Everything the upload-and-start-build operation persisted.
#[derive(Debug, Clone, Serialize)]
pub struct LearningBuild {
    pub material_set: MaterialSet,
    pub files: Vec<MaterialFile>,
    pub path_id: String,
    pub thread: ChatThread,
    pub job: JobRun,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn storage_key_is_deterministic() {
        assert_eq!(material_storage_key("s1", "f1"), "materials/s1/f1");
    }

    #[test]
    fn status_enums_use_snake_case() {
        assert_eq!(MaterialFileStatus::PendingUpload.to_string(), "pending_upload");
        assert_eq!(
            MaterialFileStatus::from_str("upload_failed").unwrap(),
            MaterialFileStatus::UploadFailed
        );
        assert_eq!(JobState::Dispatched.to_string(), "dispatched");
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn job_state_machine_rejects_backwards_moves() {
        assert!(JobState::Queued.can_transition_to(JobState::Dispatched));
        assert!(JobState::Running.can_transition_to(JobState::Succeeded));
        assert!(!JobState::Succeeded.can_transition_to(JobState::Running));
        assert!(!JobState::Dispatched.can_transition_to(JobState::Queued));
        assert!(!JobState::Cancelled.can_transition_to(JobState::Dispatched));
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:09Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let b = a + chrono::Duration::seconds(2);
        assert!(format_timestamp(a) < format_timestamp(b));
        assert_eq!(format_timestamp(a), "2026-01-01T00:00:09.000Z");
    }

    #[test]
    fn user_token_debug_redacts_secrets() {
        let token = UserToken {
            id: "t".into(),
            user_id: "u".into(),
            access_token: "secret-access".into(),
            refresh_token: "secret-refresh".into(),
            expires_at: now_timestamp(),
            created_at: now_timestamp(),
        };
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }

    proptest::proptest! {
        #[test]
        fn timestamp_order_matches_string_order(
            a in 0i64..4_102_444_800_000,
            b in 0i64..4_102_444_800_000,
        ) {
            let ta = chrono::DateTime::from_timestamp_millis(a).unwrap();
            let tb = chrono::DateTime::from_timestamp_millis(b).unwrap();
            let (fa, fb) = (format_timestamp(ta), format_timestamp(tb));
            proptest::prop_assert_eq!(fa.len(), 24);
            proptest::prop_assert_eq!(a.cmp(&b), fa.cmp(&fb));
        }
    }
}
