// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the NeuroBridge backend.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level NeuroBridge configuration.
///
/// Every section is optional and defaults to values suitable for a local
/// single-node deployment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NeuroBridgeConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Blob storage settings.
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Token signing and lifetimes.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Eye-gaze telemetry ingest.
    #[serde(default)]
    pub gaze: GazeConfig,

    /// External workflow engine and dispatch reconciler.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// OpenAI-compatible LLM endpoint.
    #[serde(default)]
    pub llm: LlmConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Upper bound on a multipart learning-build request body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn data_dir() -> std::path::PathBuf {
    dirs::data_dir()
        .map(|p| p.join("neurobridge"))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}

fn default_database_path() -> String {
    data_dir().join("neurobridge.db").display().to_string()
}

fn default_true() -> bool {
    true
}

/// Filesystem object store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectStoreConfig {
    /// Directory under which `{category}/{key}` blobs are written.
    #[serde(default = "default_object_root")]
    pub root_dir: String,

    /// Base URL prepended to `{category}/{key}` when building public file URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            root_dir: default_object_root(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_object_root() -> String {
    data_dir().join("objects").display().to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080/files".to_string()
}

/// Token configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HS256 signing secret for access tokens. Required by `serve`.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,

    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[redacted]"))
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish()
    }
}

fn default_access_ttl() -> u64 {
    60 * 60
}

fn default_refresh_ttl() -> u64 {
    30 * 24 * 60 * 60
}

/// Gaze telemetry ingest configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GazeConfig {
    /// Master switch; a disabled ingest accepts nothing.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Persist raw hit rows in addition to per-block aggregates.
    #[serde(default)]
    pub store_raw: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Hits below this confidence (percent) are dropped.
    #[serde(default = "default_min_confidence_pct")]
    pub min_confidence_pct: u32,

    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    #[serde(default = "default_max_points_per_sec")]
    pub max_points_per_sec: usize,

    /// How long a consent lookup stays cached per user.
    #[serde(default = "default_consent_cache_secs")]
    pub consent_cache_secs: u64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_raw: false,
            retention_days: default_retention_days(),
            min_confidence_pct: default_min_confidence_pct(),
            max_batch: default_max_batch(),
            max_points_per_sec: default_max_points_per_sec(),
            consent_cache_secs: default_consent_cache_secs(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_min_confidence_pct() -> u32 {
    40
}

fn default_max_batch() -> usize {
    400
}

fn default_max_points_per_sec() -> usize {
    30
}

fn default_consent_cache_secs() -> u64 {
    120
}

/// Workflow engine and reconciler configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Dispatch endpoint. `None` selects the log-only engine.
    #[serde(default)]
    pub engine_url: Option<String>,

    /// Bearer token sent to the engine.
    #[serde(default)]
    pub engine_token: Option<String>,

    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,

    /// Period of the background re-dispatch loop; 0 disables it.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Queued jobs untouched for this long are re-dispatched.
    #[serde(default = "default_reconcile_stale")]
    pub reconcile_stale_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            engine_url: None,
            engine_token: None,
            dispatch_timeout_secs: default_dispatch_timeout(),
            reconcile_interval_secs: default_reconcile_interval(),
            reconcile_stale_secs: default_reconcile_stale(),
        }
    }
}

impl std::fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("engine_url", &self.engine_url)
            .field("engine_token", &self.engine_token.as_ref().map(|_| "[redacted]"))
            .field("dispatch_timeout_secs", &self.dispatch_timeout_secs)
            .field("reconcile_interval_secs", &self.reconcile_interval_secs)
            .field("reconcile_stale_secs", &self.reconcile_stale_secs)
            .finish()
    }
}

fn default_dispatch_timeout() -> u64 {
    10
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_reconcile_stale() -> u64 {
    120
}

/// OpenAI-compatible LLM endpoint configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// API key. Falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_llm_timeout() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    4
}
