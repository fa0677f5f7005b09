// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain services for the NeuroBridge backend.
//!
//! Each service wraps the shared [`Database`](neurobridge_storage::Database)
//! and, where needed, an external adapter. Operations that participate in a
//! larger unit of work accept a [`Tx`](neurobridge_storage::Tx); the
//! [`orchestrator`] composes them into the upload-and-start-build workflow.

pub mod auth;
pub mod chat;
pub mod engine;
pub mod gaze;
pub mod jobs;
pub mod materials;
pub mod orchestrator;
pub mod paths;
pub mod reconciler;
pub mod services;

pub use auth::{AuthService, TokenPair};
pub use chat::{ChatWriter, NewMessage};
pub use engine::{HttpWorkflowEngine, LogOnlyEngine, engine_from_config};
pub use gaze::{GazeHit, GazeIngestRequest, GazeService};
pub use jobs::{JobLedger, NewJob, ReconcileReport};
pub use materials::{BlobUploader, FileUpload, MaterialService};
pub use orchestrator::LearningBuildOrchestrator;
pub use paths::PathBootstrap;
pub use reconciler::run_reconciler;
pub use services::Services;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: i64 = 200;

/// Clamp a caller-supplied page size into `1..=MAX_PAGE_SIZE`.
pub fn page_size(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE)
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
