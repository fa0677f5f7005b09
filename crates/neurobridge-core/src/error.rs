// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the NeuroBridge backend.

use strum::Display;
use thiserror::Error;

use crate::types::LearningBuild;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type used across storage, services, and the gateway.
#[derive(Debug, Error)]
pub enum NeuroError {
    /// Caller input failed validation (missing id, empty inputs, bad values).
    #[error("validation error: {0}")]
    Validation(String),

    /// Authentication failed. The display text is always neutral; the
    /// specific cause is kept in `reason` for logging only.
    #[error("invalid credentials")]
    Unauthenticated { reason: String },

    /// The caller is authenticated but not allowed to touch the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The requested entity does not exist (or is not visible to the caller).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique constraint or state-machine rule rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage backend errors (connection, query failure, deadlock/busy).
    #[error("storage error: {source}")]
    Storage { source: BoxError },

    /// Object storage errors (upload, delete).
    #[error("object store error: {message}")]
    ObjectStore {
        message: String,
        source: Option<BoxError>,
    },

    /// The workflow engine rejected or failed a dispatch call.
    #[error("workflow dispatch error: {message}")]
    Dispatch {
        message: String,
        source: Option<BoxError>,
    },

    /// The learning build committed but its job could not be dispatched.
    /// The persisted ids are carried so callers can still report them.
    #[error("job {job_id} committed but not dispatched: {source}")]
    DispatchFailed {
        job_id: String,
        build: Option<Box<LearningBuild>>,
        source: Box<NeuroError>,
    },

    /// LLM provider errors (network, HTTP status, malformed response).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<BoxError>,
    },

    /// The LLM refused to answer.
    #[error("provider refused: {0}")]
    Refusal(String),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The request was cancelled before the operation finished.
    #[error("operation cancelled")]
    Cancelled,

    /// Programming errors: broken preconditions inside the backend itself.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used for propagation policy and HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    Conflict,
    Transient,
    Programming,
    ExternalRefusal,
}

impl NeuroError {
    /// Wrap any storage-layer error.
    pub fn storage(source: impl Into<BoxError>) -> Self {
        NeuroError::Storage {
            source: source.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        NeuroError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        NeuroError::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NeuroError::Validation(_) => ErrorKind::Validation,
            NeuroError::Unauthenticated { .. } | NeuroError::Forbidden(_) => {
                ErrorKind::Authorization
            }
            NeuroError::NotFound { .. } => ErrorKind::NotFound,
            NeuroError::Conflict(_) => ErrorKind::Conflict,
            NeuroError::Storage { .. }
            | NeuroError::ObjectStore { .. }
            | NeuroError::Dispatch { .. }
            | NeuroError::DispatchFailed { .. }
            | NeuroError::Provider { .. }
            | NeuroError::Timeout { .. }
            | NeuroError::Cancelled => ErrorKind::Transient,
            NeuroError::Refusal(_) => ErrorKind::ExternalRefusal,
            NeuroError::Config(_) | NeuroError::Internal(_) => ErrorKind::Programming,
        }
    }
}
