// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`NeuroError`] to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use neurobridge_core::{ErrorKind, NeuroError};
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error wrapper so `?` works on service calls.
#[derive(Debug)]
pub struct ApiError(pub NeuroError);

impl From<NeuroError> for ApiError {
    fn from(e: NeuroError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match (&self.0, self.0.kind()) {
            (NeuroError::Forbidden(_), _) => StatusCode::FORBIDDEN,
            (NeuroError::Timeout { .. }, _) => StatusCode::GATEWAY_TIMEOUT,
            (_, ErrorKind::Validation) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::Authorization) => StatusCode::UNAUTHORIZED,
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::Conflict) => StatusCode::CONFLICT,
            (_, ErrorKind::Transient) => StatusCode::SERVICE_UNAVAILABLE,
            (_, ErrorKind::ExternalRefusal) => StatusCode::UNPROCESSABLE_ENTITY,
            (_, ErrorKind::Programming) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Auth causes and internal details stay in logs.
    fn public_message(&self) -> String {
        match (&self.0, self.0.kind()) {
            (NeuroError::Forbidden(_), _) => "forbidden".to_string(),
            (_, ErrorKind::Authorization) => "invalid credentials".to_string(),
            (_, ErrorKind::Programming) => "internal error".to_string(),
            (NeuroError::Storage { .. }, _) => "storage unavailable".to_string(),
            (e, _) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.0.kind() {
            ErrorKind::Programming => tracing::error!(error = %self.0, "request failed"),
            ErrorKind::Transient => tracing::warn!(error = %self.0, "request failed"),
            kind => tracing::debug!(error = %self.0, %kind, "request rejected"),
        }
        let body = ErrorResponse {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
