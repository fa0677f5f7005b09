// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token middleware.
//!
//! Resolves `Authorization: Bearer <token>` into a [`RequestContext`] and
//! stores it in the request extensions. Requests without a valid session
//! are rejected (fail-closed).

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use neurobridge_core::NeuroError;

use crate::error::ApiError;
use crate::server::GatewayState;

/// The bearer token from `Authorization`, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn require_session(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return ApiError(NeuroError::unauthenticated("missing bearer token")).into_response();
    };

    let ctx = match state.services.auth.context_from_token(Some(token)).await {
        Ok(ctx) => ctx,
        Err(e) => return ApiError(e).into_response(),
    };
    let ctx = ctx.with_cancellation(state.shutdown.child_token());
    request.extensions_mut().insert(ctx);
    next.run(request).await
}
