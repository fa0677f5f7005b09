// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request context carrying the caller identity and a cancellation token.

use tokio_util::sync::CancellationToken;

use crate::error::NeuroError;

/// The authenticated identity attached to a request.
#[derive(Clone)]
pub struct Identity {
    pub user_id: String,
    /// Id of the `user_tokens` row backing this session.
    pub session_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .finish()
    }
}

/// Context passed to every public service operation.
///
/// An absent identity means the request is unauthenticated; operations that
/// need a user reject it with [`NeuroError::Unauthenticated`] before writing.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    identity: Option<Identity>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token (e.g. with a child of a server-wide token).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The caller's user id, or an authorization error.
    pub fn user_id(&self) -> Result<&str, NeuroError> {
        self.identity
            .as_ref()
            .map(|i| i.user_id.as_str())
            .ok_or_else(|| NeuroError::unauthenticated("no identity on request context"))
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast when the request has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), NeuroError> {
        if self.cancel.is_cancelled() {
            Err(NeuroError::Cancelled)
        } else {
            Ok(())
        }
    }
}
