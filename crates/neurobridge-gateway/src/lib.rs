// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the NeuroBridge backend.
//!
//! Thin axum layer over [`neurobridge_services::Services`]: public auth
//! routes, bearer-authenticated API routes, and a uniform
//! `{"error": "..."}` body whose status follows the error kind.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, HealthState, router, start_server};
