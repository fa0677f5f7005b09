// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Router, middleware as axum_middleware};
use neurobridge_config::model::ServerConfig;
use neurobridge_core::NeuroError;
use neurobridge_services::Services;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_session;
use crate::handlers;

/// Health state for the unauthenticated health endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub services: Services,
    pub health: HealthState,
    /// Cancelled on shutdown; every request context gets a child token.
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(services: Services, shutdown: CancellationToken) -> Self {
        Self {
            services,
            health: HealthState {
                start_time: std::time::Instant::now(),
            },
            shutdown,
        }
    }
}

/// Build the full route table.
pub fn router(state: GatewayState, max_upload_bytes: usize) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/v1/auth/register", post(handlers::register))
        .route("/v1/auth/login", post(handlers::login))
        .route("/v1/auth/refresh", post(handlers::refresh))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/auth/logout", post(handlers::logout))
        .route(
            "/v1/me",
            get(handlers::get_me)
                .patch(handlers::patch_me)
                .delete(handlers::delete_me),
        )
        .route(
            "/v1/me/prefs",
            get(handlers::get_prefs).put(handlers::put_prefs),
        )
        .route(
            "/v1/learning-builds",
            post(handlers::post_learning_build).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/v1/material-sets", get(handlers::list_material_sets))
        .route(
            "/v1/material-sets/{id}",
            get(handlers::get_material_set).delete(handlers::delete_material_set),
        )
        .route("/v1/paths", get(handlers::list_paths))
        .route("/v1/paths/{id}", get(handlers::get_path))
        .route("/v1/threads/{id}", get(handlers::get_thread))
        .route("/v1/threads/{id}/messages", get(handlers::list_messages))
        .route("/v1/threads/{id}/viewed", post(handlers::mark_thread_viewed))
        .route("/v1/jobs", get(handlers::list_jobs))
        .route("/v1/jobs/{id}", get(handlers::get_job))
        .route("/v1/jobs/{id}/cancel", post(handlers::cancel_job))
        .route("/v1/courses/{id}/latest-run", get(handlers::latest_run_for_course))
        .route("/v1/gaze", post(handlers::post_gaze))
        .route("/v1/gaze/blocks", get(handlers::get_gaze_blocks))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `state.shutdown` is cancelled.
pub async fn start_server(config: &ServerConfig, state: GatewayState) -> Result<(), NeuroError> {
    let shutdown = state.shutdown.clone();
    let app = router(state, config.max_upload_bytes);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| NeuroError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| NeuroError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
