// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use axum::Json;
use axum::extract::{Extension, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use neurobridge_core::types::{
    ChatMessage, ChatThread, GazeBlockStat, JobRun, LearningBuild, MaterialFile, MaterialFileInput,
    MaterialSet, User,
};
use neurobridge_core::{Metadata, NeuroError, RequestContext};
use neurobridge_services::{FileUpload, GazeIngestRequest, TokenPair, page_size};
use neurobridge_storage::queries::users::ProfileUpdate;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::server::GatewayState;

type ApiResult<T> = Result<T, ApiError>;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub after_seq: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GazeBlocksQuery {
    pub session_id: Option<String>,
}

/// Response body for POST /v1/learning-builds.
///
/// `dispatched` is false when everything was persisted but the workflow
/// engine could not be reached; the job stays queued for the reconciler.
#[derive(Debug, Serialize)]
pub struct LearningBuildResponse {
    #[serde(flatten)]
    pub build: LearningBuild,
    pub dispatched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MaterialSetResponse {
    #[serde(flatten)]
    pub set: MaterialSet,
    pub files: Vec<MaterialFile>,
}

#[derive(Debug, Serialize)]
pub struct GazeIngestResponse {
    pub accepted: usize,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// POST /v1/auth/register
pub async fn register(
    State(state): State<GatewayState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<Response> {
    let (user, tokens) = state
        .services
        .auth
        .register(&body.email, &body.password, &body.first_name, &body.last_name)
        .await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { user, tokens })).into_response())
}

/// POST /v1/auth/login
pub async fn login(
    State(state): State<GatewayState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<TokenPair>> {
    Ok(Json(state.services.auth.login(&body.email, &body.password).await?))
}

/// POST /v1/auth/refresh
pub async fn refresh(
    State(state): State<GatewayState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    Ok(Json(state.services.auth.refresh(&body.refresh_token).await?))
}

/// POST /v1/auth/logout
pub async fn logout(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<StatusCode> {
    if let Some(identity) = ctx.identity() {
        state.services.auth.logout(&identity.access_token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/me
pub async fn get_me(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.services.auth.get_me(&ctx).await?))
}

/// PATCH /v1/me
pub async fn patch_me(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ProfileRequest>,
) -> ApiResult<Json<User>> {
    let update = ProfileUpdate {
        first_name: body.first_name,
        last_name: body.last_name,
        avatar_url: body.avatar_url,
    };
    Ok(Json(state.services.auth.update_profile(&ctx, &update).await?))
}

/// DELETE /v1/me
pub async fn delete_me(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<StatusCode> {
    state.services.auth.soft_delete_user(&ctx).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/me/prefs
pub async fn get_prefs(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<Metadata>> {
    Ok(Json(state.services.gaze.get_prefs(&ctx).await?))
}

/// PUT /v1/me/prefs
pub async fn put_prefs(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Json(prefs): Json<Metadata>,
) -> ApiResult<Json<Metadata>> {
    Ok(Json(state.services.gaze.set_prefs(&ctx, prefs).await?))
}

/// POST /v1/learning-builds
///
/// Multipart body: any number of `file` parts plus an optional `prompt`
/// text field.
pub async fn post_learning_build(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut uploads = Vec::new();
    let mut prompt: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                uploads.push(FileUpload {
                    input: MaterialFileInput {
                        original_name,
                        mime_type,
                        size_bytes: i64::try_from(bytes.len()).unwrap_or(i64::MAX),
                    },
                    reader: Box::pin(std::io::Cursor::new(bytes)),
                });
            }
            Some("prompt") => prompt = Some(field.text().await.map_err(bad_multipart)?),
            other => tracing::debug!(field = ?other, "ignoring unknown multipart field"),
        }
    }

    let result = state
        .services
        .orchestrator
        .upload_materials_and_start_learning_build_with_chat(&ctx, uploads, prompt.as_deref())
        .await;
    match result {
        Ok(build) => Ok((
            StatusCode::CREATED,
            Json(LearningBuildResponse {
                build,
                dispatched: true,
                dispatch_error: None,
            }),
        )
            .into_response()),
        Err(NeuroError::DispatchFailed {
            build: Some(build),
            source,
            ..
        }) => Ok((
            StatusCode::ACCEPTED,
            Json(LearningBuildResponse {
                build: *build,
                dispatched: false,
                dispatch_error: Some(source.to_string()),
            }),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError(NeuroError::Validation(format!("malformed multipart body: {e}")))
}

/// GET /v1/material-sets
pub async fn list_material_sets(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Vec<MaterialSet>>> {
    let sets = state
        .services
        .materials
        .list_material_sets(&ctx, page_size(q.limit))
        .await?;
    Ok(Json(sets))
}

/// GET /v1/material-sets/{id}
pub async fn get_material_set(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<MaterialSetResponse>> {
    let (set, files) = state.services.materials.get_material_set(&ctx, &id).await?;
    Ok(Json(MaterialSetResponse { set, files }))
}

/// DELETE /v1/material-sets/{id}
pub async fn delete_material_set(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.services.materials.delete_material_set(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/paths
pub async fn list_paths(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Vec<neurobridge_core::types::Path>>> {
    Ok(Json(
        state.services.paths.list_paths(&ctx, page_size(q.limit)).await?,
    ))
}

/// GET /v1/paths/{id}
pub async fn get_path(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<neurobridge_core::types::Path>> {
    Ok(Json(state.services.paths.get_path(&ctx, &id).await?))
}

/// GET /v1/threads/{id}
pub async fn get_thread(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChatThread>> {
    Ok(Json(state.services.chat.get_thread(&ctx, &id).await?))
}

/// GET /v1/threads/{id}/messages
pub async fn list_messages(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(q): Query<MessagesQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let messages = state
        .services
        .chat
        .list_messages(&ctx, &id, q.after_seq.unwrap_or(0), page_size(q.limit))
        .await?;
    Ok(Json(messages))
}

/// POST /v1/threads/{id}/viewed
pub async fn mark_thread_viewed(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChatThread>> {
    Ok(Json(state.services.chat.mark_viewed(&ctx, &id).await?))
}

/// GET /v1/jobs
pub async fn list_jobs(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Vec<JobRun>>> {
    Ok(Json(
        state.services.jobs.list_runs(&ctx, page_size(q.limit)).await?,
    ))
}

/// GET /v1/jobs/{id}
pub async fn get_job(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobRun>> {
    Ok(Json(state.services.jobs.get_run_by_id(&ctx, &id).await?))
}

/// POST /v1/jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobRun>> {
    Ok(Json(state.services.jobs.cancel(&ctx, &id).await?))
}

/// GET /v1/courses/{id}/latest-run
pub async fn latest_run_for_course(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobRun>> {
    Ok(Json(
        state.services.jobs.get_latest_run_for_course(&ctx, &id).await?,
    ))
}

/// POST /v1/gaze
pub async fn post_gaze(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<GazeIngestRequest>,
) -> ApiResult<Json<GazeIngestResponse>> {
    let accepted = state.services.gaze.ingest(&ctx, body).await?;
    Ok(Json(GazeIngestResponse { accepted }))
}

/// GET /v1/gaze/blocks
pub async fn get_gaze_blocks(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
    Query(q): Query<GazeBlocksQuery>,
) -> ApiResult<Json<Vec<GazeBlockStat>>> {
    let session_id = match q.session_id.filter(|s| !s.is_empty()) {
        Some(id) => id,
        None => ctx
            .identity()
            .map(|i| i.session_id.clone())
            .ok_or_else(|| NeuroError::unauthenticated("no session"))?,
    };
    Ok(Json(state.services.gaze.block_stats(&ctx, &session_id).await?))
}
