use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::*;
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Session not found".to_string(),
        }),
    )
}

/// Service health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_sessions: state.store.len(),
    })
}

/// Create a session
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse)
    ),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<CreateSessionRequest>>,
) -> Json<CreateSessionResponse> {
    // an absent or empty body creates a session with the defaults
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    let (session, credentials) = state.store.create(&request);

    info!(
        session_id = %session.session_id,
        slug = %session.slug,
        auth_mode = ?session.auth_mode,
        "session created"
    );

    let (username, password) = match credentials {
        Some(credentials) => (Some(credentials.username), Some(credentials.password)),
        None => (None, None),
    };

    Json(CreateSessionResponse {
        session_id: session.session_id,
        slug: session.slug,
        public_url: session.public_url,
        owner_url: session.owner_url,
        overlay_script_url: session.overlay_script_url,
        edge_url: session.edge_url,
        session_token: session.session_token,
        expires_at: session.expires_at,
        username,
        password,
    })
}

/// Get a session by ID
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session record", body = Session),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    debug!(%id, "getting session");
    state.store.get_by_id(&id).map(Json).map_err(|_| not_found())
}

/// Delete a session
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Deleted (or already absent)", body = OkResponse)
    ),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<OkResponse> {
    // deletion is idempotent; unknown IDs still report ok
    let removed = state.store.delete_by_id(&id);
    debug!(%id, removed, "delete session");
    Json(OkResponse { ok: true })
}

/// Get a session by slug
#[utoipa::path(
    get,
    path = "/sessions/by-slug/{slug}",
    params(("slug" = String, Path, description = "Session slug")),
    responses(
        (status = 200, description = "Session record", body = Session),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn get_session_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state
        .store
        .get_by_slug(&slug)
        .map(Json)
        .map_err(|_| not_found())
}

/// Update session policy
#[utoipa::path(
    post,
    path = "/sessions/by-slug/{slug}/policy",
    params(("slug" = String, Path, description = "Session slug")),
    request_body = PolicyUpdate,
    responses(
        (status = 200, description = "Merged policy", body = PolicyResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn update_policy(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(update): Json<PolicyUpdate>,
) -> Result<Json<PolicyResponse>, ApiError> {
    let policy = state
        .store
        .update_policy(&slug, &update)
        .map_err(|_| not_found())?;
    info!(%slug, "policy updated");
    Ok(Json(PolicyResponse { ok: true, policy }))
}

/// Replace the active viewer set
#[utoipa::path(
    post,
    path = "/sessions/by-slug/{slug}/viewers",
    params(("slug" = String, Path, description = "Session slug")),
    request_body = ReplaceViewersRequest,
    responses(
        (status = 200, description = "Viewers replaced", body = OkResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn replace_viewers(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(request): Json<ReplaceViewersRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .store
        .replace_viewers(&slug, request.viewers)
        .map_err(|_| not_found())?;
    Ok(Json(OkResponse { ok: true }))
}

/// Kick a viewer
#[utoipa::path(
    post,
    path = "/sessions/by-slug/{slug}/kick",
    params(("slug" = String, Path, description = "Session slug")),
    request_body = KickRequest,
    responses(
        (status = 200, description = "Kick recorded", body = KickResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn kick_viewer(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(request): Json<KickRequest>,
) -> Result<Json<KickResponse>, ApiError> {
    let kicked_viewer_ids = state
        .store
        .kick(&slug, &request.viewer_id)
        .map_err(|_| not_found())?;
    info!(%slug, viewer_id = %request.viewer_id, "viewer kicked");
    Ok(Json(KickResponse {
        ok: true,
        kicked_viewer_ids,
    }))
}

/// Close a session
#[utoipa::path(
    post,
    path = "/sessions/by-slug/{slug}/close",
    params(("slug" = String, Path, description = "Session slug")),
    responses(
        (status = 200, description = "Session closed", body = OkResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    state.store.close(&slug).map_err(|_| not_found())?;
    info!(%slug, "session closed");
    Ok(Json(OkResponse { ok: true }))
}
