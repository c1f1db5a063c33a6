//! Porthole control-plane API
//!
//! Session creation, slug allocation, and lifecycle over HTTP. State is held
//! in memory by [`store::SessionStore`]; the HTTP surface is a thin layer of
//! axum handlers over it.

pub mod handlers;
pub mod models;
pub mod store;

use axum::{
    routing::{get, post},
    Json, Router,
};
use std::{net::SocketAddr, sync::Arc};
use store::{SessionStore, StoreConfig};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;

/// Application state shared across handlers
pub struct AppState {
    pub store: SessionStore,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Porthole Control Plane API",
        version = "0.1.0",
        description = "Session creation, slug allocation, and lifecycle for Porthole tunnels",
        contact(
            name = "Porthole Team",
            email = "team@porthole.dev"
        )
    ),
    paths(
        handlers::health_check,
        handlers::create_session,
        handlers::get_session,
        handlers::delete_session,
        handlers::get_session_by_slug,
        handlers::update_policy,
        handlers::replace_viewers,
        handlers::kick_viewer,
        handlers::close_session,
    ),
    components(
        schemas(
            models::AuthMode,
            models::SessionPolicy,
            models::PolicyUpdate,
            models::Viewer,
            models::Session,
            models::CreateSessionRequest,
            models::CreateSessionResponse,
            models::ReplaceViewersRequest,
            models::KickRequest,
            models::OkResponse,
            models::PolicyResponse,
            models::KickResponse,
            models::ErrorResponse,
            models::HealthResponse,
        )
    ),
    tags(
        (name = "sessions", description = "Session lifecycle endpoints"),
        (name = "system", description = "System health and info endpoints")
    )
)]
struct ApiDoc;

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Enable CORS (the owner overlay calls the API cross-origin)
    pub enable_cors: bool,
    /// Base URLs used to derive session URLs
    pub store: StoreConfig,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            enable_cors: true,
            store: StoreConfig::default(),
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        let state = Arc::new(AppState {
            store: SessionStore::new(config.store.clone()),
        });
        Self { config, state }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_doc = ApiDoc::openapi();

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/sessions", post(handlers::create_session))
            .route(
                "/sessions/{id}",
                get(handlers::get_session).delete(handlers::delete_session),
            )
            .route(
                "/sessions/by-slug/{slug}",
                get(handlers::get_session_by_slug),
            )
            .route(
                "/sessions/by-slug/{slug}/policy",
                post(handlers::update_policy),
            )
            .route(
                "/sessions/by-slug/{slug}/viewers",
                post(handlers::replace_viewers),
            )
            .route("/sessions/by-slug/{slug}/kick", post(handlers::kick_viewer))
            .route(
                "/sessions/by-slug/{slug}/close",
                post(handlers::close_session),
            )
            .route(
                "/api/openapi.json",
                get(move || async move { Json(api_doc) }),
            )
            .with_state(self.state.clone());

        let router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        info!("Starting control-plane API on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}
