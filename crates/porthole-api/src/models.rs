//! API data models
//!
//! Wire representations for the session API. Field names on the wire are
//! camelCase; the viewer count additionally accepts the legacy `requests`
//! name on input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How viewers authenticate against the public URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    None,
    Basic,
}

/// Owner-controlled viewing policy for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionPolicy {
    /// Whether the session is reachable by anyone with the link
    #[serde(rename = "public")]
    pub is_public: bool,
    pub max_concurrent_viewers: u32,
    /// Path prefixes the edge refuses to proxy
    pub block_paths: Vec<String>,
    /// Optional viewing password; empty string means none
    pub password: String,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            is_public: true,
            max_concurrent_viewers: 20,
            block_paths: Vec::new(),
            password: String::new(),
        }
    }
}

/// Partial policy update; absent fields keep their current value
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyUpdate {
    #[serde(rename = "public")]
    pub is_public: Option<bool>,
    pub max_concurrent_viewers: Option<u32>,
    pub block_paths: Option<Vec<String>>,
    pub password: Option<String>,
}

/// One active viewer as reported by the edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub id: String,
    pub last_seen_at: String,
    #[serde(rename = "requestCount", alias = "requests", default)]
    pub request_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// A tunnel session record
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub slug: String,
    /// Bearer credential the tunnel client presents to the edge
    pub session_token: String,
    /// Credential for the owner control surface
    pub owner_token: String,
    pub public_url: String,
    pub owner_url: String,
    pub overlay_script_url: String,
    pub edge_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub auth_mode: AuthMode,
    pub policy: SessionPolicy,
    pub active_viewers: Vec<Viewer>,
    /// Append-only; a kicked viewer stays kicked for the session lifetime
    pub kicked_viewer_ids: Vec<String>,
    /// Monotonic: once closed, a session never reopens
    pub closed: bool,
}

/// `POST /sessions` request body; an empty or absent body uses the defaults
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSessionRequest {
    pub port: u16,
    pub auth_mode: AuthMode,
    /// Duration string such as `"30m"` or `"24h"`
    pub expires_in: String,
}

impl Default for CreateSessionRequest {
    fn default() -> Self {
        Self {
            port: 3000,
            auth_mode: AuthMode::None,
            expires_in: "24h".to_string(),
        }
    }
}

/// `POST /sessions` response body
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub slug: String,
    pub public_url: String,
    pub owner_url: String,
    pub overlay_script_url: String,
    pub edge_url: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    /// Only present when basic auth was requested; this response is the one
    /// and only place the credentials are handed out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Wholesale viewer replacement as reported by the edge
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReplaceViewersRequest {
    pub viewers: Vec<Viewer>,
}

/// `POST /sessions/{id}/kick` request body
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KickRequest {
    pub viewer_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PolicyResponse {
    pub ok: bool,
    pub policy: SessionPolicy,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KickResponse {
    pub ok: bool,
    pub kicked_viewer_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
}
