//! Control-plane API client
//!
//! Creates a session against the control plane and hands back the connection
//! coordinates the tunnel client needs (edge URL, session token) plus the
//! public-facing URLs for display.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Control-plane API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("control plane request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("session creation failed: {status} {body}")]
    Rejected { status: u16, body: String },
}

/// `POST /sessions` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub port: u16,
    /// `"none"` or `"basic"`
    pub auth_mode: String,
    /// Duration string such as `"30m"` or `"24h"`
    pub expires_in: String,
}

impl CreateSessionRequest {
    pub fn new(port: u16, basic_auth: bool, expires_in: impl Into<String>) -> Self {
        Self {
            port,
            auth_mode: if basic_auth { "basic" } else { "none" }.to_string(),
            expires_in: expires_in.into(),
        }
    }
}

/// `POST /sessions` response body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub slug: String,
    pub public_url: String,
    pub owner_url: String,
    pub overlay_script_url: String,
    pub edge_url: String,
    pub session_token: String,
    pub expires_at: String,
    /// Present only when basic auth was requested; never retrievable again
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Create a session. Non-2xx responses surface as [`ApiError::Rejected`] with
/// the status and body text.
pub async fn create_session(
    control_plane_url: &str,
    request: &CreateSessionRequest,
) -> Result<CreateSessionResponse, ApiError> {
    let url = format!("{}/sessions", control_plane_url.trim_end_matches('/'));

    let response = reqwest::Client::new().post(&url).json(request).send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Rejected { status, body });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_with_wire_field_names() {
        let request = CreateSessionRequest::new(3000, true, "30m");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["port"], 3000);
        assert_eq!(json["authMode"], "basic");
        assert_eq!(json["expiresIn"], "30m");
    }

    #[test]
    fn test_response_credentials_are_optional() {
        let json = r#"{
            "sessionId": "sess_abc",
            "slug": "quiet-lime-7",
            "publicUrl": "http://localhost:3002/s/quiet-lime-7",
            "ownerUrl": "http://localhost:3002/.porthole/owner?slug=quiet-lime-7&token=t",
            "overlayScriptUrl": "http://localhost:3002/.porthole/overlay.js?slug=quiet-lime-7",
            "edgeUrl": "ws://localhost:3002/tunnel",
            "sessionToken": "quiet-lime-7.t",
            "expiresAt": "2026-01-01T00:00:00Z"
        }"#;

        let response: CreateSessionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.slug, "quiet-lime-7");
        assert!(response.username.is_none());
        assert!(response.password.is_none());
    }
}
