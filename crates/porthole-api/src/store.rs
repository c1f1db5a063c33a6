//! In-memory session store
//!
//! v0 keeps everything in one process. Sessions live in a `RwLock<HashMap>`
//! keyed by session ID; slug lookups scan. Every public URL is derived from
//! the configured canonical base, never from a request host.

use crate::models::{
    AuthMode, CreateSessionRequest, PolicyUpdate, Session, SessionPolicy, Viewer,
};
use chrono::{Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

const ADJECTIVES: &[&str] = &[
    "quiet", "bold", "swift", "calm", "bright", "soft", "warm", "cool", "deep", "flat", "wild",
    "mild", "dark", "pale", "pure", "rare", "max",
];
const NOUNS: &[&str] = &[
    "lime", "mint", "sage", "rose", "sky", "sea", "sand", "snow", "mist", "dawn", "dusk", "flame",
    "storm", "wave", "wind", "frost", "tooth",
];

const TOKEN_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_LEN: usize = 32;
const BASIC_AUTH_PASSWORD_LEN: usize = 8;

/// Username handed out with every basic-auth session
pub const BASIC_AUTH_USERNAME: &str = "porthole";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found")]
    NotFound,
}

/// Store configuration. The base URLs are canonical origins; trailing slashes
/// are tolerated and stripped.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub public_base_url: String,
    pub edge_base_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:3002".to_string(),
            edge_base_url: "ws://localhost:3002".to_string(),
        }
    }
}

/// Credentials returned exactly once at session creation
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

pub struct SessionStore {
    config: StoreConfig,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a slug and tokens and register the session. Returns the
    /// stored record plus, for basic-auth sessions, the one-time credentials;
    /// those are not kept on the record.
    pub fn create(&self, request: &CreateSessionRequest) -> (Session, Option<BasicCredentials>) {
        let slug = random_slug();
        let owner_token = random_token();
        let session_token = format!("{slug}.{owner_token}");
        let session_id = format!("sess_{}", random_token());

        let public_base = self.config.public_base_url.trim_end_matches('/');
        let edge_base = self.config.edge_base_url.trim_end_matches('/');

        let created_at = Utc::now();
        let session = Session {
            session_id: session_id.clone(),
            slug: slug.clone(),
            session_token,
            owner_token: owner_token.clone(),
            public_url: format!("{public_base}/s/{slug}"),
            owner_url: format!("{public_base}/.porthole/owner?slug={slug}&token={owner_token}"),
            overlay_script_url: format!("{public_base}/.porthole/overlay.js?slug={slug}"),
            edge_url: format!("{edge_base}/tunnel"),
            created_at,
            expires_at: created_at + parse_expires_in(&request.expires_in),
            auth_mode: request.auth_mode,
            policy: SessionPolicy::default(),
            active_viewers: Vec::new(),
            kicked_viewer_ids: Vec::new(),
            closed: false,
        };

        let credentials = match request.auth_mode {
            AuthMode::Basic => Some(BasicCredentials {
                username: BASIC_AUTH_USERNAME.to_string(),
                password: random_password(),
            }),
            AuthMode::None => None,
        };

        self.write().insert(session_id, session.clone());
        (session, credentials)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Session, StoreError> {
        self.read().get(id).cloned().ok_or(StoreError::NotFound)
    }

    pub fn get_by_slug(&self, slug: &str) -> Result<Session, StoreError> {
        self.read()
            .values()
            .find(|session| session.slug == slug)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// Remove a session. Deleting an unknown ID is not an error.
    pub fn delete_by_id(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    /// Apply a partial policy update and return the merged policy.
    pub fn update_policy(
        &self,
        slug: &str,
        update: &PolicyUpdate,
    ) -> Result<SessionPolicy, StoreError> {
        let mut sessions = self.write();
        let session = find_by_slug_mut(&mut sessions, slug)?;

        if let Some(is_public) = update.is_public {
            session.policy.is_public = is_public;
        }
        if let Some(max) = update.max_concurrent_viewers {
            session.policy.max_concurrent_viewers = max;
        }
        if let Some(block_paths) = &update.block_paths {
            session.policy.block_paths = block_paths.clone();
        }
        if let Some(password) = &update.password {
            session.policy.password = password.clone();
        }
        Ok(session.policy.clone())
    }

    /// Replace the active viewer set wholesale.
    pub fn replace_viewers(&self, slug: &str, viewers: Vec<Viewer>) -> Result<(), StoreError> {
        let mut sessions = self.write();
        let session = find_by_slug_mut(&mut sessions, slug)?;
        session.active_viewers = viewers;
        Ok(())
    }

    /// Record a kick and drop the viewer from the active set. The kicked list
    /// is append-only and deduplicated; kicking twice is a no-op.
    pub fn kick(&self, slug: &str, viewer_id: &str) -> Result<Vec<String>, StoreError> {
        let mut sessions = self.write();
        let session = find_by_slug_mut(&mut sessions, slug)?;

        if !viewer_id.is_empty() && !session.kicked_viewer_ids.iter().any(|id| id == viewer_id) {
            session.kicked_viewer_ids.push(viewer_id.to_string());
        }
        session.active_viewers.retain(|viewer| viewer.id != viewer_id);
        Ok(session.kicked_viewer_ids.clone())
    }

    /// Mark a session closed. Closing never un-closes.
    pub fn close(&self, slug: &str) -> Result<(), StoreError> {
        let mut sessions = self.write();
        let session = find_by_slug_mut(&mut sessions, slug)?;
        session.closed = true;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn find_by_slug_mut<'a>(
    sessions: &'a mut HashMap<String, Session>,
    slug: &str,
) -> Result<&'a mut Session, StoreError> {
    sessions
        .values_mut()
        .find(|session| session.slug == slug)
        .ok_or(StoreError::NotFound)
}

/// `adjective-noun-N` with N in 1..=99. Collisions are possible and accepted
/// at this scale; the session ID, not the slug, is the primary key.
fn random_slug() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    let number = rng.gen_range(1..100);
    format!("{adjective}-{noun}-{number}")
}

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_CHARS[rng.gen_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

fn random_password() -> String {
    let mut rng = rand::thread_rng();
    (0..BASIC_AUTH_PASSWORD_LEN)
        .map(|_| TOKEN_CHARS[rng.gen_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

/// Parse a `<n>m` or `<n>h` duration string; anything else means 24 hours.
fn parse_expires_in(value: &str) -> Duration {
    value
        .strip_suffix('m')
        .and_then(|n| n.parse().ok())
        .map(Duration::minutes)
        .or_else(|| {
            value
                .strip_suffix('h')
                .and_then(|n| n.parse().ok())
                .map(Duration::hours)
        })
        .unwrap_or_else(|| Duration::hours(24))
}
