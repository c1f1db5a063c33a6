//! Porthole tunnel client
//!
//! Maintains the single outbound connection to the edge, translates
//! multiplexed stream frames into local HTTP calls, and sends the responses
//! back over the same connection.

pub mod api;
pub mod config;
pub mod tunnel;

pub use api::{create_session, ApiError, CreateSessionRequest, CreateSessionResponse};
pub use config::{StatusCallback, TunnelConfig};
pub use tunnel::{TunnelClient, TunnelError, TunnelState};
