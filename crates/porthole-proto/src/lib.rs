//! Porthole Tunnel Protocol Definitions
//!
//! This crate defines the binary frame layout and the textual request/response
//! head encodings carried as frame payloads. Pure and transport-agnostic; the
//! edge and the tunnel client both speak this.

pub mod frame;
pub mod head;

pub use frame::{decode_stream_id, Frame, FrameError, FrameType, StreamId, FRAME_HEADER_LEN};
pub use head::{
    decode_open_stream, decode_response_headers, encode_open_stream, encode_response_headers,
    RequestHead, ResponseHead,
};

/// Reserved stream ID for control messages (ping/pong)
pub const CONTROL_STREAM_ID: StreamId = 0;
