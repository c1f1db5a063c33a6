//! Binary frame layout
//!
//! Every frame is exactly `5 + payload.len()` bytes: a one-byte type tag, a
//! four-byte big-endian stream id, then the raw payload. There is no payload
//! length prefix: the transport is message-oriented and delivers exactly one
//! frame per message.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Stream identifier
pub type StreamId = u32;

/// Fixed frame header size: type tag (1) + stream id (4)
pub const FRAME_HEADER_LEN: usize = 5;

/// Frame types on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    OpenStream = 0x01,
    StreamData = 0x02,
    StreamEnd = 0x03,
    StreamCancel = 0x04,
    ResponseHeaders = 0x05,
    WsUpgrade = 0x06,
    WsData = 0x07,
    WsClose = 0x08,
    Ping = 0x09,
    Pong = 0x0a,
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameType::OpenStream),
            0x02 => Ok(FrameType::StreamData),
            0x03 => Ok(FrameType::StreamEnd),
            0x04 => Ok(FrameType::StreamCancel),
            0x05 => Ok(FrameType::ResponseHeaders),
            0x06 => Ok(FrameType::WsUpgrade),
            0x07 => Ok(FrameType::WsData),
            0x08 => Ok(FrameType::WsClose),
            0x09 => Ok(FrameType::Ping),
            0x0a => Ok(FrameType::Pong),
            _ => Err(FrameError::InvalidFrameType(value)),
        }
    }
}

/// Frame errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame type: {0:#04x}")]
    InvalidFrameType(u8),

    #[error("frame shorter than the {FRAME_HEADER_LEN}-byte header")]
    Truncated,
}

/// One unit of wire transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub stream_id: StreamId,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, stream_id: StreamId, payload: Bytes) -> Self {
        Self {
            frame_type,
            stream_id,
            payload,
        }
    }

    /// A payload-less frame on the control stream (ping/pong)
    pub fn control(frame_type: FrameType) -> Self {
        Self::new(frame_type, crate::CONTROL_STREAM_ID, Bytes::new())
    }

    /// Encode the frame to bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        buf.put_u8(self.frame_type as u8);
        buf.put_u32(self.stream_id);
        buf.put(self.payload.clone());
        buf.freeze()
    }

    /// Decode a frame from one transport message
    pub fn decode(mut buf: Bytes) -> Result<Self, FrameError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(FrameError::Truncated);
        }

        let frame_type = FrameType::try_from(buf.get_u8())?;
        let stream_id = buf.get_u32();

        Ok(Self {
            frame_type,
            stream_id,
            payload: buf,
        })
    }
}

/// Read the big-endian stream id at offset 1 without decoding the whole
/// frame. The caller must have checked that `buf` holds a full header.
pub fn decode_stream_id(buf: &[u8]) -> StreamId {
    u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_encode_decode() {
        let payload = Bytes::from("hello world");
        let frame = Frame::new(FrameType::StreamData, 42, payload.clone());

        let encoded = frame.encode();
        assert_eq!(encoded.len(), FRAME_HEADER_LEN + payload.len());

        let decoded = Frame::decode(encoded).unwrap();
        assert_eq!(decoded.frame_type, FrameType::StreamData);
        assert_eq!(decoded.stream_id, 42);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn test_empty_payload_frame() {
        let frame = Frame::control(FrameType::Ping);
        let encoded = frame.encode();
        assert_eq!(encoded.len(), FRAME_HEADER_LEN);

        let decoded = Frame::decode(encoded).unwrap();
        assert_eq!(decoded.frame_type, FrameType::Ping);
        assert_eq!(decoded.stream_id, crate::CONTROL_STREAM_ID);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_stream_id_round_trip() {
        for stream_id in [0u32, 1, 255, 0x0102_0304, u32::MAX] {
            let frame = Frame::new(FrameType::OpenStream, stream_id, Bytes::from("x"));
            let encoded = frame.encode();
            assert_eq!(decode_stream_id(&encoded), stream_id);
            assert_eq!(&encoded[FRAME_HEADER_LEN..], b"x");
        }
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let err = Frame::decode(Bytes::from_static(&[0x01, 0x00, 0x00])).unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let err = Frame::decode(Bytes::from_static(&[0x7f, 0, 0, 0, 1])).unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrameType(0x7f)));
    }
}
