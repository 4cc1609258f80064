use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: magic (2) + message type (2) + length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "##" (0x23 0x23).
pub const MAGIC: [u8; 2] = [0x23, 0x23];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A decoded frame: message type plus its serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol message type identifier.
    pub type_id: u16,
    /// Serialized message body.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(type_id: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            type_id,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode this frame into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(self.type_id, &self.payload, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Narrow a wider message type identifier to the 16-bit wire field.
pub fn checked_type_id(raw: u32) -> Result<u16> {
    u16::try_from(raw).map_err(|_| FrameError::TypeIdOutOfRange(raw))
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────┬─────────────────┐
/// │ Magic (2B)   │ Type      │ Length   │ Payload          │
/// │ 0x23 0x23    │ (2B BE)   │ (4B BE)  │ (Length bytes)   │
/// │ "##"         │           │          │                  │
/// └──────────────┴───────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(type_id: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u16(type_id);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from a buffer holding a whole transfer.
///
/// `config.leading_bytes` are skipped before the header. Bytes past the
/// declared payload length (report padding) are ignored.
pub fn decode_frame(src: &Bytes, config: &FrameConfig) -> Result<Frame> {
    let start = config.leading_bytes;
    if src.len() < start + HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: start + HEADER_SIZE,
            available: src.len(),
        });
    }

    let header = &src[start..start + HEADER_SIZE];
    let (type_id, payload_len) = parse_header(header, config.max_payload_size)?;

    let body = start + HEADER_SIZE;
    let end = body + payload_len;
    if src.len() < end {
        return Err(FrameError::Truncated {
            needed: end,
            available: src.len(),
        });
    }

    Ok(Frame {
        type_id,
        payload: src.slice(body..end),
    })
}

/// Total wire length of the frame at the start of `src`.
///
/// Returns `Ok(None)` if the header is not complete yet.
pub fn frame_len(src: &[u8], max_payload: usize) -> Result<Option<usize>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    let (_, payload_len) = parse_header(&src[..HEADER_SIZE], max_payload)?;
    Ok(Some(HEADER_SIZE + payload_len))
}

/// Split one complete frame off the front of a stream buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn split_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let total = match frame_len(src, max_payload)? {
        Some(total) => total,
        None => return Ok(None),
    };
    if src.len() < total {
        return Ok(None);
    }

    let type_id = u16::from_be_bytes([src[2], src[3]]);
    src.advance(HEADER_SIZE);
    let payload = src.split_to(total - HEADER_SIZE).freeze();

    Ok(Some(Frame { type_id, payload }))
}

fn parse_header(header: &[u8], max_payload: usize) -> Result<(u16, usize)> {
    if header[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic([header[0], header[1]]));
    }

    let type_id = u16::from_be_bytes([header[2], header[3]]);
    let payload_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    Ok((type_id, payload_len))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Transport-imposed bytes before the header of a received transfer
    /// (1 for raw HID reports, which start with a report id). Default: 0.
    pub leading_bytes: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            leading_bytes: 0,
        }
    }
}
