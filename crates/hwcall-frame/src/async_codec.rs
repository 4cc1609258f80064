use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, frame_len, split_frame, Frame, FrameConfig};
use crate::error::FrameError;

/// `tokio_util` codec over the wire format.
///
/// Decoding yields whole encoded frames (header included) so the caller can
/// run them through [`decode_frame`](crate::decode_frame) itself. Encoding
/// accepts either a [`Frame`] or an already encoded frame.
#[derive(Debug, Clone, Default)]
pub struct WireCodec {
    config: FrameConfig,
}

impl WireCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Decode the next frame and parse it in one step.
    pub fn decode_parsed(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        split_frame(src, self.config.max_payload_size)
    }
}

impl Decoder for WireCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match frame_len(src, self.config.max_payload_size)? {
            Some(total) if src.len() >= total => Ok(Some(src.split_to(total).freeze())),
            Some(total) => {
                src.reserve(total - src.len());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.payload.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_frame(item.type_id, &item.payload, dst)
    }
}

impl Encoder<Bytes> for WireCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Validates magic and length before anything reaches the wire.
        match frame_len(&item, self.config.max_payload_size)? {
            Some(total) if total == item.len() => {
                dst.reserve(item.len());
                dst.put_slice(&item);
                Ok(())
            }
            Some(total) => Err(FrameError::Truncated {
                needed: total,
                available: item.len(),
            }),
            None => Err(FrameError::Truncated {
                needed: crate::HEADER_SIZE,
                available: item.len(),
            }),
        }
    }
}
