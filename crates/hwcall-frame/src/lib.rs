//! Wire framing for hardware wallet protocol messages.
//!
//! Every message is framed with:
//! - A 2-byte magic number ("##") for synchronization
//! - A 2-byte big-endian message type identifier
//! - A 4-byte big-endian payload length
//!
//! Report-based transports (HID) split frames into 64-byte reports, see
//! [`report`]. Stream-based transports use [`WireCodec`] and
//! [`StreamChannel`] (behind the `stream` feature).

pub mod codec;
pub mod error;
pub mod report;

#[cfg(feature = "stream")]
pub mod async_codec;
#[cfg(feature = "stream")]
pub mod stream;

pub use codec::{
    checked_type_id, decode_frame, encode_frame, frame_len, split_frame, Frame, FrameConfig,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use report::{segment_reports, ReportAssembler, REPORT_ID, REPORT_SIZE, SEGMENT_SIZE};

#[cfg(feature = "stream")]
pub use async_codec::WireCodec;
#[cfg(feature = "stream")]
pub use stream::StreamChannel;
