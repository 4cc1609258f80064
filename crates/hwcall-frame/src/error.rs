/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic {0:02x?} (expected 0x2323 \"##\")")]
    InvalidMagic([u8; 2]),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The message type does not fit the 16-bit header field.
    #[error("message type {0} does not fit in 16 bits")]
    TypeIdOutOfRange(u32),

    /// The buffer ends before the header or the declared payload does.
    #[error("truncated frame ({available} bytes, need {needed})")]
    Truncated { needed: usize, available: usize },

    /// A HID report did not start with the expected report id.
    #[error("invalid report id 0x{0:02x} (expected 0x3f '?')")]
    InvalidReportId(u8),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
