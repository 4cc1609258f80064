/// Errors that can occur in raw transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the underlying device handle.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The far end of the channel went away.
    #[error("channel closed")]
    Closed,

    /// The device does not expose a debug link channel.
    #[error("device has no debug link")]
    NoDebugLink,

    /// The device was disconnected before or during the operation.
    #[error("device {0} disconnected")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
