use std::time::Duration;

/// Errors that can occur while calling a device.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] hwcall_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] hwcall_frame::FrameError),

    /// A message body could not be decoded.
    #[error("message decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The in-flight action was cancelled by the user, the device, or a
    /// disconnect.
    #[error("action cancelled")]
    ActionCancelled,

    /// The device did not produce a frame in time.
    #[error("timed out after {0:?} waiting for the device")]
    Timeout(Duration),

    /// The device kept prompting past the configured limit.
    #[error("device sent more than {0} prompts in one call")]
    TooManyPrompts(usize),

    /// A call that was expected to wait completed without a response.
    #[error("call completed without a response")]
    NoResponse,

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether this error means the action was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::ActionCancelled)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
