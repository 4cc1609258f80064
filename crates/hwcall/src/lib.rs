//! Serialized, interactive request/response calls to hardware wallets.
//!
//! hwcall sits between an application and a hardware security device. It
//! frames protocol messages, runs one exchange at a time per lane, and
//! handles the device's mid-call prompts so callers only see final results.
//!
//! # Crate Structure
//!
//! - [`transport`]: raw channel and device capability traits, in-memory backend
//! - [`frame`]: wire frame codec, HID report segmentation, stream channel
//! - [`engine`]: call lanes, response state machine, events, `Transport`
//! - [`logging`]: `tracing-subscriber` setup (behind `logging` feature)

/// Re-export transport types.
pub mod transport {
    pub use hwcall_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hwcall_frame::*;
}

/// Re-export engine types.
pub mod engine {
    pub use hwcall_engine::*;
}

#[cfg(feature = "logging")]
pub mod logging;

pub use hwcall_engine::{
    CallOptions, EngineConfig, EngineError, Event, EventKind, Message, MessageType, Transport,
};
