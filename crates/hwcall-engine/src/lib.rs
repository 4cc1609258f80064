//! Call engine for hardware wallet devices.
//!
//! Turns a raw framed transport into serialized, interactive
//! request/response calls. A [`Transport`] queues calls per lane, encodes
//! them into frames, and runs each exchange through the device's prompts
//! (button confirmation, PIN, passphrase, recovery words, entropy) until a
//! terminal response arrives. Prompts that need the user are surfaced as
//! [`Event`]s and answered with `send_pin` and friends, or aborted with
//! [`Transport::cancel`].

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod lane;
pub mod message;

pub use catalog::{KeepKeyCatalog, MessageCatalog};
pub use config::{EngineConfig, DEFAULT_TIMEOUT, LONG_TIMEOUT};
pub use engine::{CallOptions, Transport};
pub use error::{EngineError, Result};
pub use event::{Direction, Event, EventBus, EventKind, EventSubscription};
pub use lane::Lanes;
pub use message::{FailureType, Message, MessageType};
