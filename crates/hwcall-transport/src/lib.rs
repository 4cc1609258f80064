//! Raw transport abstraction for hardware wallet devices.
//!
//! Physical backends (USB, HID, emulator sockets) implement two traits:
//! - [`RawChannel`] moves whole frames in and out of one logical lane
//! - [`Device`] exposes the per-backend capabilities the call engine needs
//!
//! This is the lowest layer of hwcall. Everything else builds on top of
//! these traits. An in-memory backend lives in [`memory`].

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{DeviceHarness, HarnessLane, MemoryChannel, MemoryDevice};
pub use traits::{firmware_hash, Device, Lane, RawChannel};
