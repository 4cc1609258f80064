use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Magic at the start of a signed firmware image header.
pub const FIRMWARE_HEADER_MAGIC: &[u8; 4] = b"KPKY";

/// Size of the signed header that precedes the firmware body.
pub const FIRMWARE_HEADER_SIZE: usize = 256;

/// A logical channel to the device.
///
/// The primary lane carries normal protocol traffic. The debug lane carries
/// debug-link traffic and is not subject to the user-action protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Primary,
    Debug,
}

impl Lane {
    /// Both lanes, primary first.
    pub const ALL: [Lane; 2] = [Lane::Primary, Lane::Debug];

    pub fn name(self) -> &'static str {
        match self {
            Lane::Primary => "primary",
            Lane::Debug => "debug",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Moves complete frames over one lane.
///
/// `read` returns `Ok(None)` when no complete frame is available yet; callers
/// keep polling until a frame or an error arrives.
#[async_trait]
pub trait RawChannel: Send + Sync {
    /// Write one encoded frame.
    async fn write(&self, frame: Bytes) -> Result<()>;

    /// Read the next complete frame, if one is ready.
    async fn read(&self) -> Result<Option<Bytes>>;
}

/// Capabilities a physical backend provides to the call engine.
#[async_trait]
pub trait Device: Send + Sync {
    type Channel: RawChannel;

    /// The raw channel for `lane`, or `None` when the backend has no such lane.
    fn channel(&self, lane: Lane) -> Option<&Self::Channel>;

    /// Stable identifier for this physical device (serial number, path, ...).
    fn device_id(&self) -> String;

    fn vendor(&self) -> String;

    fn is_open(&self) -> bool;

    async fn disconnect(&self) -> Result<()>;

    /// Host-side entropy handed to the device when it asks for it.
    fn entropy(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut buf);
        buf
    }

    /// Hash of a firmware image as the bootloader reports it.
    async fn firmware_hash(&self, image: &[u8]) -> Result<[u8; 32]> {
        Ok(firmware_hash(image))
    }
}

/// SHA-256 over the firmware body.
///
/// Images carrying the signed `KPKY` header are hashed without it, matching
/// what the bootloader measures after flashing.
pub fn firmware_hash(image: &[u8]) -> [u8; 32] {
    let body = if image.len() >= FIRMWARE_HEADER_SIZE && image.starts_with(FIRMWARE_HEADER_MAGIC)
    {
        &image[FIRMWARE_HEADER_SIZE..]
    } else {
        image
    };
    Sha256::digest(body).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_names() {
        assert_eq!(Lane::Primary.to_string(), "primary");
        assert_eq!(Lane::Debug.name(), "debug");
        assert_eq!(Lane::ALL, [Lane::Primary, Lane::Debug]);
    }

    #[test]
    fn firmware_hash_skips_signed_header() {
        let body = b"firmware body bytes";
        let mut image = Vec::with_capacity(FIRMWARE_HEADER_SIZE + body.len());
        image.extend_from_slice(FIRMWARE_HEADER_MAGIC);
        image.resize(FIRMWARE_HEADER_SIZE, 0xAA);
        image.extend_from_slice(body);

        assert_eq!(firmware_hash(&image), firmware_hash(body));
    }

    #[test]
    fn firmware_hash_of_unsigned_image_covers_everything() {
        let image = vec![0x11u8; FIRMWARE_HEADER_SIZE + 8];
        let expected: [u8; 32] = Sha256::digest(&image).into();
        assert_eq!(firmware_hash(&image), expected);
    }
}
