use std::time::Duration;

use hwcall_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default bound on each wait for a device frame.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Bound used after an auto-ack, when the device may be waiting on a human.
pub const LONG_TIMEOUT: Duration = Duration::from_millis(5 * 60 * 1_000);

/// Entropy supplied in answer to an `EntropyRequest`.
pub const DEFAULT_ENTROPY_LEN: usize = 32;

/// Device-initiated sub-exchanges allowed within one call.
pub const DEFAULT_MAX_PROMPTS: usize = 64;

/// Engine configuration.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// let cfg = hwcall_engine::EngineConfig::from_json(r#"{"default_timeout_ms": 250}"#).unwrap();
/// assert_eq!(cfg.default_timeout.as_millis(), 250);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(rename = "default_timeout_ms", with = "millis")]
    pub default_timeout: Duration,
    #[serde(rename = "long_timeout_ms", with = "millis")]
    pub long_timeout: Duration,
    pub entropy_len: usize,
    pub max_prompts: usize,
    /// Capacity of the event bus; slow subscribers past it lose events.
    pub event_capacity: usize,
    /// Bytes preceding the frame header in each received transfer.
    pub leading_bytes: usize,
    pub max_payload_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            long_timeout: LONG_TIMEOUT,
            entropy_len: DEFAULT_ENTROPY_LEN,
            max_prompts: DEFAULT_MAX_PROMPTS,
            event_capacity: 256,
            leading_bytes: 0,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Frame decoding settings derived from this config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            leading_bytes: self.leading_bytes,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
