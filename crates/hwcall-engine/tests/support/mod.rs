//! Scripted device side for engine tests.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use hwcall_engine::{Message, MessageType};
use hwcall_frame::{decode_frame, encode_frame, FrameConfig};
use hwcall_transport::HarnessLane;

pub struct DeviceSide {
    lane: HarnessLane,
}

impl DeviceSide {
    pub fn new(lane: HarnessLane) -> Self {
        Self { lane }
    }

    /// Next message the host wrote; panics if none arrives within a second.
    pub async fn expect(&mut self) -> Message {
        let raw = tokio::time::timeout(Duration::from_secs(1), self.lane.recv())
            .await
            .expect("host did not write in time")
            .expect("host side closed");
        decode_frame(&raw, &FrameConfig::default())
            .expect("host wrote a malformed frame")
            .into()
    }

    /// Like [`expect`](Self::expect), asserting the type.
    pub async fn expect_type(&mut self, kind: MessageType) -> Message {
        let message = self.expect().await;
        assert_eq!(
            message.message_type(),
            Some(kind),
            "expected {}, got type {}",
            kind.name(),
            message.type_id
        );
        message
    }

    /// Whether the host has written anything not yet consumed.
    pub fn has_pending(&mut self) -> bool {
        self.lane.try_recv().is_some()
    }

    pub fn reply(&self, kind: MessageType, body: &impl prost::Message) {
        self.reply_raw(kind.id(), &body.encode_to_vec());
    }

    pub fn reply_raw(&self, type_id: u16, payload: &[u8]) {
        let mut buf = BytesMut::new();
        encode_frame(type_id, payload, &mut buf).unwrap();
        self.lane.send(buf.freeze()).unwrap();
    }

    pub fn reply_bytes(&self, raw: &'static [u8]) {
        self.lane.send(Bytes::from_static(raw)).unwrap();
    }
}
