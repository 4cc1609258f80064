//! Event surface.
//!
//! Every message crossing the transport and every user-action prompt is
//! published once on an [`EventBus`]. Events are not retained: a
//! subscriber only sees what is published after it subscribed.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::error::Result;
use crate::message::{Failure, FailureType, Message, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToDevice,
    FromDevice,
}

/// What an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A message of the given type crossed the transport.
    Message(u16),
    /// The device answered with a `Failure`.
    Failure,
    ButtonRequest,
    PinRequest,
    PassphraseRequest,
    CharacterRequest,
    WordRequest,
    Disconnect,
}

impl EventKind {
    /// Kinds that abort an interactive wait.
    pub const EXIT: [EventKind; 2] = [
        EventKind::Message(MessageType::Cancel.id()),
        EventKind::Disconnect,
    ];

    pub fn is_exit(self) -> bool {
        Self::EXIT.contains(&self)
    }

    /// Prompt kind for a device request that needs an application answer,
    /// paired with the ack type that answers it.
    pub fn prompt_for(kind: MessageType) -> Option<(EventKind, MessageType)> {
        match kind {
            MessageType::PinMatrixRequest => {
                Some((EventKind::PinRequest, MessageType::PinMatrixAck))
            }
            MessageType::PassphraseRequest => {
                Some((EventKind::PassphraseRequest, MessageType::PassphraseAck))
            }
            MessageType::CharacterRequest => {
                Some((EventKind::CharacterRequest, MessageType::CharacterAck))
            }
            MessageType::WordRequest => Some((EventKind::WordRequest, MessageType::WordAck)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub direction: Direction,
    pub type_id: Option<u16>,
    /// Catalog name of `type_id`, when it resolves.
    pub name: Option<&'static str>,
    #[serde(skip)]
    pub message: Option<Message>,
}

impl Event {
    /// Generic event for a message crossing the transport.
    pub fn message(direction: Direction, message: Message, name: Option<&'static str>) -> Self {
        Self {
            kind: EventKind::Message(message.type_id),
            direction,
            type_id: Some(message.type_id),
            name,
            message: Some(message),
        }
    }

    /// Re-label an inbound message event with a specific kind.
    pub fn with_kind(&self, kind: EventKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    pub fn disconnect() -> Self {
        Self {
            kind: EventKind::Disconnect,
            direction: Direction::FromDevice,
            type_id: None,
            name: None,
            message: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.message
            .as_ref()
            .is_some_and(|m| m.is(MessageType::Failure))
    }

    /// Decoded failure body, if this event carries a `Failure`.
    pub fn failure(&self) -> Option<Result<Failure>> {
        match &self.message {
            Some(message) if message.is(MessageType::Failure) => Some(message.decode()),
            _ => None,
        }
    }

    pub fn failure_code(&self) -> Option<FailureType> {
        match self.failure() {
            Some(Ok(failure)) => Some(failure.code()),
            _ => None,
        }
    }

    /// Decode the carried message body as `M`.
    pub fn decode<M: prost::Message + Default>(&self) -> Option<Result<M>> {
        self.message.as_ref().map(Message::decode)
    }
}

/// Broadcast bus for [`Event`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to current subscribers. Having none is fine.
    pub fn publish(&self, event: Event) {
        trace!(kind = ?event.kind, direction = ?event.direction, "publish event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct EventSubscription {
    rx: broadcast::Receiver<Event>,
}

impl EventSubscription {
    /// Next event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-published event, without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    /// First event whose kind is one of `kinds`.
    pub async fn wait_for(&mut self, kinds: &[EventKind]) -> Option<Event> {
        loop {
            let event = self.recv().await?;
            if kinds.contains(&event.kind) {
                return Some(event);
            }
        }
    }
}
