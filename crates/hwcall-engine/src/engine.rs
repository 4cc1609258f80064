use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use hwcall_frame::{decode_frame, encode_frame, FrameConfig};
use hwcall_transport::{Device, Lane, RawChannel, TransportError};
use tracing::{debug, trace, warn};

use crate::catalog::{KeepKeyCatalog, MessageCatalog};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::event::{Direction, Event, EventBus, EventKind, EventSubscription};
use crate::lane::Lanes;
use crate::message::{
    ButtonAck, Cancel, CharacterAck, EntropyAck, Failure, FailureType, Message, MessageType,
    PassphraseAck, PinMatrixAck, WordAck,
};

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Bound on each wait for a device frame. `None` uses the configured default.
    pub timeout: Option<Duration>,
    /// Run immediately instead of queueing behind earlier calls on the lane.
    pub bypass_lock: bool,
    /// Return once the message is written, without reading a response.
    pub no_wait: bool,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn bypass_lock(mut self) -> Self {
        self.bypass_lock = true;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }
}

/// Call engine for one device.
///
/// Share it behind an `Arc`. Calls on the primary lane run one at a time in
/// submission order; the debug lane is serialized independently.
pub struct Transport<D, C = KeepKeyCatalog> {
    device: D,
    catalog: C,
    config: EngineConfig,
    frame_config: FrameConfig,
    lanes: Lanes,
    events: EventBus,
    user_action_required: AtomicBool,
}

impl<D: Device> Transport<D> {
    pub fn new(device: D) -> Self {
        Self::with_config(device, KeepKeyCatalog, EngineConfig::default())
    }
}

impl<D: Device, C: MessageCatalog> Transport<D, C> {
    pub fn with_config(device: D, catalog: C, config: EngineConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            frame_config: config.frame_config(),
            device,
            catalog,
            config,
            lanes: Lanes::new(),
            events,
            user_action_required: AtomicBool::new(false),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lanes(&self) -> &Lanes {
        &self.lanes
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    /// Whether the device is waiting on the user (button, PIN, passphrase...).
    pub fn is_user_action_required(&self) -> bool {
        self.user_action_required.load(Ordering::SeqCst)
    }

    /// Send a message on the primary lane and, unless `no_wait`, run the
    /// exchange to its terminal response.
    ///
    /// Device prompts are handled inside the call: button and entropy
    /// requests are answered automatically, PIN/passphrase/character/word
    /// requests are published as events and wait for the application's ack
    /// or an exit signal. A device `Failure` is returned as the response,
    /// except `ActionCancelled`, which fails the call and resets both lanes.
    pub async fn call(&self, message: Message, options: CallOptions) -> Result<Option<Event>> {
        self.publish_outbound(&message);

        if options.bypass_lock {
            return self.exchange(message, options).await;
        }

        let result = self
            .lanes
            .submit(Lane::Primary, self.exchange(message, options))
            .await;
        self.user_action_required.store(false, Ordering::SeqCst);
        result
    }

    /// [`call`](Self::call) with default options, returning the response.
    pub async fn request(&self, message: Message) -> Result<Event> {
        self.call(message, CallOptions::default())
            .await?
            .ok_or(EngineError::NoResponse)
    }

    /// Send a message on the debug link and return its first response.
    pub async fn call_debug_link(
        &self,
        message: Message,
        options: CallOptions,
    ) -> Result<Option<Event>> {
        if self.device.channel(Lane::Debug).is_none() {
            return Err(TransportError::NoDebugLink.into());
        }
        self.publish_outbound(&message);

        let timeout = self.timeout(options);
        let exchange = async {
            self.write(Lane::Debug, &message).await?;
            if options.no_wait {
                return Ok(None);
            }
            let response = self.read_message(Lane::Debug, timeout).await?;
            Ok::<_, EngineError>(Some(self.publish_inbound(response)))
        };

        if options.bypass_lock {
            exchange.await
        } else {
            self.lanes.submit(Lane::Debug, exchange).await
        }
    }

    /// Abort the interactive exchange in progress, if any.
    ///
    /// Does nothing unless a user action is pending. Send failures are
    /// logged, never returned.
    ///
    /// The outbound `Cancel` event goes out only once the device has the
    /// message, so a waiting prompt keeps reading for the device's answer.
    /// If the write fails the device will never answer; a `Disconnect` is
    /// published instead and the waiting call fails with `ActionCancelled`.
    pub async fn cancel(&self) {
        if !self.is_user_action_required() {
            trace!("cancel ignored, no user action pending");
            return;
        }

        debug!("cancelling pending user action");
        self.lanes.reset();
        let message = Message::new(MessageType::Cancel, &Cancel {});
        match self.write(Lane::Primary, &message).await {
            Ok(()) => self.publish_outbound(&message),
            Err(err) => {
                warn!(error = %err, "failed to send cancel");
                self.events.publish(Event::disconnect());
            }
        }
        self.lanes.reset();
    }

    /// Answer a PIN prompt.
    pub async fn send_pin(&self, pin: impl Into<String>) -> Result<()> {
        let ack = PinMatrixAck { pin: pin.into() };
        self.send_ack(Message::new(MessageType::PinMatrixAck, &ack))
            .await
    }

    /// Answer a passphrase prompt.
    pub async fn send_passphrase(&self, passphrase: impl Into<String>) -> Result<()> {
        let ack = PassphraseAck {
            passphrase: passphrase.into(),
        };
        self.send_ack(Message::new(MessageType::PassphraseAck, &ack))
            .await
    }

    /// Answer a character prompt (recovery cipher entry).
    pub async fn send_character(&self, ack: CharacterAck) -> Result<()> {
        self.send_ack(Message::new(MessageType::CharacterAck, &ack))
            .await
    }

    /// Answer a recovery word prompt.
    pub async fn send_word(&self, word: impl Into<String>) -> Result<()> {
        let ack = WordAck { word: word.into() };
        self.send_ack(Message::new(MessageType::WordAck, &ack)).await
    }

    /// Publish a disconnect, which aborts any interactive wait, then close
    /// the device.
    pub async fn disconnect(&self) -> Result<()> {
        self.events.publish(Event::disconnect());
        self.device.disconnect().await?;
        Ok(())
    }

    async fn send_ack(&self, message: Message) -> Result<()> {
        self.call(message, CallOptions::default().bypass_lock().no_wait())
            .await?;
        Ok(())
    }

    fn timeout(&self, options: CallOptions) -> Duration {
        options.timeout.unwrap_or(self.config.default_timeout)
    }

    async fn exchange(&self, message: Message, options: CallOptions) -> Result<Option<Event>> {
        if message.message_type().is_some_and(MessageType::is_ack) {
            self.user_action_required.store(true, Ordering::SeqCst);
        }
        self.write(Lane::Primary, &message).await?;
        if options.no_wait {
            return Ok(None);
        }

        let response = match self.read_response(self.timeout(options)).await {
            Err(EngineError::ActionCancelled) => {
                self.lanes.reset();
                return Err(EngineError::ActionCancelled);
            }
            other => other?,
        };
        self.user_action_required.store(false, Ordering::SeqCst);

        if response.failure_code() == Some(FailureType::ActionCancelled) {
            debug!("device reported action cancelled");
            self.lanes.reset();
            return Err(EngineError::ActionCancelled);
        }
        Ok(Some(response))
    }

    /// Read until the device sends a terminal message, answering or waiting
    /// out any prompts on the way.
    async fn read_response(&self, timeout: Duration) -> Result<Event> {
        let mut timeout = timeout;
        let mut prompts = 0;

        loop {
            let message = self.read_message(Lane::Primary, timeout).await?;
            // classify before publishing: prompts subscribe ahead of their
            // inbound event
            let inbound = Inbound::classify(message.message_type(), &self.events);
            let event = self.publish_inbound(message);

            let request = match inbound {
                Inbound::Terminal => return Ok(event),
                Inbound::Failure => {
                    let failure = event.with_kind(EventKind::Failure);
                    self.events.publish(failure.clone());
                    return Ok(failure);
                }
                Inbound::SubRequest(request) => request,
            };

            prompts += 1;
            if prompts > self.config.max_prompts {
                warn!(limit = self.config.max_prompts, "device prompt limit exceeded");
                return Err(EngineError::TooManyPrompts(self.config.max_prompts));
            }

            match request {
                SubRequest::Button => {
                    self.user_action_required.store(true, Ordering::SeqCst);
                    self.events.publish(event.with_kind(EventKind::ButtonRequest));
                    self.send_internal(Message::new(MessageType::ButtonAck, &ButtonAck {}))
                        .await?;
                }
                SubRequest::Entropy => {
                    let ack = EntropyAck {
                        entropy: Some(self.device.entropy(self.config.entropy_len)),
                    };
                    self.send_internal(Message::new(MessageType::EntropyAck, &ack))
                        .await?;
                }
                SubRequest::User {
                    prompt,
                    ack,
                    subscription,
                } => self.await_user(subscription, &event, prompt, ack).await?,
            }
            timeout = self.config.long_timeout;
        }
    }

    /// Publish a prompt and wait for the application's ack or an exit signal.
    ///
    /// `subscription` must predate the inbound event for this prompt.
    async fn await_user(
        &self,
        mut subscription: EventSubscription,
        event: &Event,
        prompt: EventKind,
        ack: MessageType,
    ) -> Result<()> {
        let wake = [EventKind::Message(ack.id()), EventKind::EXIT[0], EventKind::EXIT[1]];

        self.user_action_required.store(true, Ordering::SeqCst);
        self.events.publish(event.with_kind(prompt));
        debug!(?prompt, "waiting for user input");

        match subscription.wait_for(&wake).await {
            Some(woken) if woken.kind == EventKind::Disconnect => {
                debug!("device disconnected during prompt");
                Err(EngineError::ActionCancelled)
            }
            // an ack or a cancel: the device answers either, keep reading
            Some(_) => Ok(()),
            None => Err(EngineError::ActionCancelled),
        }
    }

    /// Write an engine-generated reply, bypassing the lane.
    async fn send_internal(&self, message: Message) -> Result<()> {
        self.publish_outbound(&message);
        self.write(Lane::Primary, &message).await
    }

    fn channel(&self, lane: Lane) -> Result<&D::Channel> {
        self.device
            .channel(lane)
            .ok_or_else(|| match lane {
                Lane::Debug => TransportError::NoDebugLink.into(),
                Lane::Primary => TransportError::Closed.into(),
            })
    }

    async fn write(&self, lane: Lane, message: &Message) -> Result<()> {
        let channel = self.channel(lane)?;
        let mut buf = BytesMut::new();
        encode_frame(message.type_id, &message.payload, &mut buf)?;

        debug!(
            %lane,
            type_id = message.type_id,
            name = self.catalog.name_of(message.type_id).unwrap_or("unknown"),
            len = message.payload.len(),
            "write message"
        );
        channel.write(buf.freeze()).await?;
        Ok(())
    }

    async fn read_message(&self, lane: Lane, timeout: Duration) -> Result<Message> {
        let channel = self.channel(lane)?;
        let read = async {
            loop {
                if let Some(raw) = channel.read().await? {
                    return Ok::<_, EngineError>(raw);
                }
                tokio::task::yield_now().await;
            }
        };
        let raw = tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| EngineError::Timeout(timeout))??;

        let frame = decode_frame(&raw, &self.frame_config)?;
        debug!(%lane, type_id = frame.type_id, len = frame.payload.len(), "read message");

        if !self.catalog.resolves(frame.type_id) {
            warn!(type_id = frame.type_id, "unknown message type received");
            let failure = Failure::new(
                FailureType::UnexpectedMessage,
                "Unknown message type received",
            );
            return Ok(Message::new(MessageType::Failure, &failure));
        }
        Ok(frame.into())
    }

    fn publish_outbound(&self, message: &Message) {
        let name = self.catalog.name_of(message.type_id);
        self.events
            .publish(Event::message(Direction::ToDevice, message.clone(), name));
    }

    fn publish_inbound(&self, message: Message) -> Event {
        let name = self.catalog.name_of(message.type_id);
        let event = Event::message(Direction::FromDevice, message, name);
        self.events.publish(event.clone());
        event
    }
}

/// How the response loop treats one inbound message.
enum Inbound {
    Terminal,
    Failure,
    SubRequest(SubRequest),
}

/// Device requests handled inside a call rather than returned to the caller.
enum SubRequest {
    Button,
    Entropy,
    User {
        prompt: EventKind,
        ack: MessageType,
        subscription: EventSubscription,
    },
}

impl Inbound {
    fn classify(kind: Option<MessageType>, events: &EventBus) -> Self {
        let Some(kind) = kind else {
            return Inbound::Terminal;
        };
        match kind {
            MessageType::Failure => Inbound::Failure,
            MessageType::ButtonRequest => Inbound::SubRequest(SubRequest::Button),
            MessageType::EntropyRequest => Inbound::SubRequest(SubRequest::Entropy),
            _ => match EventKind::prompt_for(kind) {
                Some((prompt, ack)) => Inbound::SubRequest(SubRequest::User {
                    prompt,
                    ack,
                    subscription: events.subscribe(),
                }),
                None => Inbound::Terminal,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use hwcall_transport::{DeviceHarness, MemoryDevice};

    use super::*;
    use crate::message::{ButtonRequest, Ping};

    fn reply(harness: &DeviceHarness, kind: MessageType, body: &impl prost::Message) {
        let wire = Message::new(kind, body);
        let mut buf = BytesMut::new();
        encode_frame(wire.type_id, &wire.payload, &mut buf).unwrap();
        harness.primary.send(buf.freeze()).unwrap();
    }

    #[test]
    fn call_options_builders() {
        let opts = CallOptions::default()
            .with_timeout(Duration::from_millis(10))
            .bypass_lock()
            .no_wait();
        assert_eq!(opts.timeout, Some(Duration::from_millis(10)));
        assert!(opts.bypass_lock && opts.no_wait);
    }

    #[tokio::test]
    async fn no_wait_returns_after_write() {
        let (device, mut harness) = MemoryDevice::new("engine-1");
        let transport = Transport::new(device);

        let out = transport
            .call(
                Message::raw(MessageType::Initialize.id(), Bytes::new()),
                CallOptions::default().no_wait(),
            )
            .await
            .unwrap();
        assert!(out.is_none());

        let raw = harness.primary.recv().await.unwrap();
        let frame = decode_frame(&raw, &FrameConfig::default()).unwrap();
        assert_eq!(frame.type_id, MessageType::Initialize.id());
    }

    #[tokio::test]
    async fn ack_sets_user_action_flag() {
        let (device, _harness) = MemoryDevice::new("engine-2");
        let transport = Transport::new(device);
        assert!(!transport.is_user_action_required());

        transport.send_pin("1234").await.unwrap();
        assert!(transport.is_user_action_required());
    }

    #[tokio::test]
    async fn unknown_type_becomes_failure() {
        let (device, harness) = MemoryDevice::new("engine-3");
        let transport = Transport::new(device);

        let mut buf = BytesMut::new();
        encode_frame(999, b"junk", &mut buf).unwrap();
        harness.primary.send(buf.freeze()).unwrap();

        let message = transport
            .read_message(Lane::Primary, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(message.is(MessageType::Failure));
        let failure: Failure = message.decode().unwrap();
        assert_eq!(failure.code(), FailureType::UnexpectedMessage);
        assert_eq!(failure.message(), "Unknown message type received");
    }

    #[tokio::test]
    async fn leading_bytes_are_skipped_on_read() {
        let (device, harness) = MemoryDevice::new("engine-4");
        let config = EngineConfig {
            leading_bytes: 1,
            ..EngineConfig::default()
        };
        let transport = Transport::with_config(device, KeepKeyCatalog, config);

        let mut buf = BytesMut::from(&b"?"[..]);
        encode_frame(MessageType::Success.id(), b"", &mut buf).unwrap();
        buf.resize(64, 0);
        harness.primary.send(buf.freeze()).unwrap();

        let message = transport
            .read_message(Lane::Primary, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(message, Message::raw(MessageType::Success.id(), Bytes::new()));
    }

    #[tokio::test]
    async fn prompt_limit_is_enforced() {
        let (device, mut harness) = MemoryDevice::new("engine-5");
        let config = EngineConfig {
            max_prompts: 2,
            ..EngineConfig::default()
        };
        let transport = Transport::with_config(device, KeepKeyCatalog, config);

        for _ in 0..3 {
            reply(&harness, MessageType::ButtonRequest, &ButtonRequest::default());
        }

        let err = transport
            .request(Message::new(MessageType::Ping, &Ping::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TooManyPrompts(2)));

        // the ping plus two auto-acks went out
        let mut written = 0;
        while harness.primary.try_recv().is_some() {
            written += 1;
        }
        assert_eq!(written, 3);
    }

    #[tokio::test]
    async fn debug_call_without_debug_link_fails() {
        let (device, _harness) = MemoryDevice::new("engine-6");
        let transport = Transport::new(device);

        let err = transport
            .call_debug_link(
                Message::raw(MessageType::DebugLinkGetState.id(), Bytes::new()),
                CallOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Transport(TransportError::NoDebugLink)
        ));
    }
}
