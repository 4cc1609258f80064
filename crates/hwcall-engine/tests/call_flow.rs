mod support;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::join_all;
use hwcall_engine::message::{
    ButtonRequest, CharacterAck, EntropyAck, EntropyRequest, Failure, PassphraseAck, PinMatrixAck,
    PinMatrixRequest, Success, WordAck,
};
use hwcall_engine::{
    CallOptions, Direction, EngineError, Event, EventKind, FailureType, Message, MessageType,
    Transport,
};
use hwcall_frame::FrameError;
use hwcall_transport::{Device, Lane, MemoryDevice, TransportError};
use support::DeviceSide;
use tokio::task::JoinHandle;

type MemoryTransport = Arc<Transport<MemoryDevice>>;

fn setup(id: &str) -> (MemoryTransport, DeviceSide) {
    let (device, harness) = MemoryDevice::new(id);
    (Arc::new(Transport::new(device)), DeviceSide::new(harness.primary))
}

fn get_address(path: &'static str) -> Message {
    Message::raw(MessageType::GetAddress.id(), Bytes::from_static(path.as_bytes()))
}

fn ping() -> Message {
    Message::raw(MessageType::Ping.id(), Bytes::new())
}

fn spawn_request(transport: &MemoryTransport, message: Message) -> JoinHandle<hwcall_engine::Result<Event>> {
    let transport = Arc::clone(transport);
    tokio::spawn(async move { transport.request(message).await })
}

fn cancelled_failure() -> Failure {
    Failure::new(FailureType::ActionCancelled, "Action cancelled by user")
}

async fn assert_lane_recovers(transport: &MemoryTransport, device: &mut DeviceSide) {
    let call = spawn_request(transport, ping());
    device.expect_type(MessageType::Ping).await;
    device.reply(MessageType::Success, &Success::default());
    let response = call.await.unwrap().unwrap();
    assert_eq!(response.type_id, Some(MessageType::Success.id()));
}

#[tokio::test]
async fn button_request_is_acknowledged_automatically() {
    let (transport, mut device) = setup("button");
    let mut events = transport.subscribe();

    let call = spawn_request(&transport, get_address("m/44'/0'/0'/0/0"));
    device.expect_type(MessageType::GetAddress).await;
    device.reply(MessageType::ButtonRequest, &ButtonRequest::default());
    device.expect_type(MessageType::ButtonAck).await;
    device.reply_raw(MessageType::Address.id(), b"1BoatSLRHtKNngkdXEeobR76b53LETtpyT");

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.kind, EventKind::Message(MessageType::Address.id()));
    assert_eq!(response.name, Some("Address"));
    assert_eq!(
        response.message.unwrap().payload.as_ref(),
        b"1BoatSLRHtKNngkdXEeobR76b53LETtpyT"
    );
    assert!(!transport.is_user_action_required());

    let sent = events.recv().await.unwrap();
    assert_eq!(sent.kind, EventKind::Message(MessageType::GetAddress.id()));
    assert_eq!(sent.direction, Direction::ToDevice);
    let prompt = events.wait_for(&[EventKind::ButtonRequest]).await.unwrap();
    assert_eq!(prompt.direction, Direction::FromDevice);
}

#[tokio::test]
async fn entropy_request_is_answered_with_host_entropy() {
    let (transport, mut device) = setup("entropy");

    let call = spawn_request(
        &transport,
        Message::raw(MessageType::ResetDevice.id(), Bytes::new()),
    );
    device.expect_type(MessageType::ResetDevice).await;
    device.reply(MessageType::EntropyRequest, &EntropyRequest {});

    let ack: EntropyAck = device
        .expect_type(MessageType::EntropyAck)
        .await
        .decode()
        .unwrap();
    assert_eq!(ack.entropy.unwrap().len(), 32);

    device.reply(
        MessageType::Success,
        &Success {
            message: Some("Device reset".into()),
        },
    );
    let response = call.await.unwrap().unwrap();
    let success: Success = response.decode().unwrap().unwrap();
    assert_eq!(success.message(), "Device reset");
}

#[tokio::test]
async fn sign_tx_waits_for_pin_then_completes() {
    let (transport, mut device) = setup("sign");
    let mut events = transport.subscribe();

    let call = spawn_request(
        &transport,
        Message::raw(MessageType::SignTx.id(), Bytes::from_static(b"\x08\x01")),
    );
    device.expect_type(MessageType::SignTx).await;
    device.reply(MessageType::PinMatrixRequest, &PinMatrixRequest::default());

    events.wait_for(&[EventKind::PinRequest]).await.unwrap();
    assert!(transport.is_user_action_required());

    // nothing is written while the user is entering the PIN
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!device.has_pending());

    transport.send_pin("1234").await.unwrap();
    let ack: PinMatrixAck = device
        .expect_type(MessageType::PinMatrixAck)
        .await
        .decode()
        .unwrap();
    assert_eq!(ack.pin, "1234");

    device.reply_raw(MessageType::TxRequest.id(), b"");
    let response = call.await.unwrap().unwrap();
    assert_eq!(response.type_id, Some(MessageType::TxRequest.id()));
    assert!(!transport.is_user_action_required());
}

#[tokio::test]
async fn recovery_prompts_wait_for_matching_acks() {
    let (transport, mut device) = setup("recovery");
    let mut events = transport.subscribe();

    let call = spawn_request(
        &transport,
        Message::raw(MessageType::RecoveryDevice.id(), Bytes::new()),
    );
    device.expect_type(MessageType::RecoveryDevice).await;

    device.reply_raw(MessageType::WordRequest.id(), b"");
    events.wait_for(&[EventKind::WordRequest]).await.unwrap();
    transport.send_word("abandon").await.unwrap();
    let word: WordAck = device
        .expect_type(MessageType::WordAck)
        .await
        .decode()
        .unwrap();
    assert_eq!(word.word, "abandon");

    device.reply_raw(MessageType::CharacterRequest.id(), b"");
    events.wait_for(&[EventKind::CharacterRequest]).await.unwrap();
    transport
        .send_character(CharacterAck {
            character: Some("a".into()),
            ..CharacterAck::default()
        })
        .await
        .unwrap();
    let character: CharacterAck = device
        .expect_type(MessageType::CharacterAck)
        .await
        .decode()
        .unwrap();
    assert_eq!(character.character(), "a");

    device.reply_raw(MessageType::PassphraseRequest.id(), b"");
    events.wait_for(&[EventKind::PassphraseRequest]).await.unwrap();
    transport.send_passphrase("hunter2").await.unwrap();
    let passphrase: PassphraseAck = device
        .expect_type(MessageType::PassphraseAck)
        .await
        .decode()
        .unwrap();
    assert_eq!(passphrase.passphrase, "hunter2");

    device.reply(MessageType::Success, &Success::default());
    assert!(call.await.unwrap().is_ok());
}

#[tokio::test]
async fn cancel_aborts_prompt_and_empties_lanes() {
    let (transport, mut device) = setup("cancel");
    let mut events = transport.subscribe();

    let call = spawn_request(&transport, get_address("m/44'/0'/0'/0/1"));
    device.expect_type(MessageType::GetAddress).await;
    device.reply(MessageType::PinMatrixRequest, &PinMatrixRequest::default());
    events.wait_for(&[EventKind::PinRequest]).await.unwrap();

    transport.cancel().await;
    device.expect_type(MessageType::Cancel).await;
    device.reply(MessageType::Failure, &cancelled_failure());

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(transport.lanes().is_empty(Lane::Primary));
    assert!(transport.lanes().is_empty(Lane::Debug));
    assert!(!transport.is_user_action_required());

    assert_lane_recovers(&transport, &mut device).await;
}

#[tokio::test]
async fn queued_call_is_cancelled_with_the_active_one() {
    let (transport, mut device) = setup("queued");
    let mut events = transport.subscribe();

    let first = spawn_request(&transport, get_address("m/0"));
    device.expect_type(MessageType::GetAddress).await;
    device.reply(MessageType::PinMatrixRequest, &PinMatrixRequest::default());
    events.wait_for(&[EventKind::PinRequest]).await.unwrap();

    let second = spawn_request(&transport, get_address("m/1"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!device.has_pending());

    transport.cancel().await;
    device.expect_type(MessageType::Cancel).await;
    device.reply(MessageType::Failure, &cancelled_failure());

    assert!(first.await.unwrap().unwrap_err().is_cancelled());
    assert!(second.await.unwrap().unwrap_err().is_cancelled());
    // the queued call never reached the device
    assert!(!device.has_pending());

    assert_lane_recovers(&transport, &mut device).await;
}

#[tokio::test]
async fn cancel_with_undeliverable_message_still_resets() {
    let (transport, mut device) = setup("unreachable");
    let mut events = transport.subscribe();

    let call = spawn_request(&transport, get_address("m/0"));
    device.expect_type(MessageType::GetAddress).await;
    device.reply(MessageType::PinMatrixRequest, &PinMatrixRequest::default());
    events.wait_for(&[EventKind::PinRequest]).await.unwrap();

    // the link drops without the engine hearing about it
    transport.device().disconnect().await.unwrap();
    transport.cancel().await;

    assert!(transport.lanes().is_empty(Lane::Primary));
    assert!(transport.lanes().is_empty(Lane::Debug));
    assert!(!device.has_pending());

    let err = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .expect("prompt wait was not released")
        .unwrap()
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(!transport.is_user_action_required());
}

#[tokio::test]
async fn transport_error_does_not_poison_the_lane() {
    let (transport, mut device) = setup("replug");

    transport.device().disconnect().await.unwrap();
    let err = transport.request(ping()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transport(TransportError::Disconnected(_))
    ));
    assert!(!transport.lanes().is_busy(Lane::Primary));
    assert!(!device.has_pending());

    transport.device().reconnect();
    assert_lane_recovers(&transport, &mut device).await;
}

#[tokio::test]
async fn ack_sent_from_the_generic_event_is_not_missed() {
    let (transport, mut device) = setup("eager");
    let mut events = transport.subscribe();

    let answer = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            events
                .wait_for(&[EventKind::Message(MessageType::PinMatrixRequest.id())])
                .await
                .unwrap();
            transport.send_pin("2468").await.unwrap();
        })
    };

    let call = spawn_request(&transport, get_address("m/0"));
    device.expect_type(MessageType::GetAddress).await;
    device.reply(MessageType::PinMatrixRequest, &PinMatrixRequest::default());
    answer.await.unwrap();

    let ack: PinMatrixAck = device
        .expect_type(MessageType::PinMatrixAck)
        .await
        .decode()
        .unwrap();
    assert_eq!(ack.pin, "2468");
    device.reply_raw(MessageType::Address.id(), b"addr");

    let response = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .expect("call stayed parked on the prompt")
        .unwrap()
        .unwrap();
    assert_eq!(response.type_id, Some(MessageType::Address.id()));
}

#[tokio::test]
async fn cancel_is_a_noop_without_pending_user_action() {
    let (transport, mut device) = setup("idle");
    assert_lane_recovers(&transport, &mut device).await;
    assert!(!transport.lanes().is_empty(Lane::Primary));

    transport.cancel().await;

    assert!(!device.has_pending());
    assert!(!transport.lanes().is_empty(Lane::Primary));
    assert!(!transport.is_user_action_required());
}

#[tokio::test]
async fn disconnect_aborts_prompt() {
    let (transport, mut device) = setup("unplug");
    let mut events = transport.subscribe();

    let call = spawn_request(
        &transport,
        Message::raw(MessageType::RecoveryDevice.id(), Bytes::new()),
    );
    device.expect_type(MessageType::RecoveryDevice).await;
    device.reply_raw(MessageType::WordRequest.id(), b"");
    events.wait_for(&[EventKind::WordRequest]).await.unwrap();

    transport.disconnect().await.unwrap();

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(transport.lanes().is_empty(Lane::Primary));
    assert!(transport.lanes().is_empty(Lane::Debug));
    assert!(!transport.device().is_open());
}

#[tokio::test]
async fn calls_reach_the_device_in_submission_order() {
    let (transport, mut device) = setup("fifo");
    let paths: [&'static str; 3] = ["m/44'/0'/0'/0/0", "m/44'/0'/0'/0/1", "m/44'/0'/0'/0/2"];

    let caller = Arc::clone(&transport);
    let all = tokio::spawn(async move {
        let calls = paths.map(|path| caller.request(get_address(path)));
        join_all(calls).await
    });

    for (i, path) in paths.iter().enumerate() {
        let message = device.expect_type(MessageType::GetAddress).await;
        assert_eq!(message.payload.as_ref(), path.as_bytes());

        // the next call must not be written before this one is answered
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!device.has_pending());
        device.reply_raw(MessageType::Address.id(), format!("addr-{i}").as_bytes());
    }

    let results = all.await.unwrap();
    for (i, result) in results.into_iter().enumerate() {
        let response = result.unwrap();
        assert_eq!(
            response.message.unwrap().payload.as_ref(),
            format!("addr-{i}").as_bytes()
        );
    }
}

#[tokio::test]
async fn timeout_does_not_poison_the_lane() {
    let (transport, mut device) = setup("slow");

    let err = transport
        .call(
            get_address("m/0"),
            CallOptions::default().with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout(d) if d == Duration::from_millis(50)));
    device.expect_type(MessageType::GetAddress).await;

    assert_lane_recovers(&transport, &mut device).await;
}

#[tokio::test]
async fn device_failure_is_the_response() {
    let (transport, mut device) = setup("failure");
    let mut events = transport.subscribe();

    let call = spawn_request(&transport, get_address("m/0"));
    device.expect_type(MessageType::GetAddress).await;
    device.reply(
        MessageType::Failure,
        &Failure::new(FailureType::PinInvalid, "Invalid PIN"),
    );

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.kind, EventKind::Failure);
    assert_eq!(response.failure_code(), Some(FailureType::PinInvalid));
    assert!(!transport.lanes().is_busy(Lane::Primary));

    let generic = events
        .wait_for(&[EventKind::Message(MessageType::Failure.id())])
        .await
        .unwrap();
    assert_eq!(generic.direction, Direction::FromDevice);
    events.wait_for(&[EventKind::Failure]).await.unwrap();
}

#[tokio::test]
async fn unknown_message_type_becomes_a_failure_response() {
    let (transport, mut device) = setup("unknown");

    let call = spawn_request(&transport, ping());
    device.expect_type(MessageType::Ping).await;
    device.reply_raw(999, b"\x01\x02");

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.kind, EventKind::Failure);
    let failure = response.failure().unwrap().unwrap();
    assert_eq!(failure.code(), FailureType::UnexpectedMessage);
    assert_eq!(failure.message(), "Unknown message type received");
}

#[tokio::test]
async fn malformed_frame_fails_only_its_call() {
    let (transport, mut device) = setup("garbage");

    let call = spawn_request(&transport, ping());
    device.expect_type(MessageType::Ping).await;
    device.reply_bytes(b"\xff\xff\x00\x01\x00\x00\x00\x00");

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        EngineError::Frame(FrameError::InvalidMagic([0xff, 0xff]))
    ));

    assert_lane_recovers(&transport, &mut device).await;
}

#[tokio::test]
async fn debug_link_runs_beside_a_pending_prompt() {
    let (device, harness) = MemoryDevice::with_debug_link("debug");
    let transport = Arc::new(Transport::new(device));
    let mut primary = DeviceSide::new(harness.primary);
    let mut debug = DeviceSide::new(harness.debug.unwrap());
    let mut events = transport.subscribe();

    let call = spawn_request(&transport, get_address("m/0"));
    primary.expect_type(MessageType::GetAddress).await;
    primary.reply(MessageType::PinMatrixRequest, &PinMatrixRequest::default());
    events.wait_for(&[EventKind::PinRequest]).await.unwrap();

    let debug_call = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            transport
                .call_debug_link(
                    Message::raw(MessageType::DebugLinkGetState.id(), Bytes::new()),
                    CallOptions::default(),
                )
                .await
        })
    };
    debug.expect_type(MessageType::DebugLinkGetState).await;
    debug.reply_raw(MessageType::DebugLinkState.id(), b"state");

    let state = debug_call.await.unwrap().unwrap().unwrap();
    assert_eq!(state.name, Some("DebugLinkState"));
    assert!(transport.is_user_action_required());

    transport.send_pin("9876").await.unwrap();
    primary.expect_type(MessageType::PinMatrixAck).await;
    primary.reply_raw(MessageType::Address.id(), b"addr");
    assert!(call.await.unwrap().is_ok());
}
