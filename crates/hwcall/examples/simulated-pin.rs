//! Drive a PIN-protected call against a simulated device.
//!
//! The device task asks for a button press and a PIN before answering
//! `GetAddress`; the application answers the PIN prompt from its event loop.
//!
//! Run with:
//!   cargo run -p hwcall --example simulated-pin --features logging

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use hwcall::engine::message::{ButtonRequest, PinMatrixAck, PinMatrixRequest};
use hwcall::frame::{decode_frame, encode_frame, FrameConfig};
use hwcall::logging::{init_logging, LogFormat, LogLevel};
use hwcall::transport::{HarnessLane, MemoryDevice};
use hwcall::{EventKind, Message, MessageType, Transport};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn send(lane: &HarnessLane, message: Message) -> Result<(), BoxError> {
    let mut buf = BytesMut::new();
    encode_frame(message.type_id, &message.payload, &mut buf)?;
    lane.send(buf.freeze())?;
    Ok(())
}

async fn recv(lane: &mut HarnessLane) -> Result<Message, BoxError> {
    let raw = lane.recv().await.ok_or("host went away")?;
    Ok(decode_frame(&raw, &FrameConfig::default())?.into())
}

async fn simulate_device(mut lane: HarnessLane) -> Result<(), BoxError> {
    let request = recv(&mut lane).await?;
    eprintln!("device: got type {}", request.type_id);

    send(&lane, Message::new(MessageType::ButtonRequest, &ButtonRequest::default()))?;
    recv(&mut lane).await?;
    eprintln!("device: button confirmed");

    send(&lane, Message::new(MessageType::PinMatrixRequest, &PinMatrixRequest::default()))?;
    let ack: PinMatrixAck = recv(&mut lane).await?.decode()?;
    eprintln!("device: pin entered ({} digits)", ack.pin.len());

    send(
        &lane,
        Message::raw(
            MessageType::Address.id(),
            Bytes::from_static(b"1BoatSLRHtKNngkdXEeobR76b53LETtpyT"),
        ),
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let level = std::env::var("HWCALL_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(LogLevel::Debug);
    init_logging(LogFormat::Text, level);

    let (device, harness) = MemoryDevice::new("simulated");
    let transport = Arc::new(Transport::new(device));
    let device_task = tokio::spawn(simulate_device(harness.primary));

    let mut events = transport.subscribe();
    let ui = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event.kind == EventKind::PinRequest {
                    eprintln!("app: device wants a PIN");
                    if let Err(err) = transport.send_pin("1234").await {
                        eprintln!("app: failed to send PIN: {err}");
                    }
                }
            }
        })
    };

    let response = transport
        .request(Message::raw(
            MessageType::GetAddress.id(),
            Bytes::from_static(b"m/44'/0'/0'/0/0"),
        ))
        .await?;
    let address = response.message.map(|m| m.payload).unwrap_or_default();
    println!("address: {}", String::from_utf8_lossy(&address));

    if let Err(err) = device_task.await? {
        eprintln!("device error: {err}");
    }
    ui.abort();
    Ok(())
}
