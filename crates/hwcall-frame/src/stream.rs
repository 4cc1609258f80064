use std::io::ErrorKind;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hwcall_transport::{RawChannel, TransportError};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::trace;

use crate::async_codec::WireCodec;
use crate::codec::FrameConfig;
use crate::error::FrameError;

/// A [`RawChannel`] over any byte stream (emulator sockets, pipes).
///
/// Handles partial reads internally; `read` always yields complete frames.
pub struct StreamChannel<S> {
    reader: Mutex<FramedRead<ReadHalf<S>, WireCodec>>,
    writer: Mutex<FramedWrite<WriteHalf<S>, WireCodec>>,
}

impl<S> StreamChannel<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Create a stream channel with default configuration.
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    /// Create a stream channel with explicit configuration.
    pub fn with_config(stream: S, config: FrameConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(FramedRead::new(read_half, WireCodec::new(config.clone()))),
            writer: Mutex::new(FramedWrite::new(write_half, WireCodec::new(config))),
        }
    }
}

#[async_trait]
impl<S> RawChannel for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write(&self, frame: Bytes) -> hwcall_transport::Result<()> {
        trace!(len = frame.len(), "stream write");
        let mut writer = self.writer.lock().await;
        writer.send(frame).await.map_err(frame_to_transport_error)
    }

    async fn read(&self) -> hwcall_transport::Result<Option<Bytes>> {
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(Ok(frame)) => {
                trace!(len = frame.len(), "stream read");
                Ok(Some(frame))
            }
            Some(Err(err)) => Err(frame_to_transport_error(err)),
            None => Err(TransportError::Closed),
        }
    }
}

fn frame_to_transport_error(err: FrameError) -> TransportError {
    match err {
        FrameError::Io(io) => TransportError::Io(io),
        FrameError::ConnectionClosed => TransportError::Closed,
        other => TransportError::Io(std::io::Error::new(ErrorKind::InvalidData, other.to_string())),
    }
}
