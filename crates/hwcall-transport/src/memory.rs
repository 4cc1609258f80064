//! In-memory backend.
//!
//! [`MemoryDevice`] is the host side and implements [`Device`]. [`DeviceHarness`]
//! is the device side: it sees every frame the host writes and injects the
//! frames the host reads. Used by tests and by simulated devices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{Device, Lane, RawChannel};

/// Host side of one in-memory lane.
#[derive(Debug)]
pub struct MemoryChannel {
    lane: Lane,
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    open: Arc<AtomicBool>,
}

/// Device side of one in-memory lane.
#[derive(Debug)]
pub struct HarnessLane {
    from_host: mpsc::UnboundedReceiver<Bytes>,
    to_host: mpsc::UnboundedSender<Bytes>,
}

impl HarnessLane {
    /// Next frame written by the host, or `None` once the host side is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.from_host.recv().await
    }

    /// Next frame written by the host, if one is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.from_host.try_recv().ok()
    }

    /// Queue a frame for the host to read.
    pub fn send(&self, frame: impl Into<Bytes>) -> Result<()> {
        self.to_host
            .send(frame.into())
            .map_err(|_| TransportError::Closed)
    }
}

fn lane_pair(lane: Lane, open: Arc<AtomicBool>) -> (MemoryChannel, HarnessLane) {
    let (host_tx, device_rx) = mpsc::unbounded_channel();
    let (device_tx, host_rx) = mpsc::unbounded_channel();
    (
        MemoryChannel {
            lane,
            outbound: host_tx,
            inbound: Mutex::new(host_rx),
            open,
        },
        HarnessLane {
            from_host: device_rx,
            to_host: device_tx,
        },
    )
}

#[async_trait]
impl RawChannel for MemoryChannel {
    async fn write(&self, frame: Bytes) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected(self.lane.to_string()));
        }
        trace!(lane = %self.lane, len = frame.len(), "memory write");
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    async fn read(&self) -> Result<Option<Bytes>> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(frame) => {
                trace!(lane = %self.lane, len = frame.len(), "memory read");
                Ok(Some(frame))
            }
            None => Err(TransportError::Closed),
        }
    }
}

/// An in-memory device with a primary lane and an optional debug lane.
#[derive(Debug)]
pub struct MemoryDevice {
    id: String,
    primary: MemoryChannel,
    debug: Option<MemoryChannel>,
    open: Arc<AtomicBool>,
}

/// Device-side handles for a [`MemoryDevice`].
#[derive(Debug)]
pub struct DeviceHarness {
    pub primary: HarnessLane,
    pub debug: Option<HarnessLane>,
}

impl MemoryDevice {
    /// Create a device without a debug link.
    pub fn new(id: impl Into<String>) -> (Self, DeviceHarness) {
        Self::build(id.into(), false)
    }

    /// Create a device that also exposes a debug link lane.
    pub fn with_debug_link(id: impl Into<String>) -> (Self, DeviceHarness) {
        Self::build(id.into(), true)
    }

    /// Reopen the lanes after [`Device::disconnect`], as if replugged.
    /// Frames already queued on either side are kept.
    pub fn reconnect(&self) {
        debug!(device = %self.id, "memory device reconnected");
        self.open.store(true, Ordering::SeqCst);
    }

    fn build(id: String, debug_link: bool) -> (Self, DeviceHarness) {
        let open = Arc::new(AtomicBool::new(true));
        let (primary, primary_harness) = lane_pair(Lane::Primary, Arc::clone(&open));
        let (debug, debug_harness) = if debug_link {
            let (channel, harness) = lane_pair(Lane::Debug, Arc::clone(&open));
            (Some(channel), Some(harness))
        } else {
            (None, None)
        };

        (
            Self {
                id,
                primary,
                debug,
                open,
            },
            DeviceHarness {
                primary: primary_harness,
                debug: debug_harness,
            },
        )
    }
}

#[async_trait]
impl Device for MemoryDevice {
    type Channel = MemoryChannel;

    fn channel(&self, lane: Lane) -> Option<&MemoryChannel> {
        match lane {
            Lane::Primary => Some(&self.primary),
            Lane::Debug => self.debug.as_ref(),
        }
    }

    fn device_id(&self) -> String {
        self.id.clone()
    }

    fn vendor(&self) -> String {
        "memory".to_string()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        debug!(device = %self.id, "memory device disconnected");
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}
