//! Per-lane call serialization.
//!
//! Each lane holds at most one handle: the settlement signal of the most
//! recently submitted call. A new call swaps its own handle in and then
//! waits for the one it replaced, so calls run strictly in submission
//! order. Registration never blocks; only the actions serialize.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hwcall_transport::Lane;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Done,
    Cancelled,
}

type Handle = watch::Receiver<Option<Settlement>>;

/// Serialization state for the primary and debug lanes.
#[derive(Debug, Default)]
pub struct Lanes {
    primary: Mutex<Option<Handle>>,
    debug: Mutex<Option<Handle>>,
}

impl Lanes {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, lane: Lane) -> MutexGuard<'_, Option<Handle>> {
        let slot = match lane {
            Lane::Primary => &self.primary,
            Lane::Debug => &self.debug,
        };
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the lane holds no handle at all.
    pub fn is_empty(&self, lane: Lane) -> bool {
        self.slot(lane).is_none()
    }

    /// Whether the lane's latest call has not settled yet.
    pub fn is_busy(&self, lane: Lane) -> bool {
        self.slot(lane)
            .as_ref()
            .is_some_and(|handle| handle.borrow().is_none())
    }

    /// Forget both lanes' handles. Calls already waiting keep their own
    /// predecessors; new calls start fresh.
    pub fn reset(&self) {
        for lane in Lane::ALL {
            self.slot(lane).take();
        }
        debug!("call lanes reset");
    }

    /// Run `action` after every call previously submitted on `lane`.
    ///
    /// If the predecessor was cancelled, both lanes are reset and this call
    /// fails with [`EngineError::ActionCancelled`] without running. Any other
    /// predecessor outcome is ignored. Dropping the returned future settles
    /// this call's handle, so the lane never stays occupied.
    pub async fn submit<T, F>(&self, lane: Lane, action: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let (settle, handle) = watch::channel(None);
        let previous = self.slot(lane).replace(handle);

        if let Some(previous) = previous {
            if settled(previous).await == Settlement::Cancelled {
                debug!(%lane, "predecessor cancelled, dropping queued call");
                self.reset();
                let _ = settle.send(Some(Settlement::Cancelled));
                return Err(EngineError::ActionCancelled);
            }
        }

        let result = action.await;
        let outcome = match &result {
            Err(EngineError::ActionCancelled) => Settlement::Cancelled,
            _ => Settlement::Done,
        };
        let _ = settle.send(Some(outcome));
        result
    }
}

async fn settled(mut handle: Handle) -> Settlement {
    match handle.wait_for(Option::is_some).await {
        Ok(state) => (*state).unwrap_or(Settlement::Done),
        // sender dropped before settling
        Err(_) => Settlement::Done,
    }
}
