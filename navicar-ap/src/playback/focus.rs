//! Audio focus
//!
//! Only one player may render audio at a time. Players ask an `AudioFocus`
//! policy for exclusive focus before playing and are told through a channel
//! when they lose it (another holder, an interruption) or regain it.
//!
//! `FocusArbiter` is the in-process policy: a single exclusive slot with
//! optional system interruptions (navigation prompts, calls) that can be
//! transient, duckable or blocking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Focus change delivered to a holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusChange {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

/// Outcome of a focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequestResult {
    Granted,
    Denied,
}

impl FocusRequestResult {
    pub fn is_granted(self) -> bool {
        self == FocusRequestResult::Granted
    }
}

/// Exclusive audio focus policy, as seen by one player
pub trait AudioFocus: Send + Sync {
    fn request(&self) -> FocusRequestResult;
    fn abandon(&self);
}

/// Kind of system interruption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interruption {
    /// Short interruption; holder pauses and resumes afterwards
    Transient,
    /// Short interruption the holder may play under at lower volume
    Duck,
    /// Exclusive system use; requests are denied until it ends
    Exclusive,
}

#[derive(Default)]
struct ArbiterInner {
    next_id: u64,
    holder: Option<u64>,
    clients: HashMap<u64, (String, mpsc::UnboundedSender<FocusChange>)>,
    interruption: Option<Interruption>,
}

impl ArbiterInner {
    fn notify(&self, id: u64, change: FocusChange) {
        if let Some((name, tx)) = self.clients.get(&id) {
            debug!("Focus {:?} -> {}", change, name);
            if tx.send(change).is_err() {
                warn!("Focus client {} is gone", name);
            }
        }
    }
}

/// In-process exclusive focus policy
#[derive(Clone, Default)]
pub struct FocusArbiter {
    inner: Arc<Mutex<ArbiterInner>>,
}

impl FocusArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a focus client
    ///
    /// Returns its handle and the channel its focus changes arrive on.
    pub fn register(&self, name: impl Into<String>) -> (FocusHandle, mpsc::UnboundedReceiver<FocusChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.clients.insert(id, (name.into(), tx));
        (
            FocusHandle {
                id,
                arbiter: self.clone(),
            },
            rx,
        )
    }

    /// Start a system interruption; the current holder is notified
    pub fn interrupt(&self, kind: Interruption) {
        let mut inner = self.lock();
        inner.interruption = Some(kind);
        info!("Audio focus interrupted ({:?})", kind);

        let Some(holder) = inner.holder else {
            return;
        };
        match kind {
            Interruption::Transient => inner.notify(holder, FocusChange::LossTransient),
            Interruption::Duck => inner.notify(holder, FocusChange::LossTransientCanDuck),
            Interruption::Exclusive => {
                inner.holder = None;
                inner.notify(holder, FocusChange::Loss);
            }
        }
    }

    /// End the interruption; a transiently interrupted holder regains focus
    pub fn end_interruption(&self) {
        let mut inner = self.lock();
        let Some(kind) = inner.interruption.take() else {
            return;
        };
        info!("Audio focus interruption ended");
        if kind != Interruption::Exclusive {
            if let Some(holder) = inner.holder {
                inner.notify(holder, FocusChange::Gain);
            }
        }
    }

    /// Whether the client with `id` currently holds focus
    pub fn is_holder(&self, handle: &FocusHandle) -> bool {
        self.lock().holder == Some(handle.id)
    }

    fn request(&self, id: u64) -> FocusRequestResult {
        let mut inner = self.lock();
        if inner.interruption == Some(Interruption::Exclusive) {
            return FocusRequestResult::Denied;
        }
        if let Some(previous) = inner.holder.filter(|h| *h != id) {
            inner.notify(previous, FocusChange::Loss);
        }
        inner.holder = Some(id);
        FocusRequestResult::Granted
    }

    fn abandon(&self, id: u64) {
        let mut inner = self.lock();
        if inner.holder == Some(id) {
            inner.holder = None;
        }
    }

    fn unregister(&self, id: u64) {
        let mut inner = self.lock();
        inner.clients.remove(&id);
        if inner.holder == Some(id) {
            inner.holder = None;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ArbiterInner> {
        // A panic while holding the lock leaves plain data behind
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One registered focus client
pub struct FocusHandle {
    id: u64,
    arbiter: FocusArbiter,
}

impl AudioFocus for FocusHandle {
    fn request(&self) -> FocusRequestResult {
        self.arbiter.request(self.id)
    }

    fn abandon(&self) {
        self.arbiter.abandon(self.id)
    }
}

impl Drop for FocusHandle {
    fn drop(&mut self) {
        self.arbiter.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_request_takes_focus_from_first() {
        let arbiter = FocusArbiter::new();
        let (a, mut a_rx) = arbiter.register("a");
        let (b, _b_rx) = arbiter.register("b");

        assert!(a.request().is_granted());
        assert!(b.request().is_granted());
        assert_eq!(a_rx.try_recv().unwrap(), FocusChange::Loss);
        assert!(arbiter.is_holder(&b));
        assert!(!arbiter.is_holder(&a));
    }

    #[test]
    fn test_rerequest_by_holder_is_silent() {
        let arbiter = FocusArbiter::new();
        let (a, mut a_rx) = arbiter.register("a");
        a.request();
        a.request();
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn test_transient_interruption_round_trip() {
        let arbiter = FocusArbiter::new();
        let (a, mut rx) = arbiter.register("a");
        a.request();

        arbiter.interrupt(Interruption::Transient);
        assert_eq!(rx.try_recv().unwrap(), FocusChange::LossTransient);
        arbiter.end_interruption();
        assert_eq!(rx.try_recv().unwrap(), FocusChange::Gain);
    }

    #[test]
    fn test_exclusive_interruption_denies_requests() {
        let arbiter = FocusArbiter::new();
        let (a, mut rx) = arbiter.register("a");
        a.request();

        arbiter.interrupt(Interruption::Exclusive);
        assert_eq!(rx.try_recv().unwrap(), FocusChange::Loss);
        assert_eq!(a.request(), FocusRequestResult::Denied);

        arbiter.end_interruption();
        assert!(rx.try_recv().is_err());
        assert!(a.request().is_granted());
    }

    #[test]
    fn test_drop_releases_focus() {
        let arbiter = FocusArbiter::new();
        let (a, _rx) = arbiter.register("a");
        a.request();
        drop(a);

        let (b, _b_rx) = arbiter.register("b");
        b.request();
        assert!(arbiter.is_holder(&b));
    }
}
