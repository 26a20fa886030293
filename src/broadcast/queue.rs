//! Update Channel
//!
//! Bounded FIFO queue connecting synchronous mutation interception
//! (producer threads) to the broadcast actor (consumer). This is the only
//! shared state crossing that boundary.
//!
//! Flow control: `push` parks while the session is paused, then while no
//! viewer is connected (when the session is configured to wait for one),
//! then performs a blocking send - a full queue back-pressures the
//! producer instead of growing memory or dropping events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, TrySendError};
use serde_json::Value;

use crate::broadcast::message::UpdateMsg;
use crate::serialize::WireNode;

/// Default queue capacity
pub const DEFAULT_CAPACITY: usize = 1000;

/// Poll interval for the pause / wait-for-client gates
const GATE_POLL: Duration = Duration::from_millis(50);

// =============================================================================
// Queued Events
// =============================================================================

/// Events travelling from the tracker to the broadcast actor
#[derive(Debug, Clone)]
pub enum QueuedEvent {
    /// Initial full snapshot of a freshly observed view
    Snapshot {
        view_id: String,
        structure: WireNode,
        widget: Option<Value>,
    },
    /// Incremental diff (`setValue` / `listAppend`)
    Update(UpdateMsg),
    /// Out-of-band request to re-snapshot every view to every connection
    Resnapshot,
}

// =============================================================================
// Gate
// =============================================================================

/// Flow-control state shared between producers and the actor
#[derive(Debug)]
pub struct Gate {
    paused: AtomicBool,
    clients: AtomicUsize,
    /// Whether producers park until at least one viewer is connected
    wait_client: bool,
}

impl Gate {
    pub fn new(wait_client: bool) -> Self {
        Self {
            paused: AtomicBool::new(false),
            clients: AtomicUsize::new(0),
            wait_client,
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn client_connected(&self) {
        self.clients.fetch_add(1, Ordering::SeqCst);
    }

    pub fn client_disconnected(&self) {
        self.clients.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// True while a producer must park before enqueueing
    fn is_closed(&self) -> bool {
        self.is_paused() || (self.wait_client && self.client_count() == 0)
    }
}

// =============================================================================
// Channel
// =============================================================================

/// Producer handle of the update channel (cheap to clone)
#[derive(Clone)]
pub struct UpdateChannel {
    tx: Sender<QueuedEvent>,
    gate: Arc<Gate>,
}

impl UpdateChannel {
    /// Enqueue one event, honoring the pause and wait-for-client gates.
    ///
    /// Blocks the calling producer thread; mutation-heavy code is
    /// throttled to consumer availability.
    pub fn push(&self, event: QueuedEvent) {
        while self.gate.is_closed() {
            std::thread::sleep(GATE_POLL);
        }
        // A receiver only drops on shutdown; losing tail events then is fine
        let _ = self.tx.send(event);
    }

    /// Enqueue without parking on the gates (used for control events that
    /// must go through even while paused)
    pub fn push_control(&self, event: QueuedEvent) {
        if let Err(TrySendError::Full(event)) = self.tx.try_send(event) {
            let _ = self.tx.send(event);
        }
    }

    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }
}

/// Create the bounded channel pair
pub fn update_channel(capacity: usize, gate: Arc<Gate>) -> (UpdateChannel, Receiver<QueuedEvent>) {
    let (tx, rx) = crossbeam::channel::bounded(capacity);
    (UpdateChannel { tx, gate }, rx)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn open_gate() -> Arc<Gate> {
        // No wait-for-client so tests can push immediately
        Arc::new(Gate::new(false))
    }

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = update_channel(10, open_gate());
        for i in 0..5 {
            tx.push(QueuedEvent::Update(UpdateMsg::SetValue {
                view_id: "v".into(),
                path: format!("data.{i}"),
                value: WireNode::Null {
                    struct_id: format!("data.{i}"),
                },
                previous_value: None,
            }));
        }
        for i in 0..5 {
            match rx.try_recv().unwrap() {
                QueuedEvent::Update(u) => assert_eq!(u.path(), format!("data.{i}")),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn test_pause_gate_blocks_producer() {
        let gate = open_gate();
        gate.set_paused(true);
        let (tx, rx) = update_channel(10, gate.clone());

        let handle = std::thread::spawn(move || {
            tx.push(QueuedEvent::Resnapshot);
        });

        // Producer is parked while paused
        std::thread::sleep(Duration::from_millis(120));
        assert!(rx.try_recv().is_err());

        gate.set_paused(false);
        handle.join().unwrap();
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            QueuedEvent::Resnapshot
        ));
    }

    #[test]
    fn test_wait_for_client_gate() {
        let gate = Arc::new(Gate::new(true));
        let (tx, rx) = update_channel(10, gate.clone());

        let handle = std::thread::spawn(move || {
            tx.push(QueuedEvent::Resnapshot);
        });

        std::thread::sleep(Duration::from_millis(120));
        assert!(rx.try_recv().is_err());

        gate.client_connected();
        handle.join().unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_control_push_bypasses_pause() {
        let gate = open_gate();
        gate.set_paused(true);
        let (tx, rx) = update_channel(10, gate);

        tx.push_control(QueuedEvent::Resnapshot);
        assert!(matches!(rx.try_recv().unwrap(), QueuedEvent::Resnapshot));
    }
}
