//! Broadcast Actor
//!
//! Owns all viewer connections and multiplexes them on one cooperative
//! loop: accepting handed-off streams, replaying full state to late
//! joiners, reading inbound control messages, and fanning queued diff
//! batches out to every active connection.
//!
//! # Architecture
//!
//! ```text
//! Tracker --[UpdateChannel]--> BroadcastActor --[batched frames]--> viewers
//!                                    ^                                 |
//!                                    +------[pause / selections]-------+
//! ```
//!
//! Delivery is strictly best-effort: a failed send removes that one
//! connection and nothing else. Diffs missed while disconnected are not
//! replayed; a reconnecting viewer gets a fresh snapshot instead.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use crate::broadcast::message::{ClientMessage, ServerMessage, UpdateMsg, pause_ack};
use crate::broadcast::queue::{Gate, QueuedEvent};
use crate::log::SessionLog;
use crate::track::Tracker;

/// Maximum queued events drained per tick
const BATCH_SIZE: usize = 200;

/// Idle loop interval
const TICK: Duration = Duration::from_millis(50);

/// Messages to the broadcast actor
pub enum ConnMsg {
    /// Freshly accepted viewer stream (handshake pending)
    Accept(TcpStream),
    /// Close all connections and stop the loop
    Shutdown,
}

/// Broadcast actor - manages viewer connections and fan-out
pub struct BroadcastActor {
    /// Connection hand-off from the accept thread
    rx: mpsc::Receiver<ConnMsg>,
    /// Diff/snapshot events from producer threads
    updates: crossbeam::channel::Receiver<QueuedEvent>,
    /// Active connections, owned by the loop alone
    clients: Vec<WebSocket<TcpStream>>,
    /// Live state, locked only for snapshot serialization
    tracker: Arc<Mutex<Tracker>>,
    /// Pause flag + connected-viewer count gating the producers
    gate: Arc<Gate>,
    /// Display descriptors keyed by record type name
    displays: Arc<Mutex<serde_json::Map<String, Value>>>,
    /// Latest selection state per group, readable by application code
    selections: Arc<Mutex<HashMap<String, Value>>>,
    /// Captured frames for later replay
    frame_log: Arc<Mutex<SessionLog>>,
}

impl BroadcastActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rx: mpsc::Receiver<ConnMsg>,
        updates: crossbeam::channel::Receiver<QueuedEvent>,
        tracker: Arc<Mutex<Tracker>>,
        gate: Arc<Gate>,
        displays: Arc<Mutex<serde_json::Map<String, Value>>>,
        selections: Arc<Mutex<HashMap<String, Value>>>,
        frame_log: Arc<Mutex<SessionLog>>,
    ) -> Self {
        Self {
            rx,
            updates,
            clients: Vec::new(),
            tracker,
            gate,
            displays,
            selections,
            frame_log,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        loop {
            let mut busy = false;

            loop {
                match self.rx.try_recv() {
                    Ok(ConnMsg::Accept(stream)) => {
                        self.add_client(stream);
                        busy = true;
                    }
                    Ok(ConnMsg::Shutdown) | Err(mpsc::error::TryRecvError::Disconnected) => {
                        self.shutdown();
                        return;
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                }
            }

            busy |= self.poll_clients();
            busy |= self.drain_updates();

            if !busy {
                tokio::time::sleep(TICK).await;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Connection Lifecycle
    // -------------------------------------------------------------------------

    /// Handshake a new viewer and bring it up to date: protocol `init`,
    /// display descriptors, then a snapshot of every registered view built
    /// directly against live state (the queue is bypassed).
    fn add_client(&mut self, stream: TcpStream) {
        let mut ws = match tungstenite::accept(stream) {
            Ok(ws) => ws,
            Err(e) => {
                crate::log!("ws"; "handshake failed: {}", e);
                return;
            }
        };

        if let Err(e) = ws.send(Message::Text(ServerMessage::init().to_json().into())) {
            crate::log!("ws"; "failed to send init: {}", e);
            return;
        }

        let displays = self.displays.lock().clone();
        if !displays.is_empty() {
            let msg = ServerMessage::DisplayConfig(displays);
            if let Err(e) = ws.send(Message::Text(msg.to_json().into())) {
                crate::log!("ws"; "failed to send display config: {}", e);
                return;
            }
        }

        for snapshot in self.tracker.lock().snapshots() {
            if let Err(e) = ws.send(Message::Text(snapshot.to_json().into())) {
                crate::log!("ws"; "failed to send snapshot: {}", e);
                return;
            }
        }

        // Switch to non-blocking for the polling reads of the main loop
        let _ = ws.get_ref().set_nonblocking(true);

        self.clients.push(ws);
        self.gate.client_connected();
        crate::debug!("ws"; "viewer active (total: {})", self.clients.len());
    }

    fn shutdown(&mut self) {
        crate::debug!("ws"; "shutting down");
        for mut ws in self.clients.drain(..) {
            let _ = ws.close(None);
            self.gate.client_disconnected();
        }
    }

    // -------------------------------------------------------------------------
    // Inbound Control
    // -------------------------------------------------------------------------

    /// Non-blocking read pass over every connection. Returns true if any
    /// message was handled.
    fn poll_clients(&mut self) -> bool {
        let mut busy = false;
        let mut disconnected = Vec::new();
        let mut acks = Vec::new();

        for (i, ws) in self.clients.iter_mut().enumerate() {
            match ws.read() {
                Ok(Message::Text(text)) => {
                    busy = true;
                    match ClientMessage::from_json(&text) {
                        Ok(ClientMessage::Pause { data, request_id }) => {
                            crate::debug!("ws"; "pause = {}", data);
                            self.gate.set_paused(data);
                            acks.push(pause_ack(&request_id, data));
                        }
                        Ok(ClientMessage::UpdateSelections { data }) => {
                            self.selections.lock().extend(data.selections);
                        }
                        Ok(ClientMessage::ReplayRunning { .. }) => {
                            crate::debug!("ws"; "replay-running ignored on live session");
                        }
                        Err(e) => {
                            // Protocol error: drop only this connection
                            crate::log!("ws"; "bad client message ({}), closing", e);
                            disconnected.push(i);
                        }
                    }
                }
                Ok(Message::Close(_)) => disconnected.push(i),
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => disconnected.push(i),
            }
        }

        for i in disconnected.into_iter().rev() {
            let _ = self.clients[i].close(None);
            self.clients.remove(i);
            self.gate.client_disconnected();
            crate::debug!("ws"; "viewer disconnected (total: {})", self.clients.len());
        }

        for ack in acks {
            self.broadcast_frame(&ack);
        }
        busy
    }

    // -------------------------------------------------------------------------
    // Fan-out
    // -------------------------------------------------------------------------

    /// Drain up to one batch of queued events and fan them out.
    ///
    /// Snapshot events are sent as standalone frames; diffs accumulate into
    /// one JSON-array frame. A re-snapshot request short-circuits the batch:
    /// already-drained diffs are flushed first, then every view is freshly
    /// serialized to every connection.
    fn drain_updates(&mut self) -> bool {
        let mut batch: Vec<UpdateMsg> = Vec::new();
        let mut standalone: Vec<String> = Vec::new();
        let mut resnapshot = false;

        for _ in 0..BATCH_SIZE {
            match self.updates.try_recv() {
                Ok(QueuedEvent::Update(update)) => batch.push(update),
                Ok(QueuedEvent::Snapshot {
                    view_id,
                    structure,
                    widget,
                }) => standalone.push(
                    ServerMessage::Snapshot {
                        view_id,
                        structure,
                        widget,
                    }
                    .to_json(),
                ),
                Ok(QueuedEvent::Resnapshot) => {
                    resnapshot = true;
                    break;
                }
                Err(_) => break,
            }
        }

        let busy = !batch.is_empty() || !standalone.is_empty() || resnapshot;

        for frame in standalone {
            self.broadcast_frame(&frame);
        }
        if !batch.is_empty() {
            let frame = UpdateMsg::batch_to_json(&batch);
            self.broadcast_frame(&frame);
        }
        if resnapshot {
            let frames: Vec<String> =
                self.tracker.lock().snapshots().iter().map(ServerMessage::to_json).collect();
            for frame in frames {
                self.broadcast_frame(&frame);
            }
        }
        busy
    }

    /// Send one frame to every active connection, dropping only the
    /// connections whose send failed, and record it in the session log.
    fn broadcast_frame(&mut self, frame: &str) {
        self.frame_log.lock().append(frame.as_bytes());

        let gate = &self.gate;
        self.clients.retain_mut(|ws| {
            match ws.send(Message::Text(frame.to_string().into())) {
                Ok(()) => true,
                Err(e) => {
                    crate::debug!("ws"; "viewer dropped: {}", e);
                    gate.client_disconnected();
                    false
                }
            }
        });
    }
}
