//! Session Facade
//!
//! One process-wide instance owning every cross-context resource: the
//! tracker (behind a lock), the update channel, the display-descriptor
//! registry, the latest-selections store, and the frame log. Producer
//! threads mutate through this facade; the broadcast actor consumes on
//! its own runtime thread. There are no ambient globals.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::broadcast::actor::{BroadcastActor, ConnMsg};
use crate::broadcast::queue::{self, Gate, QueuedEvent, UpdateChannel};
use crate::broadcast::server::start_listener;
use crate::error::Result;
use crate::log::SessionLog;
use crate::track::Tracker;
use crate::value::{NodeId, Raw, Scalar};

/// Buffer of the accept-thread to actor hand-off channel
const CONN_BUFFER: usize = 32;

// =============================================================================
// Configuration
// =============================================================================

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Park producers until at least one viewer is connected
    pub wait_client: bool,
    /// Capture emitted frames for later replay
    pub log_enabled: bool,
    /// Update channel capacity
    pub capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8120,
            wait_client: true,
            log_enabled: true,
            capacity: queue::DEFAULT_CAPACITY,
        }
    }
}

impl SessionConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_wait_client(mut self, wait: bool) -> Self {
        self.wait_client = wait;
        self
    }

    pub fn with_log_enabled(mut self, enabled: bool) -> Self {
        self.log_enabled = enabled;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

// =============================================================================
// Session
// =============================================================================

/// A running observation session
pub struct Session {
    tracker: Arc<Mutex<Tracker>>,
    channel: UpdateChannel,
    displays: Arc<Mutex<serde_json::Map<String, Value>>>,
    selections: Arc<Mutex<HashMap<String, Value>>>,
    frame_log: Arc<Mutex<SessionLog>>,
    conn_tx: mpsc::Sender<ConnMsg>,
    port: u16,
}

impl Session {
    /// Bind the listener and spawn the accept thread plus the broadcast
    /// actor on its own single-threaded runtime.
    pub fn start(config: SessionConfig) -> anyhow::Result<Self> {
        let gate = Arc::new(Gate::new(config.wait_client));
        let (channel, updates_rx) = queue::update_channel(config.capacity, Arc::clone(&gate));
        let (conn_tx, conn_rx) = mpsc::channel(CONN_BUFFER);

        let tracker = Arc::new(Mutex::new(Tracker::new()));
        let displays = Arc::new(Mutex::new(serde_json::Map::new()));
        let selections = Arc::new(Mutex::new(HashMap::new()));
        let frame_log = Arc::new(Mutex::new(SessionLog::new(config.log_enabled)));

        let port = start_listener(&config.host, config.port, conn_tx.clone())?;

        let actor = BroadcastActor::new(
            conn_rx,
            updates_rx,
            Arc::clone(&tracker),
            Arc::clone(&gate),
            Arc::clone(&displays),
            Arc::clone(&selections),
            Arc::clone(&frame_log),
        );
        std::thread::spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime.block_on(actor.run()),
                Err(e) => crate::log!("error"; "broadcast runtime failed: {}", e),
            }
        });

        crate::log!("server"; "session listening at ws://{}:{}/", config.host, port);
        Ok(Self {
            tracker,
            channel,
            displays,
            selections,
            frame_log,
            conn_tx,
            port,
        })
    }

    // -------------------------------------------------------------------------
    // Observation API
    // -------------------------------------------------------------------------

    /// Register `raw` as the root of `view_id` and surface its initial
    /// snapshot to viewers. With `wait_client` set this parks until the
    /// first viewer is connected.
    pub fn observe(&self, view_id: &str, raw: Raw, widget: Option<Value>) -> Result<NodeId> {
        let (root, events) = self.tracker.lock().observe(view_id, raw, widget)?;
        self.push_all(events);
        Ok(root)
    }

    pub fn set_field(&self, node: NodeId, field: &str, raw: Raw) -> Result<()> {
        let events = self.tracker.lock().set_field(node, field, raw)?;
        self.push_all(events);
        Ok(())
    }

    pub fn set_index(&self, node: NodeId, index: usize, raw: Raw) -> Result<()> {
        let events = self.tracker.lock().set_index(node, index, raw)?;
        self.push_all(events);
        Ok(())
    }

    pub fn set_key(&self, node: NodeId, key: Raw, raw: Raw) -> Result<()> {
        let events = self.tracker.lock().set_key(node, key, raw)?;
        self.push_all(events);
        Ok(())
    }

    pub fn list_append(&self, node: NodeId, raw: Raw) -> Result<()> {
        let events = self.tracker.lock().list_append(node, raw)?;
        self.push_all(events);
        Ok(())
    }

    /// Request an out-of-band re-snapshot of every view to every viewer.
    /// Goes through even while paused.
    pub fn request_resnapshot(&self) {
        self.channel.push_control(QueuedEvent::Resnapshot);
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn scalar(&self, node: NodeId) -> Option<Scalar> {
        self.tracker.lock().scalar(node).cloned()
    }

    pub fn field(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.tracker.lock().field(node, name)
    }

    pub fn index(&self, node: NodeId, i: usize) -> Option<NodeId> {
        self.tracker.lock().index(node, i)
    }

    /// Latest selection state reported by viewers, per selection group
    pub fn selections(&self) -> HashMap<String, Value> {
        self.selections.lock().clone()
    }

    pub fn paused(&self) -> bool {
        self.channel.gate().is_paused()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    // -------------------------------------------------------------------------
    // Display Registry
    // -------------------------------------------------------------------------

    /// Register the default display descriptor for a record type name.
    /// Forwarded verbatim to every new connection as `displayConfig`.
    pub fn display_as(&self, type_name: &str, descriptor: Value) {
        self.displays
            .lock()
            .insert(type_name.to_string(), descriptor);
    }

    // -------------------------------------------------------------------------
    // Capture
    // -------------------------------------------------------------------------

    /// Flush all frames emitted so far to a replayable log file
    pub fn write_log(&self, path: &Path) -> Result<()> {
        self.frame_log.lock().write_to(path)
    }

    /// Close every connection and stop the broadcast loop
    pub fn shutdown(&self) {
        let _ = self.conn_tx.try_send(ConnMsg::Shutdown);
    }

    fn push_all(&self, events: Vec<QueuedEvent>) {
        for event in events {
            self.channel.push(event);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = SessionConfig::default()
            .with_host("0.0.0.0")
            .with_port(9000)
            .with_wait_client(false)
            .with_log_enabled(false)
            .with_capacity(16);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert!(!config.wait_client);
        assert!(!config.log_enabled);
        assert_eq!(config.capacity, 16);
    }
}
