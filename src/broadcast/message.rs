//! Wire Protocol Messages
//!
//! Defines the JSON message format for WebSocket communication between
//! the broadcast server and viewer clients.
//!
//! # Message Types
//!
//! - `init`: protocol handshake (server version)
//! - `snapshot`: full serialized state of one view
//! - `setValue`/`listAppend`: incremental diffs, batched as a JSON array
//! - `displayConfig`: process-wide display descriptors keyed by type name
//! - `pause`/`update_selections`/`replay-running`: inbound control

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::serialize::WireNode;

/// Protocol version sent in the `init` handshake
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Server -> Client
// =============================================================================

/// Standalone server-to-client messages (diffs travel as [`UpdateMsg`]
/// batches instead)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Protocol handshake, first message on every connection
    #[serde(rename = "init")]
    Init {
        version: String,
        /// `"replay"` when served from a captured log, absent live
        #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
        kind: Option<String>,
    },

    /// Full serialized state of one view plus its opaque display descriptor
    #[serde(rename = "snapshot")]
    Snapshot {
        view_id: String,
        structure: WireNode,
        widget: Option<Value>,
    },

    /// Display descriptors for record types, keyed by type name
    #[serde(rename = "displayConfig")]
    DisplayConfig(serde_json::Map<String, Value>),
}

impl ServerMessage {
    /// Handshake message for the live server
    pub fn init() -> Self {
        Self::Init {
            version: PROTOCOL_VERSION.to_string(),
            kind: None,
        }
    }

    /// Handshake message for the replay server
    pub fn init_replay() -> Self {
        Self::Init {
            version: PROTOCOL_VERSION.to_string(),
            kind: Some("replay".to_string()),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"init","data":{}}"#.to_string())
    }
}

/// One incremental update describing a changed location within one view.
///
/// Batches of these are sent as a single JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UpdateMsg {
    /// A value was written at `path`; viewers must treat repeated delivery
    /// as an idempotent replay of the same logical write
    #[serde(rename = "setValue")]
    SetValue {
        view_id: String,
        path: String,
        value: WireNode,
        #[serde(
            rename = "previousValue",
            skip_serializing_if = "Option::is_none",
            default
        )]
        previous_value: Option<WireNode>,
    },

    /// A value was appended to the list at `path`
    #[serde(rename = "listAppend")]
    ListAppend {
        view_id: String,
        path: String,
        value: WireNode,
    },
}

impl UpdateMsg {
    pub fn path(&self) -> &str {
        match self {
            UpdateMsg::SetValue { path, .. } | UpdateMsg::ListAppend { path, .. } => path,
        }
    }

    /// Serialize a batch as one JSON array frame
    pub fn batch_to_json(batch: &[UpdateMsg]) -> String {
        serde_json::to_string(batch).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Acknowledgement for a `pause` request: `{type: <request_id>, data: state}`.
///
/// The tag is the client-chosen request id, so this one frame is built
/// dynamically instead of through a tagged enum.
pub fn pause_ack(request_id: &str, paused: bool) -> String {
    serde_json::json!({ "type": request_id, "data": paused }).to_string()
}

// =============================================================================
// Client -> Server
// =============================================================================

/// Per-connection selection state, opaque to the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionUpdate {
    pub selections: HashMap<String, Value>,
}

/// Inbound control messages.
///
/// An unrecognized `type` fails deserialization; the actor treats that as
/// a protocol error and closes the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Toggle the global pause gate; echoed back under `request_id`
    #[serde(rename = "pause")]
    Pause { data: bool, request_id: String },

    /// Selection state forwarded to application code, not interpreted
    #[serde(rename = "update_selections")]
    UpdateSelections { data: SelectionUpdate },

    /// Replay-only: pause/resume frame advancement
    #[serde(rename = "replay-running")]
    ReplayRunning { data: bool },
}

impl ClientMessage {
    /// Parse from JSON string
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_shape() {
        let json = ServerMessage::init().to_json();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "init");
        assert_eq!(v["data"]["version"], PROTOCOL_VERSION);
        assert!(v["data"].get("type").is_none());

        let v: Value = serde_json::from_str(&ServerMessage::init_replay().to_json()).unwrap();
        assert_eq!(v["data"]["type"], "replay");
    }

    #[test]
    fn test_snapshot_carries_null_widget() {
        let msg = ServerMessage::Snapshot {
            view_id: "view1".into(),
            structure: WireNode::Null {
                struct_id: String::new(),
            },
            widget: None,
        };
        let v: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(v["type"], "snapshot");
        assert_eq!(v["data"]["view_id"], "view1");
        assert!(v["data"]["widget"].is_null());
    }

    #[test]
    fn test_update_batch_shape() {
        let batch = vec![UpdateMsg::SetValue {
            view_id: "v".into(),
            path: "data.count".into(),
            value: WireNode::Number {
                struct_id: "data.count".into(),
                value: 5.into(),
            },
            previous_value: None,
        }];
        let v: Value = serde_json::from_str(&UpdateMsg::batch_to_json(&batch)).unwrap();
        let first = &v.as_array().unwrap()[0];
        assert_eq!(first["type"], "setValue");
        assert_eq!(first["data"]["path"], "data.count");
        assert_eq!(first["data"]["value"]["value"], 5);
        // absent previous value is omitted entirely
        assert!(first["data"].get("previousValue").is_none());
    }

    #[test]
    fn test_pause_round_trip() {
        let msg = ClientMessage::from_json(r#"{"type":"pause","data":true,"request_id":"r1"}"#)
            .unwrap();
        match msg {
            ClientMessage::Pause { data, request_id } => {
                assert!(data);
                let ack: Value = serde_json::from_str(&pause_ack(&request_id, data)).unwrap();
                assert_eq!(ack["type"], "r1");
                assert_eq!(ack["data"], true);
            }
            _ => panic!("expected pause"),
        }
    }

    #[test]
    fn test_unknown_type_is_protocol_error() {
        assert!(ClientMessage::from_json(r#"{"type":"mystery","data":1}"#).is_err());
    }

    #[test]
    fn test_selections_parse() {
        let msg = ClientMessage::from_json(
            r#"{"type":"update_selections","data":{"selections":{"group1":"node3"}}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::UpdateSelections { data } => {
                assert_eq!(data.selections["group1"], "node3");
            }
            _ => panic!("expected update_selections"),
        }
    }
}
