//! Wire-node serializer.
//!
//! Converts a tracked subtree into the path-addressed wire representation
//! used by snapshots and diff payloads. Every node carries a `struct_id`
//! equal to the path it was rendered at, which viewers use to correlate
//! diff paths back to rendered elements.
//!
//! The addressing grammar here is the exact grammar the change tracker
//! uses when it enumerates diff paths: a viewer can apply a diff patch to
//! a tree it built from a snapshot without any translation.

use serde::{Deserialize, Serialize};

use crate::value::{NodeId, Payload, Scalar, Store, join_path};

// =============================================================================
// Wire Representation
// =============================================================================

/// Serialized form of one tracked node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireNode {
    Number {
        struct_id: String,
        value: serde_json::Number,
    },
    String {
        struct_id: String,
        value: String,
    },
    Bool {
        struct_id: String,
        value: bool,
    },
    /// Explicit placeholder rather than an omitted field, so paths stay
    /// stable when a value transitions to or from null
    Null {
        struct_id: String,
    },
    List {
        struct_id: String,
        data: Vec<WireNode>,
    },
    /// Keys and values are parallel arrays: the wire form preserves entry
    /// order and keys may themselves be structured
    Dict {
        struct_id: String,
        keys: Vec<WireNode>,
        values: Vec<WireNode>,
    },
    Dataclass {
        struct_id: String,
        /// Diagnostic type name of the mirrored record type
        subtype: String,
        data: serde_json::Map<String, serde_json::Value>,
    },
}

impl WireNode {
    /// Path this node was rendered at
    pub fn struct_id(&self) -> &str {
        match self {
            WireNode::Number { struct_id, .. }
            | WireNode::String { struct_id, .. }
            | WireNode::Bool { struct_id, .. }
            | WireNode::Null { struct_id }
            | WireNode::List { struct_id, .. }
            | WireNode::Dict { struct_id, .. }
            | WireNode::Dataclass { struct_id, .. } => struct_id,
        }
    }
}

// =============================================================================
// Serialization
// =============================================================================

/// Containment is a DAG under normal use; the cap turns an accidentally
/// constructed cycle into a truncated tree instead of unbounded recursion.
const MAX_DEPTH: usize = 64;

/// Serialize the subtree rooted at `node`, rendered at `path`.
///
/// View roots are serialized at the empty path; their direct record fields
/// land at `data.<field>`, matching the tracker's diff addressing.
pub fn serialize(store: &Store, node: NodeId, path: &str) -> WireNode {
    serialize_at(store, node, path, 0)
}

fn serialize_at(store: &Store, node: NodeId, path: &str, depth: usize) -> WireNode {
    if depth > MAX_DEPTH {
        return WireNode::Null {
            struct_id: path.to_string(),
        };
    }
    match store.payload(node) {
        Payload::Scalar(scalar) => serialize_scalar(scalar, path),

        Payload::List(items) => WireNode::List {
            struct_id: path.to_string(),
            data: items
                .iter()
                .enumerate()
                .map(|(i, item)| serialize_at(store, *item, &join_path(path, &format!("data.{i}")), depth + 1))
                .collect(),
        },

        Payload::Map(entries) => WireNode::Dict {
            struct_id: path.to_string(),
            keys: entries
                .iter()
                .enumerate()
                .map(|(i, e)| serialize_at(store, e.key, &join_path(path, &format!("keys.{i}")), depth + 1))
                .collect(),
            values: entries
                .iter()
                .enumerate()
                .map(|(i, e)| serialize_at(store, e.value, &join_path(path, &format!("values.{i}")), depth + 1))
                .collect(),
        },

        Payload::Record { name, fields } => {
            let mut data = serde_json::Map::with_capacity(fields.len());
            for (field, child) in fields {
                let wire = serialize_at(store, *child, &join_path(path, &format!("data.{field}")), depth + 1);
                data.insert(
                    field.clone(),
                    serde_json::to_value(wire).unwrap_or(serde_json::Value::Null),
                );
            }
            WireNode::Dataclass {
                struct_id: path.to_string(),
                subtype: name.clone(),
                data,
            }
        }
    }
}

fn serialize_scalar(scalar: &Scalar, path: &str) -> WireNode {
    let struct_id = path.to_string();
    match scalar {
        Scalar::Null => WireNode::Null { struct_id },
        Scalar::Bool(b) => WireNode::Bool {
            struct_id,
            value: *b,
        },
        Scalar::Int(i) => WireNode::Number {
            struct_id,
            value: serde_json::Number::from(*i),
        },
        Scalar::Float(f) => match serde_json::Number::from_f64(*f) {
            Some(value) => WireNode::Number { struct_id, value },
            // NaN/infinity have no JSON form; keep the path stable
            None => WireNode::Null { struct_id },
        },
        Scalar::Str(s) => WireNode::String {
            struct_id,
            value: s.clone(),
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{MapEntry, Payload, Raw, Scalar, Store};
    use crate::track::Tracker;

    #[test]
    fn test_scalar_shapes() {
        let mut store = Store::new();
        let n = store.insert(Payload::Scalar(Scalar::Int(5)));
        let wire = serialize(&store, n, "data.count");

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["struct_id"], "data.count");
        assert_eq!(json["value"], 5);
    }

    #[test]
    fn test_null_is_explicit_placeholder() {
        let mut store = Store::new();
        let n = store.insert(Payload::Scalar(Scalar::Null));
        let json = serde_json::to_value(serialize(&store, n, "data.opt")).unwrap();
        assert_eq!(json["type"], "null");
        assert_eq!(json["struct_id"], "data.opt");
        assert!(json.get("value").is_none());
    }

    #[test]
    fn test_nan_falls_back_to_null() {
        let mut store = Store::new();
        let n = store.insert(Payload::Scalar(Scalar::Float(f64::NAN)));
        let json = serde_json::to_value(serialize(&store, n, "data.x")).unwrap();
        assert_eq!(json["type"], "null");
    }

    #[test]
    fn test_list_child_paths() {
        let mut store = Store::new();
        let a = store.insert(Payload::Scalar(Scalar::Int(1)));
        let b = store.insert(Payload::Scalar(Scalar::Int(2)));
        let list = store.insert(Payload::List(vec![a, b]));

        let json = serde_json::to_value(serialize(&store, list, "")).unwrap();
        assert_eq!(json["type"], "list");
        assert_eq!(json["struct_id"], "");
        assert_eq!(json["data"][0]["struct_id"], "data.0");
        assert_eq!(json["data"][1]["struct_id"], "data.1");
    }

    #[test]
    fn test_map_parallel_arrays() {
        let mut store = Store::new();
        let k = store.insert(Payload::Scalar(Scalar::Str("a".into())));
        let v = store.insert(Payload::Scalar(Scalar::Int(1)));
        let map = store.insert(Payload::Map(vec![MapEntry { key: k, value: v }]));

        let json = serde_json::to_value(serialize(&store, map, "data.m")).unwrap();
        assert_eq!(json["type"], "dict");
        assert_eq!(json["keys"][0]["struct_id"], "data.m.keys.0");
        assert_eq!(json["values"][0]["struct_id"], "data.m.values.0");
        assert_eq!(json["keys"][0]["value"], "a");
        assert_eq!(json["values"][0]["value"], 1);
    }

    #[test]
    fn test_record_paths_and_subtype() {
        let mut tracker = Tracker::new();
        let (root, _) = tracker
            .observe(
                "v",
                Raw::record("Counter", [("count", Raw::from(0))]),
                None,
            )
            .unwrap();

        let json = serde_json::to_value(serialize(tracker.store(), root, "")).unwrap();
        assert_eq!(json["type"], "dataclass");
        assert_eq!(json["subtype"], "Counter");
        assert_eq!(json["data"]["count"]["struct_id"], "data.count");
        assert_eq!(json["data"]["count"]["value"], 0);
    }
}
