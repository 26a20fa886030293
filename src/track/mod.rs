//! Change Tracker
//!
//! Converts raw values into the instrumented value model, intercepts every
//! write, and translates each mutation into the set of `(view, path)`
//! diffs describing where the change is visible.
//!
//! # Architecture
//!
//! ```text
//! user code --write--> Tracker --diff events--> UpdateChannel --> actor
//! ```
//!
//! Supported mutations are `setValue` (field / index / key) and
//! `listAppend`. Structural operations such as insert, remove, sort or
//! reverse have no API here; the one rejectable shape (an out-of-bounds
//! index write, which would be an insert) fails fast.

mod paths;


pub use paths::{PathSet, reachable};

use std::collections::BTreeMap;

use serde_json::Value;

use crate::broadcast::message::{ServerMessage, UpdateMsg};
use crate::broadcast::queue::QueuedEvent;
use crate::error::{Error, Result};
use crate::serialize::serialize;
use crate::value::{MapEntry, NodeId, Payload, Raw, Rel, Scalar, Store};

// =============================================================================
// View Registry
// =============================================================================

/// One registered view: root node plus its opaque display descriptor
#[derive(Debug)]
pub struct ViewEntry {
    pub root: NodeId,
    pub widget: Option<Value>,
}

// =============================================================================
// Tracker
// =============================================================================

/// Owns the node arena and the view registry; all mutation runs through it
#[derive(Debug, Default)]
pub struct Tracker {
    store: Store,
    views: BTreeMap<String, ViewEntry>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register `raw` as the root of view `view_id`.
    ///
    /// Deep-converts the value into tracked nodes, records the view on the
    /// root's metadata, and returns the root handle together with the
    /// initial snapshot event for the broadcast path. Registering a second
    /// root under the same id is an error.
    pub fn observe(
        &mut self,
        view_id: &str,
        raw: Raw,
        widget: Option<Value>,
    ) -> Result<(NodeId, Vec<QueuedEvent>)> {
        if self.views.contains_key(view_id) {
            return Err(Error::DuplicateView(view_id.to_string()));
        }

        let root = self.convert(raw);
        self.store.meta_mut(root).views.insert(view_id.to_string());
        self.views.insert(
            view_id.to_string(),
            ViewEntry {
                root,
                widget: widget.clone(),
            },
        );

        let structure = serialize(&self.store, root, "");
        Ok((
            root,
            vec![QueuedEvent::Snapshot {
                view_id: view_id.to_string(),
                structure,
                widget,
            }],
        ))
    }

    // -------------------------------------------------------------------------
    // Mutation Interception
    // -------------------------------------------------------------------------

    /// Write a record field. An unknown field name is added as a new field.
    pub fn set_field(&mut self, node: NodeId, field: &str, raw: Raw) -> Result<Vec<QueuedEvent>> {
        let (slot, old) = match self.store.payload(node) {
            Payload::Record { fields, .. } => {
                match fields.iter().position(|(name, _)| name == field) {
                    Some(i) => (Some(i), Some(fields[i].1)),
                    None => (None, None),
                }
            }
            other => {
                return Err(Error::WrongKind {
                    expected: "record",
                    found: other.kind_name(),
                });
            }
        };

        let rel = Rel::Field(field.to_string());
        let new = self.convert(raw);
        let events = self.emit_set(node, &rel, new, old);
        self.relink(node, &rel, new, old);

        if let Payload::Record { fields, .. } = self.store.payload_mut(node) {
            match slot {
                Some(i) => fields[i].1 = new,
                None => fields.push((field.to_string(), new)),
            }
        }
        Ok(events)
    }

    /// Write an existing list index. Writing past the end would be an
    /// insert, which is not a supported mutation.
    pub fn set_index(&mut self, node: NodeId, index: usize, raw: Raw) -> Result<Vec<QueuedEvent>> {
        let old = match self.store.payload(node) {
            Payload::List(items) => {
                if index >= items.len() {
                    return Err(Error::UnsupportedMutation(format!(
                        "write at index {index} past list end ({} items) is an insert",
                        items.len()
                    )));
                }
                items[index]
            }
            other => {
                return Err(Error::WrongKind {
                    expected: "list",
                    found: other.kind_name(),
                });
            }
        };

        let rel = Rel::Index(index);
        let new = self.convert(raw);
        let events = self.emit_set(node, &rel, new, Some(old));
        self.relink(node, &rel, new, Some(old));

        if let Payload::List(items) = self.store.payload_mut(node) {
            items[index] = new;
        }
        Ok(events)
    }

    /// Write a map value under `key`. An unseen key appends a new entry and
    /// emits diffs for both the key and the value slot.
    pub fn set_key(&mut self, node: NodeId, key: Raw, raw: Raw) -> Result<Vec<QueuedEvent>> {
        let (entry_count, found) = match self.store.payload(node) {
            Payload::Map(entries) => (
                entries.len(),
                entries
                    .iter()
                    .enumerate()
                    .find(|(_, e)| self.key_matches(e.key, &key))
                    .map(|(i, e)| (i, e.value)),
            ),
            other => {
                return Err(Error::WrongKind {
                    expected: "map",
                    found: other.kind_name(),
                });
            }
        };

        if let Some((i, old)) = found {
            let rel = Rel::Val(i);
            let new = self.convert(raw);
            let events = self.emit_set(node, &rel, new, Some(old));
            self.relink(node, &rel, new, Some(old));

            if let Payload::Map(entries) = self.store.payload_mut(node) {
                entries[i].value = new;
            }
            Ok(events)
        } else {
            let i = entry_count;
            let key_node = self.convert(key);
            let val_node = self.convert(raw);

            let mut events = self.emit_set(node, &Rel::Key(i), key_node, None);
            events.extend(self.emit_set(node, &Rel::Val(i), val_node, None));

            self.store.add_parent(key_node, Rel::Key(i), node);
            self.store.add_parent(val_node, Rel::Val(i), node);
            if let Payload::Map(entries) = self.store.payload_mut(node) {
                entries.push(MapEntry {
                    key: key_node,
                    value: val_node,
                });
            }
            Ok(events)
        }
    }

    /// Append to a list. The diff is addressed at the list itself (one per
    /// reachable `(view, path)` pair of the list), no index substitution.
    pub fn list_append(&mut self, node: NodeId, raw: Raw) -> Result<Vec<QueuedEvent>> {
        let index = match self.store.payload(node) {
            Payload::List(items) => items.len(),
            other => {
                return Err(Error::WrongKind {
                    expected: "list",
                    found: other.kind_name(),
                });
            }
        };

        let new = self.convert(raw);

        let mut events = Vec::new();
        let meta = self.store.meta(node);
        if meta.initialised && meta.is_reachable() {
            for (view_id, view_paths) in reachable(&self.store, node, "") {
                for path in view_paths {
                    let value = serialize(&self.store, new, &path);
                    events.push(QueuedEvent::Update(UpdateMsg::ListAppend {
                        view_id: view_id.clone(),
                        path,
                        value,
                    }));
                }
            }
        }

        self.store.add_parent(new, Rel::Index(index), node);
        if let Payload::List(items) = self.store.payload_mut(node) {
            items.push(new);
        }
        Ok(events)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn payload(&self, node: NodeId) -> &Payload {
        self.store.payload(node)
    }

    pub fn scalar(&self, node: NodeId) -> Option<&Scalar> {
        match self.store.payload(node) {
            Payload::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn field(&self, node: NodeId, name: &str) -> Option<NodeId> {
        match self.store.payload(node) {
            Payload::Record { fields, .. } => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, id)| *id),
            _ => None,
        }
    }

    pub fn index(&self, node: NodeId, i: usize) -> Option<NodeId> {
        match self.store.payload(node) {
            Payload::List(items) => items.get(i).copied(),
            _ => None,
        }
    }

    pub fn map_get(&self, node: NodeId, key: &Raw) -> Option<NodeId> {
        match self.store.payload(node) {
            Payload::Map(entries) => entries
                .iter()
                .find(|e| self.key_matches(e.key, key))
                .map(|e| e.value),
            _ => None,
        }
    }

    pub fn view_root(&self, view_id: &str) -> Option<NodeId> {
        self.views.get(view_id).map(|entry| entry.root)
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    /// Serialize the current full state of one view
    pub fn snapshot(&self, view_id: &str) -> Result<ServerMessage> {
        let entry = self
            .views
            .get(view_id)
            .ok_or_else(|| Error::UnknownView(view_id.to_string()))?;
        Ok(ServerMessage::Snapshot {
            view_id: view_id.to_string(),
            structure: serialize(&self.store, entry.root, ""),
            widget: entry.widget.clone(),
        })
    }

    /// Serialize every registered view, in view-id order
    pub fn snapshots(&self) -> Vec<ServerMessage> {
        self.views
            .iter()
            .map(|(view_id, entry)| ServerMessage::Snapshot {
                view_id: view_id.clone(),
                structure: serialize(&self.store, entry.root, ""),
                widget: entry.widget.clone(),
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Deep-convert a raw value into tracked nodes. `Raw::Node` re-attaches
    /// the existing node instead of copying, producing shared sub-structure.
    fn convert(&mut self, raw: Raw) -> NodeId {
        match raw {
            Raw::Node(id) => id,
            Raw::Null => self.leaf(Scalar::Null),
            Raw::Bool(b) => self.leaf(Scalar::Bool(b)),
            Raw::Int(i) => self.leaf(Scalar::Int(i)),
            Raw::Float(f) => self.leaf(Scalar::Float(f)),
            Raw::Str(s) => self.leaf(Scalar::Str(s)),

            Raw::List(items) => {
                let children: Vec<NodeId> =
                    items.into_iter().map(|item| self.convert(item)).collect();
                let id = self.store.insert(Payload::List(children.clone()));
                for (i, child) in children.into_iter().enumerate() {
                    self.store.add_parent(child, Rel::Index(i), id);
                }
                self.store.meta_mut(id).initialised = true;
                id
            }

            Raw::Map(entries) => {
                let converted: Vec<MapEntry> = entries
                    .into_iter()
                    .map(|(k, v)| MapEntry {
                        key: self.convert(k),
                        value: self.convert(v),
                    })
                    .collect();
                let id = self.store.insert(Payload::Map(converted.clone()));
                for (i, entry) in converted.into_iter().enumerate() {
                    self.store.add_parent(entry.key, Rel::Key(i), id);
                    self.store.add_parent(entry.value, Rel::Val(i), id);
                }
                self.store.meta_mut(id).initialised = true;
                id
            }

            Raw::Record { name, fields } => {
                let converted: Vec<(String, NodeId)> = fields
                    .into_iter()
                    .map(|(field, value)| (field, self.convert(value)))
                    .collect();
                let id = self.store.insert(Payload::Record {
                    name,
                    fields: converted.clone(),
                });
                for (field, child) in converted {
                    self.store.add_parent(child, Rel::Field(field), id);
                }
                self.store.meta_mut(id).initialised = true;
                id
            }
        }
    }

    fn leaf(&mut self, scalar: Scalar) -> NodeId {
        let id = self.store.insert(Payload::Scalar(scalar));
        self.store.meta_mut(id).initialised = true;
        id
    }

    /// Emit one `setValue` diff per `(view, path)` pair through which the
    /// written slot is currently reachable. Nothing is emitted while the
    /// container is still being constructed or is reachable from nowhere.
    fn emit_set(
        &self,
        container: NodeId,
        rel: &Rel,
        new: NodeId,
        old: Option<NodeId>,
    ) -> Vec<QueuedEvent> {
        let meta = self.store.meta(container);
        if !meta.initialised || !meta.is_reachable() {
            return Vec::new();
        }

        let mut events = Vec::new();
        for (view_id, view_paths) in reachable(&self.store, container, &rel.segment()) {
            for path in view_paths {
                let value = serialize(&self.store, new, &path);
                let previous_value = old.map(|o| serialize(&self.store, o, &path));
                events.push(QueuedEvent::Update(UpdateMsg::SetValue {
                    view_id: view_id.clone(),
                    path,
                    value,
                    previous_value,
                }));
            }
        }
        events
    }

    /// Prune the replaced child's back-reference and record the new one
    fn relink(&mut self, container: NodeId, rel: &Rel, new: NodeId, old: Option<NodeId>) {
        if let Some(old) = old
            && old != new
        {
            self.store.remove_parent(old, rel, container);
        }
        self.store.add_parent(new, rel.clone(), container);
    }

    /// Scalar keys match by value; structured keys only by node identity
    fn key_matches(&self, key_node: NodeId, raw: &Raw) -> bool {
        match raw {
            Raw::Node(id) => *id == key_node,
            Raw::Null => matches!(self.store.payload(key_node), Payload::Scalar(Scalar::Null)),
            Raw::Bool(b) => {
                matches!(self.store.payload(key_node), Payload::Scalar(Scalar::Bool(x)) if x == b)
            }
            Raw::Int(i) => {
                matches!(self.store.payload(key_node), Payload::Scalar(Scalar::Int(x)) if x == i)
            }
            Raw::Float(f) => {
                matches!(self.store.payload(key_node), Payload::Scalar(Scalar::Float(x)) if x == f)
            }
            Raw::Str(s) => {
                matches!(self.store.payload(key_node), Payload::Scalar(Scalar::Str(x)) if x == s)
            }
            _ => false,
        }
    }
}
