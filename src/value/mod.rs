//! Arena-backed observable value model.
//!
//! Every tracked value lives in one owning [`Store`] and is addressed by a
//! stable [`NodeId`]. Parent links are plain ids pointing *upward* (child to
//! the container that holds it), so shared sub-structure never creates
//! cyclic ownership and a pruned link can never dangle.
//!
//! # Structure
//!
//! - [`Payload`] - the tagged value variants (scalar, list, map, record)
//! - [`Meta`] - per-node tracking metadata (view roots, parent links)
//! - [`Rel`] - the relation under which a parent holds a child
//! - [`Raw`] - untyped input values handed to `observe()` and write ops

use rustc_hash::FxHashSet;

// =============================================================================
// Node Identity
// =============================================================================

/// Stable handle of a tracked node inside the [`Store`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// Value Variants
// =============================================================================

/// Immutable scalar leaf (carries no tracking metadata of its own)
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// One insertion-ordered map entry. The entry index is the stable wire
/// address of both slots (`keys.<i>` / `values.<i>`).
#[derive(Debug, Clone, Copy)]
pub struct MapEntry {
    pub key: NodeId,
    pub value: NodeId,
}

/// Tagged variants of an observable value
#[derive(Debug, Clone)]
pub enum Payload {
    Scalar(Scalar),
    /// Ordered sequence of child nodes
    List(Vec<NodeId>),
    /// Insertion-ordered key/value entries; keys may be structured
    Map(Vec<MapEntry>),
    /// Named set of fields mirroring a user-defined structured type.
    /// The name is retained for diagnostic display only.
    Record {
        name: String,
        fields: Vec<(String, NodeId)>,
    },
}

impl Payload {
    /// Variant name for diagnostics and `WrongKind` errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Scalar(_) => "scalar",
            Payload::List(_) => "list",
            Payload::Map(_) => "map",
            Payload::Record { .. } => "record",
        }
    }
}

// =============================================================================
// Relation Keys
// =============================================================================

/// The relation under which a container holds a child: the field name,
/// list index, or map entry slot. Renders to exactly one path segment of
/// the unified addressing grammar shared with the serializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rel {
    /// Record field, addressed as `data.<name>`
    Field(String),
    /// List index, addressed as `data.<i>`
    Index(usize),
    /// Map key slot, addressed as `keys.<i>`
    Key(usize),
    /// Map value slot, addressed as `values.<i>`
    Val(usize),
}

impl Rel {
    /// Render the path segment for this relation
    pub fn segment(&self) -> String {
        match self {
            Rel::Field(name) => format!("data.{name}"),
            Rel::Index(i) => format!("data.{i}"),
            Rel::Key(i) => format!("keys.{i}"),
            Rel::Val(i) => format!("values.{i}"),
        }
    }
}

/// Join two path fragments.
///
/// The view root is the empty path, so composing against it must not pick
/// up a stray separator. Used both upward (segment onto a child-relative
/// base) and downward (serialized parent path onto a segment).
pub fn join_path(a: &str, b: &str) -> String {
    if a.is_empty() {
        b.to_string()
    } else if b.is_empty() {
        a.to_string()
    } else {
        format!("{a}.{b}")
    }
}

// =============================================================================
// Tracking Metadata
// =============================================================================

/// Per-node change-tracking metadata.
///
/// `parents` entries are back-references only: relation + id lookup, never
/// an ownership edge. They exist so a mutation can propagate upward to
/// every view the node is reachable from, and are pruned the moment the
/// parent stops referencing the child.
#[derive(Debug, Default)]
pub struct Meta {
    /// View ids this exact node is registered as the root of
    pub views: FxHashSet<String>,
    /// One entry per container currently holding this node
    pub parents: Vec<(Rel, NodeId)>,
    /// False while construction-time field population is still running;
    /// gates diff emission for the node's own construction
    pub initialised: bool,
}

impl Meta {
    /// A node participates in diffing only once it is held somewhere or is
    /// itself a view root.
    pub fn is_reachable(&self) -> bool {
        !self.views.is_empty() || !self.parents.is_empty()
    }
}

// =============================================================================
// Arena Store
// =============================================================================

/// One tracked node: value plus metadata
#[derive(Debug)]
pub struct Node {
    pub payload: Payload,
    pub meta: Meta,
}

/// Owning arena of all tracked nodes.
///
/// Nodes are never removed; a node unreachable from every view root simply
/// stops receiving parent links and is never enumerated again. For a
/// debugging aid with session-bounded lifetime this keeps ids stable
/// without a collector.
#[derive(Debug, Default)]
pub struct Store {
    nodes: Vec<Node>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new node; metadata starts uninitialised with no links.
    ///
    /// Panics if the arena exceeds `u32::MAX` nodes: aliasing ids would
    /// silently corrupt parent links.
    pub fn insert(&mut self, payload: Payload) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("node arena exceeded u32::MAX ids"));
        self.nodes.push(Node {
            payload,
            meta: Meta::default(),
        });
        id
    }

    pub fn payload(&self, id: NodeId) -> &Payload {
        &self.nodes[id.index()].payload
    }

    pub fn payload_mut(&mut self, id: NodeId) -> &mut Payload {
        &mut self.nodes[id.index()].payload
    }

    pub fn meta(&self, id: NodeId) -> &Meta {
        &self.nodes[id.index()].meta
    }

    pub fn meta_mut(&mut self, id: NodeId) -> &mut Meta {
        &mut self.nodes[id.index()].meta
    }

    /// Record `(rel, parent)` on the child if not already present.
    /// Idempotent so re-attaching shared sub-structure stays single-entry.
    pub fn add_parent(&mut self, child: NodeId, rel: Rel, parent: NodeId) {
        let meta = self.meta_mut(child);
        if !meta.parents.iter().any(|(r, p)| *r == rel && *p == parent) {
            meta.parents.push((rel, parent));
        }
    }

    /// Prune the `(rel, parent)` back-reference after the parent stopped
    /// holding the child under that relation.
    pub fn remove_parent(&mut self, child: NodeId, rel: &Rel, parent: NodeId) {
        self.meta_mut(child)
            .parents
            .retain(|(r, p)| !(r == rel && *p == parent));
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// =============================================================================
// Raw Input Values
// =============================================================================

/// Untyped values handed to `observe()` and the write operations.
///
/// This is the explicit record abstraction user types are declared
/// against: a structured type becomes `Raw::record("Name", fields)` and is
/// deep-converted into tracked nodes on first use. `Raw::Node` re-attaches
/// an already-tracked node, producing shared sub-structure reachable
/// through more than one parent.
#[derive(Debug, Clone)]
pub enum Raw {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Raw>),
    Map(Vec<(Raw, Raw)>),
    Record {
        name: String,
        fields: Vec<(String, Raw)>,
    },
    /// An already-tracked node (sharing)
    Node(NodeId),
}

impl Raw {
    /// Build a record value mirroring a user-defined structured type
    pub fn record<N, K>(name: N, fields: impl IntoIterator<Item = (K, Raw)>) -> Self
    where
        N: Into<String>,
        K: Into<String>,
    {
        Raw::Record {
            name: name.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Build a list value
    pub fn list(items: impl IntoIterator<Item = Raw>) -> Self {
        Raw::List(items.into_iter().collect())
    }

    /// Build a map value from key/value pairs (insertion order retained)
    pub fn map(entries: impl IntoIterator<Item = (Raw, Raw)>) -> Self {
        Raw::Map(entries.into_iter().collect())
    }
}

impl From<bool> for Raw {
    fn from(v: bool) -> Self {
        Raw::Bool(v)
    }
}

impl From<i32> for Raw {
    fn from(v: i32) -> Self {
        Raw::Int(i64::from(v))
    }
}

impl From<i64> for Raw {
    fn from(v: i64) -> Self {
        Raw::Int(v)
    }
}

impl From<f64> for Raw {
    fn from(v: f64) -> Self {
        Raw::Float(v)
    }
}

impl From<&str> for Raw {
    fn from(v: &str) -> Self {
        Raw::Str(v.to_string())
    }
}

impl From<String> for Raw {
    fn from(v: String) -> Self {
        Raw::Str(v)
    }
}

impl From<NodeId> for Raw {
    fn from(v: NodeId) -> Self {
        Raw::Node(v)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rel_segments() {
        assert_eq!(Rel::Field("count".into()).segment(), "data.count");
        assert_eq!(Rel::Index(3).segment(), "data.3");
        assert_eq!(Rel::Key(0).segment(), "keys.0");
        assert_eq!(Rel::Val(2).segment(), "values.2");
    }

    #[test]
    fn test_join_path_root() {
        assert_eq!(join_path("data.count", ""), "data.count");
        assert_eq!(join_path("data.a", "data.b"), "data.a.data.b");
    }

    #[test]
    fn test_parent_links_idempotent() {
        let mut store = Store::new();
        let parent = store.insert(Payload::List(Vec::new()));
        let child = store.insert(Payload::Scalar(Scalar::Int(1)));

        store.add_parent(child, Rel::Index(0), parent);
        store.add_parent(child, Rel::Index(0), parent);
        assert_eq!(store.meta(child).parents.len(), 1);

        store.remove_parent(child, &Rel::Index(0), parent);
        assert!(store.meta(child).parents.is_empty());
    }
}
