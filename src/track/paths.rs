//! Reachability Walk
//!
//! Enumerates every `(view, path)` pair through which a node is currently
//! reachable, by walking its parent back-references upward. A node shared
//! by several containers contributes one path per distinct route, and the
//! same view can appear with more than one path.

use std::collections::{BTreeMap, BTreeSet};

use crate::value::{NodeId, Store, join_path};

/// Parent chains are bounded so an accidentally constructed containment
/// cycle degrades into a truncated walk instead of unbounded recursion.
const MAX_DEPTH: usize = 64;

/// Map of view id to the set of paths addressing `base` within that view.
///
/// Ordered containers keep diff emission deterministic across runs.
pub type PathSet = BTreeMap<String, BTreeSet<String>>;

/// Enumerate every view-relative path addressing `base` inside `node`.
///
/// `base` is the slot address relative to `node` itself (for example
/// `data.count`), or the empty string to address `node` directly. Walks
/// the parent graph exhaustively: no reachable view is missed, and pruned
/// parent links are never revisited because they no longer exist.
pub fn reachable(store: &Store, node: NodeId, base: &str) -> PathSet {
    let mut out = PathSet::new();
    collect(store, node, base, 0, &mut out);
    out
}

fn collect(store: &Store, node: NodeId, base: &str, depth: usize, out: &mut PathSet) {
    if depth > MAX_DEPTH {
        crate::debug!("track"; "parent walk truncated at depth {depth}");
        return;
    }

    let meta = store.meta(node);
    for view in &meta.views {
        out.entry(view.clone())
            .or_default()
            .insert(base.to_string());
    }
    for (rel, parent) in &meta.parents {
        collect(store, *parent, &join_path(&rel.segment(), base), depth + 1, out);
    }
}
