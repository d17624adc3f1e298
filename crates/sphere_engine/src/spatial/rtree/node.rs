//! R-tree node storage
//!
//! Nodes live in a slot map arena. The tree owns nodes top-down through the
//! arena; `parent` is a plain key used only to walk upward during adjust and
//! condense, so there are no ownership cycles.

use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::new_key_type;

use crate::spatial::bounding_box::{union_all, BoundingBox};

new_key_type! {
    /// Arena key of an R-tree node
    pub struct NodeKey;
}

/// Identity of one [`RTree`](super::RTree)
///
/// Node keys are only meaningful in the arena that issued them; two trees
/// hand out equal keys for unrelated nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u64);

impl TreeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Item stored in the leaves of an [`RTree`](super::RTree)
pub trait TreeEntry: Clone {
    /// True if `self` and `other` denote the same stored item
    fn same_entry(&self, other: &Self) -> bool;

    /// Called whenever the item is placed into a leaf of tree `tree`
    fn relocated(&self, _tree: TreeId, _leaf: NodeKey) {}

    /// Leaf of `tree` the item believes it lives in, used to skip the descent
    /// in `find_leaf`
    fn leaf_hint(&self, _tree: TreeId) -> Option<NodeKey> {
        None
    }
}

impl TreeEntry for usize {
    fn same_entry(&self, other: &Self) -> bool {
        self == other
    }
}

impl TreeEntry for u32 {
    fn same_entry(&self, other: &Self) -> bool {
        self == other
    }
}

/// Stored item with its cached box
#[derive(Debug, Clone)]
pub(crate) struct LeafEntry<T> {
    pub bbox: BoundingBox,
    pub item: T,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind<T> {
    Leaf(Vec<LeafEntry<T>>),
    Internal(Vec<NodeKey>),
}

#[derive(Debug, Clone)]
pub(crate) struct Node<T> {
    /// Tight union of the children's boxes
    pub bbox: BoundingBox,
    pub parent: Option<NodeKey>,
    /// 0 for leaves, parent level is always child level + 1
    pub level: usize,
    pub kind: NodeKind<T>,
}

impl<T> Node<T> {
    pub fn leaf(bbox: BoundingBox, entries: Vec<LeafEntry<T>>) -> Self {
        Self {
            bbox,
            parent: None,
            level: 0,
            kind: NodeKind::Leaf(entries),
        }
    }

    pub fn internal(bbox: BoundingBox, level: usize, children: Vec<NodeKey>) -> Self {
        Self {
            bbox,
            parent: None,
            level,
            kind: NodeKind::Internal(children),
        }
    }

    pub fn len(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(entries) => entries.len(),
            NodeKind::Internal(children) => children.len(),
        }
    }

    /// Tight box of a leaf's entries
    pub fn entries_bbox(entries: &[LeafEntry<T>]) -> Option<BoundingBox> {
        union_all(entries.iter().map(|e| &e.bbox))
    }
}
