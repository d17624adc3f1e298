//! Dynamic balanced R-tree
//!
//! Classic Guttman R-tree over axis-aligned boxes. Every leaf sits at the same
//! depth; every node except the root holds between `min_fanout` and
//! `max_fanout` children; every node's box is the tight union of its
//! children's boxes. Nodes live in a slot map arena and refer to their parent
//! by key, which keeps the structure free of reference cycles.

mod node;
mod split;

pub use node::{NodeKey, TreeEntry, TreeId};

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log::trace;
use ordered_float::OrderedFloat;
use slotmap::SlotMap;

use node::{LeafEntry, Node, NodeKind};

use crate::foundation::math::Vec3;
use crate::spatial::bounding_box::{union_all, BoundingBox, GEOMETRY_EPSILON};
use crate::spatial::IndexError;

/// Something waiting to be placed in the tree at a given level
enum Payload<T> {
    Entry(LeafEntry<T>),
    Subtree(NodeKey),
}

/// Dynamic R-tree holding items of type `T`
#[derive(Debug)]
pub struct RTree<T: TreeEntry> {
    id: TreeId,
    nodes: SlotMap<NodeKey, Node<T>>,
    root: Option<NodeKey>,
    min_fanout: usize,
    max_fanout: usize,
    len: usize,
    splits: u64,
}

impl<T: TreeEntry> RTree<T> {
    /// Create an empty tree
    ///
    /// Requires `max_fanout >= 2`, `min_fanout >= 1` and
    /// `min_fanout <= max_fanout / 2`.
    pub fn new(min_fanout: usize, max_fanout: usize) -> Result<Self, IndexError> {
        if max_fanout < 2 {
            return Err(IndexError::InvalidConfig(format!(
                "R-tree max fanout {} must be at least 2",
                max_fanout
            )));
        }
        if min_fanout < 1 || min_fanout > max_fanout / 2 {
            return Err(IndexError::InvalidConfig(format!(
                "R-tree min fanout {} must be in 1..={}",
                min_fanout,
                max_fanout / 2
            )));
        }

        Ok(Self {
            id: TreeId::next(),
            nodes: SlotMap::with_key(),
            root: None,
            min_fanout,
            max_fanout,
            len: 0,
            splits: 0,
        })
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the tree holds nothing
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of levels, 0 for an empty tree
    pub fn height(&self) -> usize {
        self.root.map_or(0, |root| self.nodes[root].level + 1)
    }

    /// Box covering every stored item
    pub fn root_bbox(&self) -> Option<BoundingBox> {
        self.root.map(|root| self.nodes[root].bbox)
    }

    /// Number of children of the root node
    pub fn root_fanout(&self) -> usize {
        self.root.map_or(0, |root| self.nodes[root].len())
    }

    /// Number of node splits performed since creation
    pub fn split_count(&self) -> u64 {
        self.splits
    }

    /// Identity of this tree, which scopes its node keys
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.len = 0;
    }

    /// Every stored item with its cached box
    pub fn iter(&self) -> impl Iterator<Item = (&T, &BoundingBox)> {
        self.nodes
            .values()
            .filter_map(|node| match &node.kind {
                NodeKind::Leaf(entries) => Some(entries),
                NodeKind::Internal(_) => None,
            })
            .flatten()
            .map(|e| (&e.item, &e.bbox))
    }

    /// Insert `item` with box `bbox`
    pub fn insert(&mut self, item: T, bbox: BoundingBox) {
        self.len += 1;
        self.insert_payload(Payload::Entry(LeafEntry { bbox, item }));
    }

    fn payload_level(&self, payload: &Payload<T>) -> usize {
        match payload {
            Payload::Entry(_) => 0,
            Payload::Subtree(child) => self.nodes[*child].level + 1,
        }
    }

    fn payload_bbox(&self, payload: &Payload<T>) -> BoundingBox {
        match payload {
            Payload::Entry(entry) => entry.bbox,
            Payload::Subtree(child) => self.nodes[*child].bbox,
        }
    }

    fn insert_payload(&mut self, payload: Payload<T>) {
        let bbox = self.payload_bbox(&payload);

        let Some(root) = self.root else {
            let root = self.nodes.insert(Node::leaf(bbox, Vec::new()));
            self.root = Some(root);
            self.attach(root, payload);
            return;
        };

        let level = self.payload_level(&payload);
        let target = self.choose_subtree(root, &bbox, level);
        self.attach(target, payload);

        let sibling = if self.nodes[target].len() > self.max_fanout {
            Some(self.split(target))
        } else {
            None
        };
        self.adjust_tree(target, sibling);
    }

    /// Descend from `root` to the node at `level` needing the least enlargement
    ///
    /// Ties go to the child with the smaller volume.
    fn choose_subtree(&self, root: NodeKey, bbox: &BoundingBox, level: usize) -> NodeKey {
        let mut current = root;
        loop {
            let node = &self.nodes[current];
            if node.level <= level {
                return current;
            }
            let NodeKind::Internal(children) = &node.kind else {
                return current;
            };

            let best = children.iter().copied().min_by(|&a, &b| {
                let box_a = &self.nodes[a].bbox;
                let box_b = &self.nodes[b].bbox;
                box_a
                    .enlargement(bbox)
                    .total_cmp(&box_b.enlargement(bbox))
                    .then_with(|| box_a.volume().total_cmp(&box_b.volume()))
            });

            match best {
                Some(child) => current = child,
                None => return current,
            }
        }
    }

    /// Place a payload directly into `node` and grow the node's box
    fn attach(&mut self, node: NodeKey, payload: Payload<T>) {
        let bbox = self.payload_bbox(&payload);
        match payload {
            Payload::Entry(entry) => {
                entry.item.relocated(self.id, node);
                match &mut self.nodes[node].kind {
                    NodeKind::Leaf(entries) => entries.push(entry),
                    NodeKind::Internal(_) => panic!("R-tree corrupted: entry routed to internal node"),
                }
            }
            Payload::Subtree(child) => {
                self.nodes[child].parent = Some(node);
                match &mut self.nodes[node].kind {
                    NodeKind::Internal(children) => children.push(child),
                    NodeKind::Leaf(_) => panic!("R-tree corrupted: subtree routed to leaf"),
                }
            }
        }

        let target = &mut self.nodes[node];
        target.bbox = if target.len() == 1 { bbox } else { target.bbox.enlarge(&bbox) };
    }

    /// Recompute a node's box from its children
    fn refresh_bbox(&mut self, key: NodeKey) {
        let tight = match &self.nodes[key].kind {
            NodeKind::Leaf(entries) => Node::entries_bbox(entries),
            NodeKind::Internal(children) => union_all(children.iter().map(|c| &self.nodes[*c].bbox)),
        };
        if let Some(tight) = tight {
            self.nodes[key].bbox = tight;
        }
    }

    /// Split an overfull node in two, returning the new sibling
    ///
    /// The sibling is not yet linked to a parent.
    fn split(&mut self, key: NodeKey) -> NodeKey {
        self.splits += 1;
        let level = self.nodes[key].level;
        let kind = std::mem::replace(&mut self.nodes[key].kind, NodeKind::Internal(Vec::new()));

        let sibling = match kind {
            NodeKind::Leaf(entries) => {
                let boxes: Vec<_> = entries.iter().map(|e| e.bbox).collect();
                let (keep, moved) = split::partition(&boxes, self.min_fanout);
                let (keep, moved) = distribute(entries, &keep, &moved);

                let moved_bbox = Node::entries_bbox(&moved).unwrap_or(boxes[0]);
                let sibling = self.nodes.insert(Node::leaf(moved_bbox, moved));
                if let NodeKind::Leaf(entries) = &self.nodes[sibling].kind {
                    for entry in entries {
                        entry.item.relocated(self.id, sibling);
                    }
                }
                self.nodes[key].kind = NodeKind::Leaf(keep);
                sibling
            }
            NodeKind::Internal(children) => {
                let boxes: Vec<_> = children.iter().map(|c| self.nodes[*c].bbox).collect();
                let (keep, moved) = split::partition(&boxes, self.min_fanout);
                let (keep, moved) = distribute(children, &keep, &moved);

                let moved_bbox = union_all(moved.iter().map(|c| &self.nodes[*c].bbox)).unwrap_or(boxes[0]);
                let sibling = self.nodes.insert(Node::internal(moved_bbox, level, moved.clone()));
                for child in moved {
                    self.nodes[child].parent = Some(sibling);
                }
                self.nodes[key].kind = NodeKind::Internal(keep);
                sibling
            }
        };

        self.refresh_bbox(key);
        trace!("R-tree split at level {}", level);
        sibling
    }

    /// Walk from `key` to the root, linking split siblings and tightening boxes
    fn adjust_tree(&mut self, mut key: NodeKey, mut sibling: Option<NodeKey>) {
        loop {
            let Some(parent) = self.nodes[key].parent else {
                if let Some(sibling) = sibling {
                    self.grow_root(key, sibling);
                }
                return;
            };

            if let Some(sibling) = sibling.take() {
                self.nodes[sibling].parent = Some(parent);
                if let NodeKind::Internal(children) = &mut self.nodes[parent].kind {
                    children.push(sibling);
                }
            }
            self.refresh_bbox(parent);

            if self.nodes[parent].len() > self.max_fanout {
                sibling = Some(self.split(parent));
            }
            key = parent;
        }
    }

    /// Replace the root after it was split
    fn grow_root(&mut self, old_root: NodeKey, sibling: NodeKey) {
        let level = self.nodes[old_root].level + 1;
        let bbox = self.nodes[old_root].bbox.enlarge(&self.nodes[sibling].bbox);
        let root = self.nodes.insert(Node::internal(bbox, level, vec![old_root, sibling]));
        self.nodes[old_root].parent = Some(root);
        self.nodes[sibling].parent = Some(root);
        self.root = Some(root);
    }

    /// Locate the leaf holding the item matching `matches`
    ///
    /// Tries `hint` first, then descends through every node whose box
    /// contains `bbox`.
    fn find_leaf(
        &self,
        bbox: &BoundingBox,
        hint: Option<NodeKey>,
        matches: &impl Fn(&T) -> bool,
    ) -> Option<(NodeKey, usize)> {
        let position_in = |key: NodeKey| match &self.nodes.get(key)?.kind {
            NodeKind::Leaf(entries) => entries.iter().position(|e| matches(&e.item)),
            NodeKind::Internal(_) => None,
        };

        if let Some(found) = hint.and_then(|leaf| position_in(leaf).map(|slot| (leaf, slot))) {
            return Some(found);
        }

        let mut stack: Vec<NodeKey> = self.root.into_iter().collect();
        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            if !node.bbox.contains(bbox, GEOMETRY_EPSILON) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(_) => {
                    if let Some(slot) = position_in(key) {
                        return Some((key, slot));
                    }
                }
                NodeKind::Internal(children) => stack.extend(children.iter().copied()),
            }
        }
        None
    }

    /// Remove `item`, stored with box `bbox`. Returns false if absent.
    pub fn remove(&mut self, item: &T, bbox: &BoundingBox) -> bool {
        self.remove_matching(bbox, item.leaf_hint(self.id), |other| other.same_entry(item))
            .is_some()
    }

    /// Remove the first item matching `matches`, returning it
    pub fn remove_matching(
        &mut self,
        bbox: &BoundingBox,
        hint: Option<NodeKey>,
        matches: impl Fn(&T) -> bool,
    ) -> Option<T> {
        let (leaf, slot) = self.find_leaf(bbox, hint, &matches)?;
        let entry = match &mut self.nodes[leaf].kind {
            NodeKind::Leaf(entries) => entries.swap_remove(slot),
            NodeKind::Internal(_) => return None,
        };
        self.len -= 1;
        self.condense_tree(leaf);
        Some(entry.item)
    }

    /// Dissolve underfull nodes on the path from `leaf` to the root
    ///
    /// Orphaned entries and subtrees are reinserted at their original level,
    /// highest first, then the root is shortened while it has one child.
    fn condense_tree(&mut self, leaf: NodeKey) {
        let mut orphans: Vec<Payload<T>> = Vec::new();
        let mut key = leaf;

        while let Some(parent) = self.nodes[key].parent {
            if self.nodes[key].len() < self.min_fanout {
                if let NodeKind::Internal(children) = &mut self.nodes[parent].kind {
                    children.retain(|child| *child != key);
                }
                if let Some(node) = self.nodes.remove(key) {
                    match node.kind {
                        NodeKind::Leaf(entries) => orphans.extend(entries.into_iter().map(Payload::Entry)),
                        NodeKind::Internal(children) => orphans.extend(children.into_iter().map(Payload::Subtree)),
                    }
                }
            } else {
                self.refresh_bbox(key);
            }
            key = parent;
        }
        self.refresh_bbox(key);

        if !orphans.is_empty() {
            trace!("R-tree condense reinserting {} orphans", orphans.len());
        }
        orphans.sort_by_key(|payload| Reverse(self.payload_level(payload)));
        for payload in orphans {
            self.insert_payload(payload);
        }

        self.shorten_root();
    }

    fn shorten_root(&mut self) {
        while let Some(root) = self.root {
            match &self.nodes[root].kind {
                NodeKind::Internal(children) if children.len() == 1 => {
                    let child = children[0];
                    self.nodes.remove(root);
                    self.nodes[child].parent = None;
                    self.root = Some(child);
                }
                NodeKind::Internal(children) if children.is_empty() => {
                    self.nodes.remove(root);
                    self.root = None;
                }
                NodeKind::Leaf(entries) if entries.is_empty() => {
                    self.nodes.remove(root);
                    self.root = None;
                }
                _ => return,
            }
        }
    }

    /// Move `item` from `old_bbox` to `new_bbox`. Returns false if absent.
    pub fn update(&mut self, item: &T, old_bbox: &BoundingBox, new_bbox: BoundingBox) -> bool {
        self.update_matching(old_bbox, new_bbox, item.leaf_hint(self.id), |other| other.same_entry(item))
    }

    /// Update the box of the item matching `matches`
    ///
    /// If the new box would grow the leaf, the item is removed and reinserted.
    /// Otherwise the entry box is replaced in place; when the old box touched
    /// the leaf boundary the leaf may shrink, so boxes are tightened upward
    /// until an ancestor is unchanged.
    pub fn update_matching(
        &mut self,
        old_bbox: &BoundingBox,
        new_bbox: BoundingBox,
        hint: Option<NodeKey>,
        matches: impl Fn(&T) -> bool,
    ) -> bool {
        let Some((leaf, slot)) = self.find_leaf(old_bbox, hint, &matches) else {
            return false;
        };

        let leaf_bbox = self.nodes[leaf].bbox;
        if !leaf_bbox.contains(&new_bbox, 0.0) {
            let entry = match &mut self.nodes[leaf].kind {
                NodeKind::Leaf(entries) => entries.swap_remove(slot),
                NodeKind::Internal(_) => return false,
            };
            self.len -= 1;
            self.condense_tree(leaf);
            self.insert(entry.item, new_bbox);
            return true;
        }

        if let NodeKind::Leaf(entries) = &mut self.nodes[leaf].kind {
            entries[slot].bbox = new_bbox;
        }

        if leaf_bbox.inset(GEOMETRY_EPSILON).contains(old_bbox, 0.0) {
            return true;
        }

        let mut key = leaf;
        loop {
            let before = self.nodes[key].bbox;
            self.refresh_bbox(key);
            if self.nodes[key].bbox == before {
                break;
            }
            match self.nodes[key].parent {
                Some(parent) => key = parent,
                None => break,
            }
        }
        true
    }

    /// Items whose boxes intersect `query`
    pub fn search(&self, query: &BoundingBox) -> Vec<&T> {
        let mut results = Vec::new();
        let mut stack: Vec<NodeKey> = self.root.into_iter().collect();

        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            if !node.bbox.intersects(query) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(entries) => results.extend(
                    entries
                        .iter()
                        .filter(|e| e.bbox.intersects(query))
                        .map(|e| &e.item),
                ),
                NodeKind::Internal(children) => stack.extend(children.iter().copied()),
            }
        }
        results
    }

    /// Best-first nearest neighbor search around `point`
    ///
    /// `distance` returns the distance from `point` to an item, or `None` to
    /// skip it. It must never be smaller than the distance from `point` to
    /// the item's box. Nodes are visited in order of their box distance and
    /// pruned once they cannot beat the best item found.
    pub fn nearest_neighbor(
        &self,
        point: Vec3,
        mut distance: impl FnMut(&T) -> Option<f32>,
    ) -> Option<(&T, f32)> {
        let root = self.root?;
        let mut best: Option<(&T, f32)> = None;
        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse((OrderedFloat(self.nodes[root].bbox.min_distance(point)), root)));

        while let Some(Reverse((OrderedFloat(bound), key))) = frontier.pop() {
            if best.is_some_and(|(_, d)| bound >= d) {
                break;
            }
            match &self.nodes[key].kind {
                NodeKind::Leaf(entries) => {
                    for entry in entries {
                        if let Some(d) = distance(&entry.item) {
                            if best.map_or(true, |(_, current)| d < current) {
                                best = Some((&entry.item, d));
                            }
                        }
                    }
                }
                NodeKind::Internal(children) => {
                    for &child in children {
                        let d = self.nodes[child].bbox.min_distance(point);
                        if best.map_or(true, |(_, current)| d < current) {
                            frontier.push(Reverse((OrderedFloat(d), child)));
                        }
                    }
                }
            }
        }
        best
    }

    /// Verify the structural invariants
    ///
    /// Checks parent links, level consistency (which implies equal leaf
    /// depth), fanout bounds, tight boxes and the item count.
    pub fn check_invariants(&self) -> Result<(), String> {
        let Some(root) = self.root else {
            return if self.len == 0 {
                Ok(())
            } else {
                Err(format!("empty tree reports {} items", self.len))
            };
        };

        if self.nodes[root].parent.is_some() {
            return Err("root has a parent".to_string());
        }

        let mut items = 0;
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            let node = self.nodes.get(key).ok_or_else(|| format!("dangling key {:?}", key))?;
            let count = node.len();

            if count > self.max_fanout {
                return Err(format!("node {:?} holds {} > {}", key, count, self.max_fanout));
            }
            if key != root && count < self.min_fanout {
                return Err(format!("node {:?} holds {} < {}", key, count, self.min_fanout));
            }
            if count == 0 {
                return Err(format!("node {:?} is empty", key));
            }

            let tight = match &node.kind {
                NodeKind::Leaf(entries) => {
                    if node.level != 0 {
                        return Err(format!("leaf {:?} at level {}", key, node.level));
                    }
                    items += entries.len();
                    Node::entries_bbox(entries)
                }
                NodeKind::Internal(children) => {
                    for &child in children {
                        let child_node = self
                            .nodes
                            .get(child)
                            .ok_or_else(|| format!("dangling child {:?}", child))?;
                        if child_node.parent != Some(key) {
                            return Err(format!("child {:?} does not point back to {:?}", child, key));
                        }
                        if child_node.level + 1 != node.level {
                            return Err(format!(
                                "child {:?} at level {} under level {}",
                                child, child_node.level, node.level
                            ));
                        }
                        stack.push(child);
                    }
                    union_all(children.iter().map(|c| &self.nodes[*c].bbox))
                }
            };

            if tight != Some(node.bbox) {
                return Err(format!("node {:?} box {:?} is not tight ({:?})", key, node.bbox, tight));
            }
        }

        if items != self.len {
            return Err(format!("found {} items, expected {}", items, self.len));
        }
        Ok(())
    }
}

/// Split `items` into the two index groups produced by a partition
fn distribute<I>(items: Vec<I>, keep: &[usize], moved: &[usize]) -> (Vec<I>, Vec<I>) {
    let mut slots: Vec<Option<I>> = items.into_iter().map(Some).collect();
    let mut take = |indices: &[usize]| -> Vec<I> {
        indices.iter().filter_map(|&i| slots[i].take()).collect()
    };
    let keep = take(keep);
    let moved = take(moved);
    (keep, moved)
}
