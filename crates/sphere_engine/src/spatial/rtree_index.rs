//! R-tree backed spatial index
//!
//! Stores each entity under its sphere's bounding box. Query boxes are grown
//! by the largest radius seen so far, the same trick the octree used for
//! `max_entity_radius`, so candidates whose centers sit outside the query box
//! are still found.

use std::sync::Arc;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::core::RTreeConfig;
use crate::entity::{Entity, EntityRef, Owner};
use crate::foundation::math::Vec3;
use crate::simulation::StepContext;
use crate::spatial::rtree::{NodeKey, RTree, TreeEntry, TreeId};
use crate::spatial::spatial_index::validate_entity;
use crate::spatial::{narrow_phase, BoundingBox, CollisionQuery, IndexError, Schedule, SpatialIndex, WorldBounds};

impl TreeEntry for EntityRef {
    fn same_entry(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    fn relocated(&self, tree: TreeId, leaf: NodeKey) {
        self.set_owner(Owner::Leaf { tree, leaf });
    }

    fn leaf_hint(&self, tree: TreeId) -> Option<NodeKey> {
        self.owner().leaf_in(tree)
    }
}

/// Sequential spatial index over a dynamic R-tree
pub struct RTreeIndex {
    tree: RTree<EntityRef>,
    bounds: Arc<dyn WorldBounds>,
    max_entity_radius: f32,
    /// Largest radius currently or previously stored
    max_seen_radius: f32,
    shuffle: Option<StdRng>,
}

impl RTreeIndex {
    /// Create an empty index
    pub fn new(
        config: &RTreeConfig,
        bounds: Arc<dyn WorldBounds>,
        max_entity_radius: f32,
    ) -> Result<Self, IndexError> {
        if !(max_entity_radius.is_finite() && max_entity_radius > 0.0) {
            return Err(IndexError::InvalidConfig(format!(
                "max entity radius {} must be positive",
                max_entity_radius
            )));
        }
        let tree = RTree::new(config.min_fanout, config.max_fanout)?;

        info!(
            "R-tree index ready (fanout {}..={}, max radius {})",
            config.min_fanout, config.max_fanout, max_entity_radius
        );

        Ok(Self {
            tree,
            bounds,
            max_entity_radius,
            max_seen_radius: 0.0,
            shuffle: config.shuffle_seed.map(StdRng::seed_from_u64),
        })
    }

    /// Underlying tree, for inspection
    pub fn tree(&self) -> &RTree<EntityRef> {
        &self.tree
    }

    fn candidates(&self, query: &BoundingBox) -> Vec<&EntityRef> {
        self.tree.search(&query.expanded(self.max_seen_radius))
    }

    /// Locate and remove the leaf entry of `entity`
    ///
    /// Entities not owned by this tree are absent. An entity whose owner
    /// names this tree but that cannot be found is a corrupted index.
    fn detach(&mut self, entity: &Entity) -> Option<EntityRef> {
        let hint = entity.owner().leaf_in(self.tree.id())?;
        let id = entity.id();
        let removed = self
            .tree
            .remove_matching(&entity.bbox(), Some(hint), |other| other.id() == id);
        if removed.is_none() {
            panic!("R-tree lost track of entity {} owned by leaf {:?}", id, hint);
        }
        removed
    }
}

impl CollisionQuery for RTreeIndex {
    fn check_collision(&self, entity: &Entity, candidate: Vec3) -> bool {
        let query = BoundingBox::from_sphere(candidate, entity.radius());
        narrow_phase::collides(entity, candidate, self.bounds.as_ref(), self.candidates(&query))
    }

    fn find_first_collision(&self, entity: &Entity, direction: Vec3, length: f32) -> Option<f32> {
        let sphere = entity.sphere();
        let end = sphere.center + direction.try_normalize(f32::EPSILON)? * length.max(0.0);
        let query = BoundingBox::from_sphere(sphere.center, sphere.radius)
            .enlarge(&BoundingBox::from_sphere(end, sphere.radius));
        narrow_phase::first_hit(entity, direction, length, self.bounds.as_ref(), self.candidates(&query))
    }

    fn nearest_neighbor(&self, entity: &Entity) -> Option<EntityRef> {
        let center = entity.position();
        let id = entity.id();
        self.tree
            .nearest_neighbor(center, |other| {
                (other.id() != id && other.is_alive()).then(|| (other.position() - center).magnitude())
            })
            .map(|(found, _)| found.clone())
    }

    fn entities_within_range(&self, entity: &Entity, radius: f32) -> Vec<EntityRef> {
        let query = BoundingBox::from_sphere(entity.position(), radius.max(0.0));
        narrow_phase::within(entity, radius, self.tree.search(&query))
    }
}

impl SpatialIndex for RTreeIndex {
    fn backend_name(&self) -> &'static str {
        "rtree"
    }

    fn schedule(&self) -> Schedule {
        Schedule::Sequential
    }

    fn add_entity(&mut self, entity: EntityRef) -> Result<(), IndexError> {
        validate_entity(&entity, self.max_entity_radius)?;
        entity.revive();
        self.max_seen_radius = self.max_seen_radius.max(entity.radius());
        let bbox = entity.bbox();
        self.tree.insert(entity, bbox);
        Ok(())
    }

    fn remove_entity(&mut self, entity: &Entity) -> bool {
        match self.detach(entity) {
            Some(removed) => {
                removed.retire();
                true
            }
            None => false,
        }
    }

    fn step(&mut self, ctx: &StepContext) -> Result<(), IndexError> {
        let mut snapshot: Vec<EntityRef> = self.tree.iter().map(|(e, _)| e.clone()).collect();
        if let Some(rng) = self.shuffle.as_mut() {
            snapshot.shuffle(rng);
        }

        let mut relocated = 0usize;
        for entity in &snapshot {
            if !entity.is_alive() || !entity.mark_stepped(ctx.tick()) {
                continue;
            }

            let before = entity.bbox();
            entity.behavior().step(entity, &*self, ctx);
            let after = entity.bbox();

            if after != before {
                self.max_seen_radius = self.max_seen_radius.max(entity.radius());
                if !self.tree.update(entity, &before, after) {
                    panic!("R-tree lost track of entity {} during step", entity.id());
                }
                relocated += 1;
            }
        }

        debug!(
            "R-tree tick {}: {} entities, {} moved, height {}",
            ctx.tick(),
            snapshot.len(),
            relocated,
            self.tree.height()
        );
        Ok(())
    }

    fn get_all(&self) -> Vec<EntityRef> {
        self.tree.iter().map(|(e, _)| e.clone()).collect()
    }

    fn count(&self) -> usize {
        self.tree.len()
    }

    fn clear(&mut self) {
        for (entity, _) in self.tree.iter() {
            entity.retire();
        }
        self.tree.clear();
        self.max_seen_radius = 0.0;
    }
}
