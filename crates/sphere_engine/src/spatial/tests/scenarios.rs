//! Fixed scenarios with known outcomes

use super::*;
use crate::entity::Inert;
use crate::spatial::{IndexError, RTree};

fn unit_at(x: f32) -> BoundingBox {
    BoundingBox::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
}

#[test]
fn test_five_boxes_split_root_once() {
    let mut tree = RTree::new(2, 4).unwrap();
    for (i, x) in [0.0, 1.5, 3.0, 4.5, 6.0].iter().enumerate() {
        tree.insert(i, unit_at(*x));
        if i < 4 {
            assert_eq!(tree.height(), 1);
        }
    }

    tree.check_invariants().unwrap();
    assert_eq!(tree.split_count(), 1);
    assert_eq!(tree.height(), 2);
    assert_eq!(tree.root_fanout(), 2);

    let everything = BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(8.0, 2.0, 2.0));
    assert_eq!(tree.search(&everything).len(), 5);
}

#[test]
fn test_move_into_neighbor_is_rejected() {
    for mut index in all_backends(cube(8.0), 0.5) {
        let row: Vec<EntityRef> = [-1.0, 0.0, 1.0]
            .iter()
            .enumerate()
            .map(|(i, &x)| Entity::inert(EntityId::from_raw(i as u64 + 1), Vec3::new(x, 0.0, 0.0), 0.5))
            .collect();
        for e in &row {
            index.add_entity(e.clone()).unwrap();
        }

        let first = &row[0];
        let name = index.backend_name();
        assert!(index.check_collision(first, Vec3::new(-0.4, 0.0, 0.0)), "{}", name);
        assert!(!index.check_collision(first, Vec3::new(-1.5, 0.0, 0.0)), "{}", name);
        // Touching the middle entity already counts as contact
        assert!(index.check_collision(first, first.position()), "{}", name);
        assert!(!index.check_collision(first, Vec3::new(-1.01, 0.0, 0.0)), "{}", name);
        assert_eq!(first.position(), Vec3::new(-1.0, 0.0, 0.0));

        let nearest = index.nearest_neighbor(first).unwrap();
        assert_eq!(nearest.id(), row[1].id(), "{}", name);

        let hit = index.find_first_collision(first, Vec3::new(1.0, 0.0, 0.0), 0.6);
        assert!(hit.is_some_and(|d| d < 1e-3), "{}: {:?}", name, hit);
        let last = &row[2];
        let grazing = index.find_first_collision(last, Vec3::new(0.0, 1.0, 0.0), 0.6);
        assert_eq!(grazing, Some(0.0), "{}: touching spheres report an immediate hit", name);
    }
}

fn boundary_entity_is_resident_once_and_mirrored<I, Q>(
    mut index: I,
    grid_of: impl Fn(&I) -> &ChunkGrid<Q>,
    step: impl Fn(&mut I, &StepContext) -> Result<(), IndexError>,
) where
    I: SpatialIndex,
    Q: TransferQueue,
{
    let layout = grid_of(&index).layout().clone();
    let position = Vec3::new(0.0, 2.0, 2.0);
    let e = Entity::inert(EntityId::from_raw(1), position, 0.5);
    index.add_entity(e.clone()).unwrap();

    let owner = layout.chunk_index_of(position);
    let across = layout.chunk_index_of(Vec3::new(-0.01, 2.0, 2.0));
    assert_ne!(owner, across);

    let check = |grid: &ChunkGrid<Q>| {
        let homes: Vec<usize> = (0..layout.chunk_count())
            .filter(|&i| grid.residents(i).iter().any(|r| r.id() == e.id()))
            .collect();
        assert_eq!(homes, vec![owner]);
        assert!(grid.halo(across).iter().any(|h| h.id() == e.id()));
        assert!(grid.halo(owner).is_empty());
    };

    check(grid_of(&index));
    step(&mut index, &StepContext::new(0)).unwrap();
    check(grid_of(&index));
    assert_grid_membership(grid_of(&index), 1);
}

#[test]
fn test_boundary_entity_is_resident_once_and_mirrored() {
    boundary_entity_is_resident_once_and_mirrored(chunk_grid(cube(8.0), 4.0, 1.0, 0.5), |g| g, |g, ctx| g.step(ctx));
}

#[test]
fn test_concurrent_boundary_entity_is_resident_once_and_mirrored() {
    boundary_entity_is_resident_once_and_mirrored(
        concurrent_grid(cube(8.0), 4.0, 1.0, 0.5),
        |g| g.grid(),
        |g, ctx| g.step_parallel(ctx),
    );
}

/// Tries one fixed move and records what its scope reported
struct Mover {
    target: Vec3,
    blocked: SegQueue<bool>,
    first_hit: SegQueue<Option<f32>>,
}

impl Mover {
    fn new(target: Vec3) -> Arc<Self> {
        Arc::new(Self {
            target,
            blocked: SegQueue::new(),
            first_hit: SegQueue::new(),
        })
    }
}

impl Behavior for Mover {
    fn step(&self, entity: &EntityRef, scope: &dyn CollisionQuery, _ctx: &StepContext) {
        let travel = self.target - entity.position();
        self.first_hit.push(scope.find_first_collision(entity, travel, travel.magnitude()));
        let blocked = scope.check_collision(entity, self.target);
        if !blocked {
            entity.set_position(self.target);
        }
        self.blocked.push(blocked);
    }

    fn kind(&self) -> &'static str {
        "mover"
    }
}

/// A mover crosses the face at x = 0 toward an entity of the next chunk that
/// sits just past the halo band of the mover's chunk
fn move_across_face<I, Q>(
    mut index: I,
    grid_of: impl Fn(&I) -> &ChunkGrid<Q>,
    step: impl Fn(&mut I, &StepContext) -> Result<(), IndexError>,
) where
    I: SpatialIndex,
    Q: TransferQueue,
{
    let layout = grid_of(&index).layout().clone();
    let start = Vec3::new(-0.3, 2.0, 2.0);
    let target = Vec3::new(0.4, 2.0, 2.0);
    let mover = Mover::new(target);
    let a = Entity::spawn(EntityId::from_raw(1), start, 0.5, mover.clone());
    let b = Entity::inert(EntityId::from_raw(2), Vec3::new(1.2, 2.0, 2.0), 0.5);
    index.add_entity(a.clone()).unwrap();
    index.add_entity(b.clone()).unwrap();

    let home = layout.chunk_index_of(start);
    assert!(!layout.within_halo(home, b.position()));
    assert!(index.check_collision(&a, target));

    step(&mut index, &StepContext::new(0)).unwrap();
    assert_eq!(mover.blocked.pop(), Some(true));
    let hit = mover.first_hit.pop().flatten();
    assert!(hit.is_some_and(|d| (d - 0.5).abs() < 1e-3), "{:?}", hit);
    assert_eq!(a.position(), start);
    assert_no_overlaps(&index.get_all());

    // With the way clear the mover crosses and changes owner
    assert!(index.remove_entity(&b));
    let c = Entity::inert(EntityId::from_raw(3), Vec3::new(3.0, 2.0, 2.0), 0.5);
    index.add_entity(c).unwrap();

    step(&mut index, &StepContext::new(1)).unwrap();
    assert_eq!(mover.blocked.pop(), Some(false));
    assert_eq!(a.position(), target);
    assert_eq!(a.owner(), Owner::Chunk(layout.chunk_index_of(target)));
    assert_grid_membership(grid_of(&index), 2);
}

#[test]
fn test_move_across_face_sees_neighbor_residents() {
    move_across_face(chunk_grid(cube(8.0), 4.0, 1.0, 0.5), |g| g, |g, ctx| g.step(ctx));
}

#[test]
fn test_concurrent_move_across_face_sees_neighbor_residents() {
    move_across_face(
        concurrent_grid(cube(8.0), 4.0, 1.0, 0.5),
        |g| g.grid(),
        |g, ctx| g.step_parallel(ctx),
    );
}

#[test]
fn test_empty_index_has_no_neighbors() {
    for index in all_backends(cube(8.0), 0.5) {
        let loner = Entity::inert(EntityId::from_raw(1), Vec3::zeros(), 0.5);
        assert!(index.nearest_neighbor(&loner).is_none());
        assert!(index.entities_within_range(&loner, 100.0).is_empty());
        assert!(!index.check_collision(&loner, Vec3::zeros()));
        assert_eq!(index.count(), 0);
    }
}

#[test]
fn test_inert_entities_survive_steps() {
    let entities = lattice(27, 2.0, 0.5, Arc::new(Inert), 1);
    let mut grid = chunk_grid(cube(8.0), 4.0, 1.0, 0.5);
    for e in &entities {
        grid.add_entity(e.clone()).unwrap();
    }
    for tick in 0..3 {
        grid.step(&StepContext::new(tick)).unwrap();
        assert_grid_membership(&grid, entities.len());
    }
    assert!(entities.iter().all(|e| e.last_stepped_tick() == Some(2)));
}
