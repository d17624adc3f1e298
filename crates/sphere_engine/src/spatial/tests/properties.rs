//! Backend answers checked against brute force

use super::*;

fn scatter(count: usize, half: f32, seed: u64) -> Vec<EntityRef> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let radius = rng.gen_range(0.1..=0.5);
            Entity::inert(EntityId::from_raw(i as u64 + 1), random_point(&mut rng, half), radius)
        })
        .collect()
}

fn distance(a: &Entity, b: &Entity) -> f32 {
    (a.position() - b.position()).magnitude()
}

#[test]
fn test_nearest_neighbor_matches_brute_force() {
    let entities = scatter(120, 14.0, 21);
    for mut index in all_backends(cube(16.0), 0.5) {
        for e in &entities {
            index.add_entity(e.clone()).unwrap();
        }

        for e in &entities {
            let found = index.nearest_neighbor(e).unwrap();
            let expected = entities
                .iter()
                .filter(|o| o.id() != e.id())
                .map(|o| distance(e, o))
                .fold(f32::INFINITY, f32::min);
            assert_eq!(distance(e, &found), expected, "{}", index.backend_name());
        }
        index.clear();
    }
}

#[test]
fn test_nearest_neighbor_in_sparse_world() {
    let entities = scatter(50, 60.0, 4);
    for mut index in all_backends(cube(64.0), 0.5) {
        for e in &entities {
            index.add_entity(e.clone()).unwrap();
        }
        for e in &entities {
            let found = index.nearest_neighbor(e).unwrap();
            let expected = entities
                .iter()
                .filter(|o| o.id() != e.id())
                .map(|o| distance(e, o))
                .fold(f32::INFINITY, f32::min);
            assert_eq!(distance(e, &found), expected, "{}", index.backend_name());
        }
        index.clear();
    }
}

#[test]
fn test_range_query_matches_brute_force() {
    let entities = scatter(150, 14.0, 8);
    let mut rng = StdRng::seed_from_u64(99);
    for mut index in all_backends(cube(16.0), 0.5) {
        for e in &entities {
            index.add_entity(e.clone()).unwrap();
        }

        for e in entities.iter().step_by(7) {
            let radius = rng.gen_range(0.5..6.0);
            let mut found: Vec<u64> = index
                .entities_within_range(e, radius)
                .iter()
                .map(|o| o.id().raw())
                .collect();
            found.sort_unstable();
            let expected: Vec<u64> = entities
                .iter()
                .filter(|o| o.id() != e.id() && distance(e, o) <= radius)
                .map(|o| o.id().raw())
                .collect();
            assert_eq!(found, expected, "{}", index.backend_name());
        }
        index.clear();
    }
}

#[test]
fn test_collision_check_matches_sphere_distance() {
    let mut rng = StdRng::seed_from_u64(12);
    for mut index in all_backends(cube(16.0), 0.5) {
        let anchor = Entity::inert(EntityId::from_raw(1), Vec3::zeros(), 0.5);
        let mover = Entity::inert(EntityId::from_raw(2), Vec3::new(10.0, 10.0, 10.0), 0.3);
        index.add_entity(anchor.clone()).unwrap();
        index.add_entity(mover.clone()).unwrap();

        for _ in 0..500 {
            let candidate = random_point(&mut rng, 2.5);
            let touching = (candidate - anchor.position()).magnitude() <= anchor.radius() + mover.radius();
            assert_eq!(
                index.check_collision(&mover, candidate),
                touching,
                "{} at {:?}",
                index.backend_name(),
                candidate
            );
        }
    }
}

#[test]
fn test_collision_check_is_symmetric() {
    let entities = scatter(80, 6.0, 31);
    for mut index in all_backends(cube(8.0), 0.5) {
        for e in &entities {
            index.add_entity(e.clone()).unwrap();
        }
        for a in &entities {
            for b in &entities {
                if a.id() == b.id() {
                    continue;
                }
                let overlap = distance(a, b) <= a.radius() + b.radius() - 1e-4;
                if overlap {
                    assert!(index.check_collision(a, a.position()), "{}", index.backend_name());
                    assert!(index.check_collision(b, b.position()), "{}", index.backend_name());
                }
            }
        }
        index.clear();
    }
}

#[test]
fn test_add_remove_round_trip() {
    let entities = scatter(100, 14.0, 77);
    for mut index in all_backends(cube(16.0), 0.5) {
        for e in &entities {
            index.add_entity(e.clone()).unwrap();
        }
        assert_eq!(index.count(), entities.len());

        for e in entities.iter().step_by(2) {
            assert!(index.remove_entity(e), "{}", index.backend_name());
        }
        assert_eq!(index.count(), entities.len() / 2);
        let remaining: HashSet<EntityId> = index.get_all().iter().map(|e| e.id()).collect();
        for (i, e) in entities.iter().enumerate() {
            assert_eq!(remaining.contains(&e.id()), i % 2 == 1);
        }

        for e in entities.iter().skip(1).step_by(2) {
            assert!(index.remove_entity(e));
        }
        assert_eq!(index.count(), 0);
        assert!(entities.iter().all(|e| !e.is_alive()));

        // Retired entities can be registered again
        for e in &entities {
            index.add_entity(e.clone()).unwrap();
        }
        assert_eq!(index.count(), entities.len());
        index.clear();
        assert_eq!(index.count(), 0);
    }
}
