//! Microbe behavior for the colony demo
//!
//! Microbes drift in a random direction each tick, stopping short of
//! anything in the way, grow while they have room, split in two once large
//! enough and occasionally die.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sphere_engine::prelude::*;

/// Tunables shared by every microbe
#[derive(Debug, Clone)]
pub struct MicrobeTraits {
    /// Distance travelled per tick when unobstructed
    pub speed: f32,
    /// Radius gained per tick when there is room
    pub growth: f32,
    /// Radius at which a microbe splits
    pub split_radius: f32,
    /// Radius of a fresh microbe
    pub birth_radius: f32,
    /// Chance of dying on any given tick
    pub death_chance: f64,
    /// World the microbes live in
    pub world: BoundingBox,
    /// Seed mixed into every random draw
    pub seed: u64,
}

/// Behavior shared by all microbes
pub struct Microbe {
    traits: MicrobeTraits,
}

impl Microbe {
    pub fn new(traits: MicrobeTraits) -> Arc<Self> {
        Arc::new(Self { traits })
    }

    fn rng(&self, entity: &Entity, tick: u64) -> StdRng {
        StdRng::seed_from_u64(self.traits.seed ^ entity.id().raw() ^ tick.rotate_left(32))
    }

    fn random_direction(rng: &mut StdRng) -> Vec3 {
        loop {
            let v = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            if let Some(unit) = v.try_normalize(1e-3) {
                return unit;
            }
        }
    }

    /// True if `entity` could grow to `radius` where it stands
    fn has_room(&self, entity: &Entity, scope: &dyn CollisionQuery, radius: f32) -> bool {
        let center = entity.position();
        let grown = BoundingBox::from_sphere(center, radius);
        if !self.traits.world.contains(&grown, 0.0) {
            return false;
        }
        scope
            .entities_within_range(entity, radius + self.traits.split_radius)
            .iter()
            .all(|other| (other.position() - center).magnitude() > radius + other.radius())
    }
}

impl Behavior for Microbe {
    fn step(&self, entity: &EntityRef, scope: &dyn CollisionQuery, ctx: &StepContext) {
        let mut rng = self.rng(entity, ctx.tick());

        if rng.gen_bool(self.traits.death_chance) {
            ctx.kill(entity);
            return;
        }

        let direction = Self::random_direction(&mut rng);
        let travel = scope
            .find_first_collision(entity, direction, self.traits.speed)
            .unwrap_or(self.traits.speed);
        if travel > 0.0 {
            let target = entity.position() + direction * travel;
            if !scope.check_collision(entity, target) {
                entity.set_position(target);
            }
        }

        let radius = entity.radius();
        if radius >= self.traits.split_radius {
            let child_radius = self.traits.birth_radius;
            let offset = Self::random_direction(&mut rng) * (radius + child_radius + 0.05);
            entity.set_radius(child_radius);
            ctx.spawn(entity, entity.position() + offset, child_radius, Arc::new(Self {
                traits: self.traits.clone(),
            }));
        } else {
            let grown = (radius + self.traits.growth).min(self.traits.split_radius);
            if self.has_room(entity, scope, grown) {
                entity.set_radius(grown);
            }
        }
    }

    fn kind(&self) -> &'static str {
        "microbe"
    }
}
