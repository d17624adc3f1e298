//! World bounds predicates
//!
//! Collision queries treat the edge of the world as an obstacle. The index
//! delegates that test to a [`WorldBounds`] implementation so callers can
//! shape the world however they like.

use crate::foundation::math::Vec3;
use crate::physics::{Ray, RAY_EPSILON};
use crate::spatial::BoundingBox;

/// Predicate deciding where spheres may exist
pub trait WorldBounds: Send + Sync {
    /// True if a sphere at `center` with `radius` pokes outside the world
    fn is_outside(&self, center: Vec3, radius: f32) -> bool;

    /// Distance along `ray` at which a sphere of `radius` would leave the world
    fn exit_distance(&self, ray: &Ray, radius: f32) -> Option<f32>;
}

/// Axis-aligned box world
#[derive(Debug, Clone, Copy)]
pub struct BoxBounds {
    bounds: BoundingBox,
}

impl BoxBounds {
    /// Create bounds from a box
    pub fn new(bounds: BoundingBox) -> Self {
        Self { bounds }
    }
}

impl WorldBounds for BoxBounds {
    fn is_outside(&self, center: Vec3, radius: f32) -> bool {
        (0..3).any(|axis| {
            center[axis] - radius < self.bounds.min[axis]
                || center[axis] + radius > self.bounds.max[axis]
        })
    }

    fn exit_distance(&self, ray: &Ray, radius: f32) -> Option<f32> {
        if self.is_outside(ray.origin, radius) {
            return Some(0.0);
        }

        let mut nearest = f32::INFINITY;
        for axis in 0..3 {
            let dir = ray.direction[axis];
            if dir.abs() < f32::EPSILON {
                continue;
            }
            let limit = if dir > 0.0 {
                self.bounds.max[axis] - radius
            } else {
                self.bounds.min[axis] + radius
            };
            nearest = nearest.min((limit - ray.origin[axis]) / dir);
        }

        (nearest <= ray.max_length).then(|| (nearest - RAY_EPSILON).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn world() -> BoxBounds {
        BoxBounds::new(BoundingBox::new(
            Vec3::new(-10.0, -10.0, -10.0),
            Vec3::new(10.0, 10.0, 10.0),
        ))
    }

    #[test]
    fn test_is_outside_accounts_for_radius() {
        let w = world();
        assert!(!w.is_outside(Vec3::new(9.0, 0.0, 0.0), 1.0));
        assert!(w.is_outside(Vec3::new(9.5, 0.0, 0.0), 1.0));
        assert!(w.is_outside(Vec3::new(0.0, -11.0, 0.0), 0.1));
    }

    #[test]
    fn test_exit_distance() {
        let w = world();
        let ray = Ray::new(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), 20.0).unwrap();
        let t = w.exit_distance(&ray, 1.0).unwrap();
        assert_relative_eq!(t, 9.0 - RAY_EPSILON, epsilon = 1e-5);

        let short = Ray::new(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), 5.0).unwrap();
        assert!(w.exit_distance(&short, 1.0).is_none());
    }
}
