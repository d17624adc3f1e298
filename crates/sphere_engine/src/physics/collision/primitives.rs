//! Primitive collision shapes and intersection algorithms
//!
//! Provides basic geometric primitives (rays, spheres) with intersection
//! tests used for "would this move collide" and "first hit along a move"
//! queries.

use crate::foundation::math::Vec3;

/// Distance pulled back from a reported ray hit so the mover stops just short
/// of the obstacle instead of touching it again on the next step
pub const RAY_EPSILON: f32 = 1e-4;

/// A ray with bounded length
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// The origin point of the ray in world space
    pub origin: Vec3,
    /// The direction of the ray (normalized on construction)
    pub direction: Vec3,
    /// Maximum distance travelled along `direction`
    pub max_length: f32,
}

impl Ray {
    /// Creates a new ray, normalizing `direction`
    ///
    /// Returns `None` for a zero or non-finite direction.
    pub fn new(origin: Vec3, direction: Vec3, max_length: f32) -> Option<Self> {
        let direction = direction.try_normalize(f32::EPSILON)?;
        Some(Self {
            origin,
            direction,
            max_length,
        })
    }

    /// Get a point along the ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A bounding sphere for collision detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// The center position of the sphere in world space
    pub center: Vec3,
    /// The radius of the sphere
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a new bounding sphere with the given center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if this sphere touches or overlaps another
    pub fn intersects(&self, other: &BoundingSphere) -> bool {
        let distance_squared = (self.center - other.center).magnitude_squared();
        let radius_sum = self.radius + other.radius;
        distance_squared <= radius_sum * radius_sum
    }

    /// Sphere with the same center and `extra` added to the radius
    ///
    /// Casting a point ray against the inflated sphere is equivalent to
    /// sweeping a sphere of radius `extra` against this one.
    pub fn inflated(&self, extra: f32) -> BoundingSphere {
        BoundingSphere::new(self.center, self.radius + extra)
    }

    /// Nearest forward hit of the ray within `[0, ray.max_length]`
    ///
    /// Solves `|O - C + tD|^2 = r^2` and returns the smallest non-negative
    /// root, pulled back by [`RAY_EPSILON`] and clamped at zero. An origin
    /// already inside the sphere reports a hit at 0.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        // Vector from sphere center to ray origin
        let oc = ray.origin - self.center;

        // Direction is unit length so the quadratic's `a` term is 1
        let b = oc.dot(&ray.direction);
        let c = oc.dot(&oc) - self.radius * self.radius;

        if c <= 0.0 {
            return Some(0.0);
        }

        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }

        let sqrt_discriminant = discriminant.sqrt();
        let t1 = -b - sqrt_discriminant;
        let t2 = -b + sqrt_discriminant;

        let t = if t1 >= 0.0 {
            t1
        } else if t2 >= 0.0 {
            t2
        } else {
            return None; // Sphere is behind the origin
        };

        if t > ray.max_length {
            return None;
        }

        Some((t - RAY_EPSILON).max(0.0))
    }
}
