//! Axis-aligned bounding boxes
//!
//! The minimum bounding box (MBB) is the unit of indexing for the R-tree and
//! the shape of every chunk in the chunk grid. Comparisons accept a small
//! epsilon so that entries sitting exactly on a shared face are not lost to
//! floating-point rounding.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{utils, Vec3};

/// Tolerance used by `intersects`/`contains` along shared faces
pub const GEOMETRY_EPSILON: f32 = 1e-5;

/// Axis-aligned bounding box defined by its minimum and maximum corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl BoundingBox {
    /// Create a new box from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a box centered at a point with given half-extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Tight box around a sphere
    pub fn from_sphere(center: Vec3, radius: f32) -> Self {
        Self::from_center_extents(center, utils::splat(radius))
    }

    /// True if the corners are finite and ordered on every axis
    pub fn is_valid(&self) -> bool {
        utils::is_finite(&self.min)
            && utils::is_finite(&self.max)
            && (0..3).all(|axis| self.min[axis] <= self.max[axis])
    }

    /// Get the center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Full edge lengths of the box
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Product of the edge lengths
    ///
    /// This is the "area" the R-tree minimizes; in three dimensions it is the
    /// box volume.
    pub fn volume(&self) -> f32 {
        let size = self.size();
        size.x * size.y * size.z
    }

    /// Check if this box contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }

    /// Check if this box intersects another, tolerating `GEOMETRY_EPSILON`
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        (0..3).all(|axis| {
            self.min[axis] <= other.max[axis] + GEOMETRY_EPSILON
                && self.max[axis] >= other.min[axis] - GEOMETRY_EPSILON
        })
    }

    /// Check if `other` lies entirely inside this box, within `epsilon`
    pub fn contains(&self, other: &BoundingBox, epsilon: f32) -> bool {
        (0..3).all(|axis| {
            other.min[axis] >= self.min[axis] - epsilon
                && other.max[axis] <= self.max[axis] + epsilon
        })
    }

    /// Smallest box enclosing both boxes
    pub fn enlarge(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: utils::component_min(&self.min, &other.min),
            max: utils::component_max(&self.max, &other.max),
        }
    }

    /// Volume growth needed to admit `other`
    pub fn enlargement(&self, other: &BoundingBox) -> f32 {
        self.enlarge(other).volume() - self.volume()
    }

    /// Box grown by `amount` on every side
    pub fn expanded(&self, amount: f32) -> BoundingBox {
        let delta = utils::splat(amount);
        BoundingBox {
            min: self.min - delta,
            max: self.max + delta,
        }
    }

    /// Box shrunk by `amount` on every side, collapsing to the center if too small
    pub fn inset(&self, amount: f32) -> BoundingBox {
        let center = self.center();
        let mut result = self.expanded(-amount);
        for axis in 0..3 {
            if result.min[axis] > result.max[axis] {
                result.min[axis] = center[axis];
                result.max[axis] = center[axis];
            }
        }
        result
    }

    /// Euclidean distance from `point` to the nearest point of the box
    ///
    /// Zero when the point is inside. Lower bound on the distance from the
    /// point to anything contained by the box.
    pub fn min_distance(&self, point: Vec3) -> f32 {
        self.min_distance_squared(point).sqrt()
    }

    /// Squared form of [`BoundingBox::min_distance`]
    pub fn min_distance_squared(&self, point: Vec3) -> f32 {
        let closest = Vec3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        );
        (closest - point).magnitude_squared()
    }
}

/// Tight union of a sequence of boxes, `None` when empty
pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Option<BoundingBox> {
    boxes
        .into_iter()
        .fold(None, |acc: Option<BoundingBox>, b| {
            Some(acc.map_or(*b, |a| a.enlarge(b)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_at(x: f32) -> BoundingBox {
        BoundingBox::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn test_volume_and_enlargement() {
        let a = unit_at(0.0);
        let b = unit_at(2.0);
        assert_relative_eq!(a.volume(), 1.0);
        assert_relative_eq!(a.enlarge(&b).volume(), 3.0);
        assert_relative_eq!(a.enlargement(&b), 2.0);
        assert_relative_eq!(a.enlargement(&a), 0.0);
    }

    #[test]
    fn test_intersects_shared_face() {
        let a = unit_at(0.0);
        let b = unit_at(1.0);
        let c = unit_at(1.5);
        let far = unit_at(3.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!a.intersects(&far));
    }

    #[test]
    fn test_contains_with_epsilon() {
        let outer = BoundingBox::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0));
        let inner = BoundingBox::new(Vec3::new(0.5, 0.5, 0.5), Vec3::new(2.0 + 1e-6, 1.0, 1.0));
        assert!(outer.contains(&inner, GEOMETRY_EPSILON));
        assert!(!outer.contains(&inner, 0.0));
    }

    #[test]
    fn test_min_distance() {
        let b = unit_at(0.0);
        assert_relative_eq!(b.min_distance(Vec3::new(0.5, 0.5, 0.5)), 0.0);
        assert_relative_eq!(b.min_distance(Vec3::new(3.0, 0.5, 0.5)), 2.0);
        assert_relative_eq!(b.min_distance(Vec3::new(4.0, 5.0, 0.5)), 5.0);
    }

    #[test]
    fn test_inset_collapses_small_boxes() {
        let b = BoundingBox::new(Vec3::zeros(), Vec3::new(1.0, 0.1, 1.0));
        let inset = b.inset(0.2);
        assert!(inset.is_valid());
        assert_relative_eq!(inset.min.y, 0.05);
        assert_relative_eq!(inset.max.y, 0.05);
        assert_relative_eq!(inset.min.x, 0.2);
    }

    #[test]
    fn test_is_valid_rejects_nan_and_inverted() {
        assert!(unit_at(0.0).is_valid());
        assert!(!BoundingBox::new(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::zeros()).is_valid());
        assert!(!BoundingBox::new(Vec3::new(1.0, 0.0, 0.0), Vec3::zeros()).is_valid());
    }

    #[test]
    fn test_union_all() {
        assert!(union_all(std::iter::empty()).is_none());
        let boxes = [unit_at(0.0), unit_at(4.0), unit_at(-2.0)];
        let u = union_all(boxes.iter()).unwrap();
        assert_relative_eq!(u.min.x, -2.0);
        assert_relative_eq!(u.max.x, 5.0);
    }
}
