//! Math utilities and types
//!
//! Provides the vector types used by the geometry and spatial modules.

pub use nalgebra::Vector3;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// Math utility functions
pub mod utils {
    use super::Vec3;

    /// True when every component is finite (no NaN or infinity)
    pub fn is_finite(v: &Vec3) -> bool {
        v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
    }

    /// Component-wise minimum of two vectors
    pub fn component_min(a: &Vec3, b: &Vec3) -> Vec3 {
        a.inf(b)
    }

    /// Component-wise maximum of two vectors
    pub fn component_max(a: &Vec3, b: &Vec3) -> Vec3 {
        a.sup(b)
    }

    /// Uniform vector with every component set to `value`
    pub fn splat(value: f32) -> Vec3 {
        Vec3::new(value, value, value)
    }

    /// Pack a position into a single word by folding its bit patterns
    ///
    /// Used for hashing identities; not reversible.
    pub fn position_bits(v: &Vec3) -> u64 {
        let x = u64::from(v.x.to_bits());
        let y = u64::from(v.y.to_bits());
        let z = u64::from(v.z.to_bits());
        x ^ y.rotate_left(21) ^ z.rotate_left(42)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_min_max() {
        let a = Vec3::new(1.0, -2.0, 3.0);
        let b = Vec3::new(0.0, 5.0, 3.5);
        assert_eq!(utils::component_min(&a, &b), Vec3::new(0.0, -2.0, 3.0));
        assert_eq!(utils::component_max(&a, &b), Vec3::new(1.0, 5.0, 3.5));
    }

    #[test]
    fn test_is_finite() {
        assert!(utils::is_finite(&Vec3::new(1.0, 2.0, 3.0)));
        assert!(!utils::is_finite(&Vec3::new(f32::NAN, 2.0, 3.0)));
        assert!(!utils::is_finite(&Vec3::new(1.0, f32::INFINITY, 3.0)));
    }

    #[test]
    fn test_position_bits_differs_by_axis() {
        let a = utils::position_bits(&Vec3::new(1.0, 0.0, 0.0));
        let b = utils::position_bits(&Vec3::new(0.0, 1.0, 0.0));
        assert_ne!(a, b);
    }
}
