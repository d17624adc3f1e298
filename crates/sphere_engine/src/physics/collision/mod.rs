//! Collision detection primitives
//!
//! # Module Organization
//!
//! - [`primitives`] - Basic geometric primitives (rays, spheres)
//!
//! # Key Types
//!
//! - [`Ray`], [`BoundingSphere`] - Primitive geometric types

pub mod primitives;

// Re-export commonly used types
pub use primitives::{Ray, BoundingSphere, RAY_EPSILON};
