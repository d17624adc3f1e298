//! Physics module for collision primitives
//!
//! Provides the sphere and ray math shared by every spatial backend. The
//! backends decide *which* entities to test; this module decides whether a
//! pair actually touches.

pub mod collision;

pub use collision::{BoundingSphere, Ray, RAY_EPSILON};
