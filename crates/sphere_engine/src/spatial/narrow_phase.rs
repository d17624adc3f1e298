//! Narrow-phase tests over a candidate set
//!
//! Backends differ only in how they gather candidates; once gathered, every
//! backend runs the same exact sphere tests here so results agree.

use crate::entity::{Entity, EntityRef};
use crate::foundation::math::Vec3;
use crate::physics::{BoundingSphere, Ray};
use crate::spatial::WorldBounds;

fn others<'a>(
    subject: &'a Entity,
    candidates: impl IntoIterator<Item = &'a EntityRef>,
) -> impl Iterator<Item = &'a EntityRef> {
    candidates
        .into_iter()
        .filter(move |other| other.id() != subject.id() && other.is_alive())
}

/// True if `subject` at `candidate` overlaps the world edge or any candidate
pub(crate) fn collides<'a>(
    subject: &'a Entity,
    candidate: Vec3,
    bounds: &dyn WorldBounds,
    candidates: impl IntoIterator<Item = &'a EntityRef>,
) -> bool {
    let radius = subject.radius();
    if bounds.is_outside(candidate, radius) {
        return true;
    }
    let moved = BoundingSphere::new(candidate, radius);
    others(subject, candidates).any(|other| moved.intersects(&other.sphere()))
}

/// Nearest hit along a move, including the world edge
pub(crate) fn first_hit<'a>(
    subject: &'a Entity,
    direction: Vec3,
    length: f32,
    bounds: &dyn WorldBounds,
    candidates: impl IntoIterator<Item = &'a EntityRef>,
) -> Option<f32> {
    let sphere = subject.sphere();
    let ray = Ray::new(sphere.center, direction, length)?;

    let wall = bounds.exit_distance(&ray, sphere.radius);
    others(subject, candidates)
        .filter_map(|other| other.sphere().inflated(sphere.radius).intersect_ray(&ray))
        .chain(wall)
        .min_by(f32::total_cmp)
}

/// Candidate closest to `subject`, with its distance
pub(crate) fn nearest<'a>(
    subject: &'a Entity,
    candidates: impl IntoIterator<Item = &'a EntityRef>,
) -> Option<(EntityRef, f32)> {
    let center = subject.position();
    others(subject, candidates)
        .map(|other| (other, (other.position() - center).magnitude()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(other, distance)| (other.clone(), distance))
}

/// Candidates whose centers lie within `radius` of `subject`
pub(crate) fn within<'a>(
    subject: &'a Entity,
    radius: f32,
    candidates: impl IntoIterator<Item = &'a EntityRef>,
) -> Vec<EntityRef> {
    let center = subject.position();
    let radius_sq = radius * radius;
    others(subject, candidates)
        .filter(|other| (other.position() - center).magnitude_squared() <= radius_sq)
        .cloned()
        .collect()
}
