//! Entity identity generation

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::foundation::math::{utils, Vec3};

/// Unique entity identifier
///
/// Derived from the spawn tick, the spawn position and the parent's id so
/// that ids are reproducible for a given run. Collisions are astronomically
/// unlikely but not cryptographically ruled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn fold_mix(state: u64, value: u64, tweak: u64) -> u64 {
    splitmix64(state ^ value.wrapping_mul(tweak))
}

impl EntityId {
    /// Wrap a raw id (tests, imported snapshots)
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Derive an id for an entity spawned at `tick` and `position`
    pub fn derive(tick: u64, position: &Vec3, parent: Option<EntityId>) -> Self {
        let parent_bits = parent.map_or(0x5851_F42D_4C95_7F2D, |p| p.0);
        let mut state = splitmix64(tick);
        state = fold_mix(state, utils::position_bits(position), 0x9E37_79B9);
        state = fold_mix(state, parent_bits, 0xC2B2_AE35);
        Self(splitmix64(state ^ 0xD1B5_4A32_4F3A_9E55))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:016x}", self.0)
    }
}
