//! Chunk grid geometry
//!
//! The world box is cut into cubes of `chunk_size`, padded by two chunks on
//! every side so entities near the world edge still have a full ring of
//! neighbors. Residency is decided purely by index arithmetic, which makes
//! every position belong to exactly one chunk.

use crate::foundation::math::{utils, Vec3};
use crate::spatial::BoundingBox;

/// Chunks of padding added on each side of the world
pub const GRID_PADDING: usize = 2;

/// Number of scheduling colors in three dimensions
pub const COLOR_COUNT: usize = 8;

/// Immutable layout of a chunk grid
#[derive(Debug, Clone)]
pub struct GridLayout {
    origin: Vec3,
    chunk_size: f32,
    halo_width: f32,
    dims: [usize; 3],
    neighbors: Vec<Vec<usize>>,
}

impl GridLayout {
    /// Lay out chunks over `world`
    pub fn new(world: &BoundingBox, chunk_size: f32, halo_width: f32) -> Self {
        let size = world.size();
        let mut dims = [0usize; 3];
        for axis in 0..3 {
            let cells = (size[axis] / chunk_size).ceil().max(1.0) as usize;
            dims[axis] = cells + 2 * GRID_PADDING;
        }
        let origin = world.min - utils::splat(GRID_PADDING as f32 * chunk_size);

        let mut layout = Self {
            origin,
            chunk_size,
            halo_width,
            dims,
            neighbors: Vec::new(),
        };
        layout.neighbors = (0..layout.chunk_count()).map(|i| layout.compute_neighbors(i)).collect();
        layout
    }

    fn compute_neighbors(&self, index: usize) -> Vec<usize> {
        let [x, y, z] = self.coord(index);
        let mut result = Vec::with_capacity(26);
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let n = [x as i64 + dx, y as i64 + dy, z as i64 + dz];
                    if (0..3).all(|a| n[a] >= 0 && (n[a] as usize) < self.dims[a]) {
                        result.push(self.flat([n[0] as usize, n[1] as usize, n[2] as usize]));
                    }
                }
            }
        }
        result
    }

    /// Total number of chunks including padding
    pub fn chunk_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Chunks per axis including padding
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Edge length of one chunk
    pub fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    /// Distance from a chunk box within which entities are mirrored into it
    pub fn halo_width(&self) -> f32 {
        self.halo_width
    }

    /// Flat index of grid coordinates
    pub fn flat(&self, [x, y, z]: [usize; 3]) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    /// Grid coordinates of a flat index
    pub fn coord(&self, index: usize) -> [usize; 3] {
        let x = index % self.dims[0];
        let y = (index / self.dims[0]) % self.dims[1];
        let z = index / (self.dims[0] * self.dims[1]);
        [x, y, z]
    }

    /// Grid coordinates of the chunk owning `position`, clamped to the grid
    pub fn coord_of(&self, position: Vec3) -> [usize; 3] {
        let mut coord = [0usize; 3];
        for axis in 0..3 {
            let cell = ((position[axis] - self.origin[axis]) / self.chunk_size).floor();
            let max = (self.dims[axis] - 1) as f32;
            coord[axis] = cell.clamp(0.0, max) as usize;
        }
        coord
    }

    /// Flat index of the chunk owning `position`
    pub fn chunk_index_of(&self, position: Vec3) -> usize {
        self.flat(self.coord_of(position))
    }

    /// Box covered by a chunk
    pub fn chunk_box(&self, index: usize) -> BoundingBox {
        let [x, y, z] = self.coord(index);
        let min = self.origin + Vec3::new(x as f32, y as f32, z as f32) * self.chunk_size;
        BoundingBox::new(min, min + utils::splat(self.chunk_size))
    }

    /// True if `position` lies within the halo band of chunk `index`
    pub fn within_halo(&self, index: usize, position: Vec3) -> bool {
        self.chunk_box(index).min_distance_squared(position) <= self.halo_width * self.halo_width
    }

    /// Up to 26 chunks sharing a face, edge or corner with `index`
    pub fn neighbors(&self, index: usize) -> &[usize] {
        &self.neighbors[index]
    }

    /// Scheduling color; chunks of one color never neighbor each other
    pub fn color(&self, index: usize) -> usize {
        let [x, y, z] = self.coord(index);
        x % 2 + 2 * (y % 2) + 4 * (z % 2)
    }

    /// Chunks whose boxes overlap `query`
    pub fn chunks_overlapping(&self, query: &BoundingBox) -> impl Iterator<Item = usize> + '_ {
        let low = self.coord_of(query.min);
        let high = self.coord_of(query.max);
        (low[2]..=high[2]).flat_map(move |z| {
            (low[1]..=high[1])
                .flat_map(move |y| (low[0]..=high[0]).map(move |x| self.flat([x, y, z])))
        })
    }

    /// Chunks at Chebyshev distance exactly `ring` from `center`
    pub fn shell(&self, center: [usize; 3], ring: usize) -> Vec<usize> {
        let span = |axis: usize| {
            let low = center[axis].saturating_sub(ring);
            let high = (center[axis] + ring).min(self.dims[axis] - 1);
            low..=high
        };
        let mut result = Vec::new();
        for z in span(2) {
            for y in span(1) {
                for x in span(0) {
                    let distance = [x, y, z]
                        .iter()
                        .zip(center.iter())
                        .map(|(a, b)| a.abs_diff(*b))
                        .max()
                        .unwrap_or(0);
                    if distance == ring {
                        result.push(self.flat([x, y, z]));
                    }
                }
            }
        }
        result
    }

    /// Largest ring needed to cover the grid from any chunk
    pub fn max_ring(&self) -> usize {
        self.dims.iter().copied().max().unwrap_or(1)
    }
}
