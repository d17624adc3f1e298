//! Spatial partitioning data structures
//!
//! Every backend implements [`SpatialIndex`]: the halo-zone [`ChunkGrid`],
//! its multi-threaded [`ConcurrentChunkGrid`] variant and the R-tree backed
//! [`RTreeIndex`]. Backends only differ in how they gather candidates; the
//! exact sphere tests are shared.

pub mod bounding_box;
mod bounds;
pub mod chunk_grid;
pub mod concurrent_grid;
mod narrow_phase;
pub mod rtree;
pub mod rtree_index;
pub mod spatial_index;

#[cfg(test)]
mod tests;

pub use bounding_box::{BoundingBox, GEOMETRY_EPSILON};
pub use bounds::{BoxBounds, WorldBounds};
pub use chunk_grid::{ChunkGrid, GridLayout, LocalQueue, SharedQueue, TransferQueue, OVERSIZED_CHUNK_FACTOR};
pub use concurrent_grid::ConcurrentChunkGrid;
pub use rtree::{NodeKey, RTree, TreeEntry, TreeId};
pub use rtree_index::RTreeIndex;
pub use spatial_index::{CollisionQuery, IndexError, Schedule, SpatialIndex};
