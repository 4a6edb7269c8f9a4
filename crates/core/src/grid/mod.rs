//! Spatial grid engine
//!
//! Grid definition, cell-hash addressing, bounding-box matching and
//! geometry-to-cell allocation.

pub mod allocator;
pub mod cache;
pub mod cell_hash;
pub mod clipping;
pub mod definition;
pub mod spatial_grid;

pub use allocator::{Allocation, CellEfficiency, GeometryCellAllocator};
pub use cache::{BoundedCache, CacheStats};
pub use cell_hash::{CellHash, CellHashError, CellIndex};
pub use definition::{
    project, unproject, GridDefinition, GridDefinitionRecord, GridError, VerticalOrigin,
};
pub use spatial_grid::{BoundingBox, CellBounds, CellColumn, SpatialGrid3D};
