//! 3D spatial grid: coordinate/index conversion and cell matching
//!
//! Maps continuous projected coordinates onto the discrete cell-hash address
//! space and resolves bounding boxes to the cells they touch.
//!
//! Index conversion is deliberately asymmetric: coordinates below the grid
//! origin clamp to index 0 (tolerating points marginally outside the grid),
//! while coordinates past the far edge keep their out-of-range index. Those
//! indices never name a cell; bounding-box enumeration drops them and the
//! allocator reports the missing share as under-allocation.

use crate::grid::cache::BoundedCache;
use crate::grid::cell_hash::{CellHash, CellHashError, CellIndex};
use crate::grid::clipping::Rect;
use crate::grid::definition::GridDefinition;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Default number of memoized cell centers
pub const DEFAULT_CENTER_CACHE_CAPACITY: usize = 1 << 16;

/// Axis-aligned 3D box in the projected frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub z_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub z_max: f64,
}

impl BoundingBox {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self {
            x_min: min.x,
            y_min: min.y,
            z_min: min.z,
            x_max: max.x,
            y_max: max.y,
            z_max: max.z,
        }
    }

    /// Finite bounds with every minimum at or below its maximum
    pub fn is_valid(&self) -> bool {
        let values = [
            self.x_min, self.y_min, self.z_min, self.x_max, self.y_max, self.z_max,
        ];
        values.iter().all(|v| v.is_finite())
            && self.x_min <= self.x_max
            && self.y_min <= self.y_max
            && self.z_min <= self.z_max
    }
}

/// Spatial extent of one cell, as persisted in the cell-coordinates table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl CellBounds {
    pub fn center(&self) -> Point3<f64> {
        Point3::new(
            (self.x_min + self.x_max) * 0.5,
            (self.y_min + self.y_max) * 0.5,
            (self.z_min + self.z_max) * 0.5,
        )
    }

    /// XY footprint
    pub fn footprint(&self) -> Rect {
        Rect::new(self.x_min, self.y_min, self.x_max, self.y_max)
    }
}

/// A vertical column of matched cells sharing one `(x, y)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellColumn {
    pub x: u32,
    pub y: u32,
    /// Matched z indices, ascending
    pub levels: Vec<u32>,
}

/// Regular 3D grid over a [`GridDefinition`]
#[derive(Debug)]
pub struct SpatialGrid3D {
    definition: GridDefinition,
    centers: BoundedCache<CellHash, Point3<f64>>,
}

impl SpatialGrid3D {
    pub fn new(definition: GridDefinition) -> Self {
        Self::with_cache_capacity(definition, DEFAULT_CENTER_CACHE_CAPACITY)
    }

    /// Grid with a custom bound on memoized cell centers
    pub fn with_cache_capacity(definition: GridDefinition, capacity: usize) -> Self {
        Self {
            definition,
            centers: BoundedCache::new(capacity),
        }
    }

    pub fn definition(&self) -> &GridDefinition {
        &self.definition
    }

    /// Convert a projected coordinate to cell indices
    ///
    /// Negative indices clamp to 0; indices at or beyond the cell count are
    /// returned as-is and must be checked with [`Self::contains_index`].
    pub fn coordinates_to_indices(&self, x: f64, y: f64, z: f64) -> CellIndex {
        let origin = self.definition.origin();
        let [rx, ry, rz] = self.definition.resolution();
        let to_index = |value: f64, origin: f64, resolution: f64| -> u32 {
            // Saturating float->int cast; NaN maps to 0
            ((value - origin) / resolution).floor().max(0.0) as u32
        };
        CellIndex::new(
            to_index(x, origin.x, rx),
            to_index(y, origin.y, ry),
            to_index(z, origin.z, rz),
        )
    }

    /// Whether an index triple names a cell of this grid
    pub fn contains_index(&self, index: CellIndex) -> bool {
        let [nx, ny, nz] = self.definition.cells();
        index.x < nx && index.y < ny && index.z < nz
    }

    pub fn indices_to_cell_hash(&self, index: CellIndex) -> Result<CellHash, CellHashError> {
        CellHash::encode(index)
    }

    pub fn cell_hash_to_indices(&self, hash: &CellHash) -> CellIndex {
        hash.decode()
    }

    /// Every cell touched by `bbox`, in ascending hash order
    ///
    /// An invalid box is logged and yields no cells.
    pub fn match_bounding_box(&self, bbox: &BoundingBox) -> Vec<CellHash> {
        self.match_bounding_box_columns(bbox)
            .into_iter()
            .flat_map(|column| {
                column.levels.into_iter().filter_map(move |z| {
                    CellHash::encode(CellIndex::new(column.x, column.y, z)).ok()
                })
            })
            .collect()
    }

    /// Cells touched by `bbox`, grouped into `(x, y)` columns
    ///
    /// Grouping lets callers compute the XY overlap once per column.
    pub fn match_bounding_box_columns(&self, bbox: &BoundingBox) -> Vec<CellColumn> {
        if !bbox.is_valid() {
            error!(?bbox, "Invalid bounding box, no cells matched");
            return Vec::new();
        }
        let lo = self.coordinates_to_indices(bbox.x_min, bbox.y_min, bbox.z_min);
        let hi = self.coordinates_to_indices(bbox.x_max, bbox.y_max, bbox.z_max);
        let [nx, ny, nz] = self.definition.cells();

        // Cell counts are at least 1, so `n - 1` is the last valid index
        let levels: Vec<u32> = (lo.z..=hi.z.min(nz - 1)).collect();
        if levels.is_empty() {
            return Vec::new();
        }

        let mut columns = Vec::new();
        for x in lo.x..=hi.x.min(nx - 1) {
            for y in lo.y..=hi.y.min(ny - 1) {
                columns.push(CellColumn {
                    x,
                    y,
                    levels: levels.clone(),
                });
            }
        }
        columns
    }

    /// Spatial extent of the cell at `index`
    pub fn index_bounds(&self, index: CellIndex) -> CellBounds {
        let origin = self.definition.origin();
        let [rx, ry, rz] = self.definition.resolution();
        let x_min = origin.x + f64::from(index.x) * rx;
        let y_min = origin.y + f64::from(index.y) * ry;
        let z_min = origin.z + f64::from(index.z) * rz;
        CellBounds {
            x_min,
            x_max: x_min + rx,
            y_min,
            y_max: y_min + ry,
            z_min,
            z_max: z_min + rz,
        }
    }

    /// Spatial extent of the cell named by `hash`
    pub fn cell_bounds(&self, hash: &CellHash) -> CellBounds {
        self.index_bounds(hash.decode())
    }

    /// XY footprint of column `(x, y)`
    pub fn column_footprint(&self, x: u32, y: u32) -> Rect {
        self.index_bounds(CellIndex::new(x, y, 0)).footprint()
    }

    /// Vertical range `[z_min, z_max)` of level `z`
    pub fn level_range(&self, z: u32) -> (f64, f64) {
        let bounds = self.index_bounds(CellIndex::new(0, 0, z));
        (bounds.z_min, bounds.z_max)
    }

    /// Geometric center of a cell, memoized
    pub fn cell_hash_to_center_coordinates(&self, hash: &CellHash) -> Point3<f64> {
        self.centers
            .get_or_insert_with(hash.clone(), || self.cell_bounds(hash).center())
    }

    /// Center cache hit/miss counters
    pub fn center_cache_stats(&self) -> crate::grid::cache::CacheStats {
        self.centers.stats()
    }

    /// Every cell of the grid with its bounds, in ascending hash order
    pub fn cell_coordinates(&self) -> impl Iterator<Item = (CellHash, CellBounds)> + '_ {
        let [nx, ny, nz] = self.definition.cells();
        (0..nx).flat_map(move |x| {
            (0..ny).flat_map(move |y| {
                (0..nz).filter_map(move |z| {
                    let index = CellIndex::new(x, y, z);
                    CellHash::encode(index)
                        .ok()
                        .map(|hash| (hash, self.index_bounds(index)))
                })
            })
        })
    }
}
