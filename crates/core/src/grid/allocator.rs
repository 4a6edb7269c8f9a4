//! Geometry-to-cell allocation
//!
//! For every cell a geometry touches, the allocator computes the fraction of
//! the geometry's quantity that belongs to that cell ("efficiency"):
//!
//! - XY: intersected area over total area for points and polygons, intersected
//!   length over total length for lines. A point has XY efficiency 1.0 in the
//!   single column whose half-open footprint contains it.
//! - Z: overlap of the geometry's vertical extent with the cell's layer over
//!   the extent's height. A zero-height extent gets 1.0 in the layer
//!   containing it.
//!
//! The cell efficiency is `xy * z`, with `xy` computed once per column.
//! Multi-part geometries are split across members in proportion to each
//! member's share of the total area or length, then summed per cell.

use crate::core_types::{Coord, Geometry, GeometryError, Polygon, Shape, VerticalExtent};
use crate::grid::cache::{BoundedCache, CacheStats};
use crate::grid::cell_hash::{CellHash, CellIndex};
use crate::grid::clipping::{self, Rect};
use crate::grid::spatial_grid::{BoundingBox, SpatialGrid3D};
use nalgebra::Point3;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Default number of memoized geometry allocations
pub const DEFAULT_ALLOCATION_CACHE_CAPACITY: usize = 4096;

/// Allocated fractions below this are treated as complete
pub const ALLOCATION_TOLERANCE: f64 = 1e-9;

/// Fraction of a geometry's quantity attributed to one cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellEfficiency {
    pub hash: CellHash,
    pub efficiency: f64,
}

/// Result of allocating one geometry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Allocation {
    /// Non-zero efficiencies in ascending hash order
    pub cells: Vec<CellEfficiency>,
    /// Sum of all efficiencies; below 1.0 when the geometry leaves the grid
    pub allocated_fraction: f64,
}

impl Allocation {
    fn from_map(map: BTreeMap<CellHash, f64>) -> Self {
        let cells: Vec<CellEfficiency> = map
            .into_iter()
            .filter(|(_, e)| *e > 0.0)
            .map(|(hash, efficiency)| CellEfficiency { hash, efficiency })
            .collect();
        let allocated_fraction = cells.iter().map(|c| c.efficiency).sum();
        Self {
            cells,
            allocated_fraction,
        }
    }

    /// Whether part of the quantity fell outside the grid
    pub fn is_under_allocated(&self) -> bool {
        self.allocated_fraction < 1.0 - ALLOCATION_TOLERANCE
    }

    /// Efficiency of one cell, 0.0 when untouched
    pub fn efficiency(&self, hash: &CellHash) -> f64 {
        self.cells
            .binary_search_by(|c| c.hash.cmp(hash))
            .map_or(0.0, |i| self.cells[i].efficiency)
    }
}

/// Single-part planar shape borrowed from a [`Shape`]
#[derive(Clone, Copy)]
enum Part<'a> {
    Point(&'a Coord),
    Line(&'a [Coord]),
    Polygon(&'a Polygon),
}

impl Part<'_> {
    /// Area for polygons, length for lines
    fn measure(&self) -> f64 {
        match self {
            Part::Point(_) => 1.0,
            Part::Line(line) => clipping::line_length(line),
            Part::Polygon(polygon) => clipping::polygon_area(polygon),
        }
    }

    fn bounds(&self) -> (Coord, Coord) {
        let coords: &[Coord] = match self {
            Part::Point(c) => std::slice::from_ref(*c),
            Part::Line(line) => line,
            Part::Polygon(polygon) => &polygon.exterior,
        };
        let mut min = Coord::new(f64::INFINITY, f64::INFINITY);
        let mut max = Coord::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for c in coords {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
        (min, max)
    }

    /// Share of this part inside `footprint`; `total` is the part's measure
    fn xy_efficiency(&self, footprint: &Rect, total: f64) -> f64 {
        match self {
            Part::Point(c) => {
                if footprint.contains_half_open(c) {
                    1.0
                } else {
                    0.0
                }
            }
            Part::Line(line) => clipping::line_overlap_length(line, footprint) / total,
            Part::Polygon(polygon) => clipping::polygon_overlap_area(polygon, footprint) / total,
        }
    }
}

fn parts(shape: &Shape) -> Vec<Part<'_>> {
    match shape {
        Shape::Point(c) => vec![Part::Point(c)],
        Shape::LineString(line) => vec![Part::Line(line)],
        Shape::Polygon(polygon) => vec![Part::Polygon(polygon)],
        Shape::MultiLineString(lines) => lines.iter().map(|l| Part::Line(l)).collect(),
        Shape::MultiPolygon(polygons) => polygons.iter().map(Part::Polygon).collect(),
    }
}

/// Computes and memoizes per-cell efficiencies for geometries on one grid
#[derive(Debug)]
pub struct GeometryCellAllocator {
    grid: Arc<SpatialGrid3D>,
    cache: BoundedCache<String, Arc<Allocation>>,
}

impl GeometryCellAllocator {
    pub fn new(grid: Arc<SpatialGrid3D>) -> Self {
        Self::with_cache_capacity(grid, DEFAULT_ALLOCATION_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(grid: Arc<SpatialGrid3D>, capacity: usize) -> Self {
        Self {
            grid,
            cache: BoundedCache::new(capacity),
        }
    }

    pub fn grid(&self) -> &Arc<SpatialGrid3D> {
        &self.grid
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Allocate a geometry, reusing the memoized result for identical geometries
    ///
    /// # Errors
    /// Returns a [`GeometryError`] for invalid or zero-measure geometries.
    pub fn allocate(&self, geometry: &Geometry) -> Result<Arc<Allocation>, GeometryError> {
        let key = geometry.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let allocation = Arc::new(self.compute(geometry)?);
        self.cache.insert(key, Arc::clone(&allocation));
        Ok(allocation)
    }

    /// Allocate many geometries, computing distinct uncached ones in parallel
    ///
    /// Results are keyed by [`Geometry::cache_key`].
    pub fn allocate_all<'a, I>(
        &self,
        geometries: I,
    ) -> FxHashMap<String, Result<Arc<Allocation>, GeometryError>>
    where
        I: IntoIterator<Item = &'a Geometry>,
    {
        let mut results = FxHashMap::default();
        let mut pending: Vec<(String, &Geometry)> = Vec::new();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for geometry in geometries {
            let key = geometry.cache_key();
            if !seen.insert(key.clone()) {
                continue;
            }
            match self.cache.get(&key) {
                Some(hit) => {
                    results.insert(key, Ok(hit));
                }
                None => pending.push((key, geometry)),
            }
        }

        debug!(
            cached = results.len(),
            computing = pending.len(),
            "Allocating geometries"
        );

        let computed: Vec<(String, Result<Allocation, GeometryError>)> = pending
            .into_par_iter()
            .map(|(key, geometry)| (key, self.compute(geometry)))
            .collect();

        for (key, result) in computed {
            let result = result.map(Arc::new);
            if let Ok(allocation) = &result {
                self.cache.insert(key.clone(), Arc::clone(allocation));
            }
            results.insert(key, result);
        }
        results
    }

    /// Allocate without consulting the cache
    ///
    /// # Errors
    /// Returns a [`GeometryError`] for invalid or zero-measure geometries.
    pub fn compute(&self, geometry: &Geometry) -> Result<Allocation, GeometryError> {
        geometry.validate()?;
        let vertical = geometry
            .vertical
            .unwrap_or_else(|| VerticalExtent::at(self.grid.definition().reference_altitude_m()));

        let parts = parts(&geometry.shape);
        let measures: Vec<f64> = parts.iter().map(Part::measure).collect();
        let total: f64 = measures.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            let what = match geometry.shape {
                Shape::LineString(_) | Shape::MultiLineString(_) => "length",
                _ => "area",
            };
            return Err(GeometryError::Degenerate(what));
        }

        let mut cells: BTreeMap<CellHash, f64> = BTreeMap::new();
        for (part, measure) in parts.iter().zip(&measures) {
            // Zero-measure members of a multi-geometry carry no share
            if *measure <= 0.0 {
                continue;
            }
            let weight = measure / total;
            self.accumulate_part(part, *measure, weight, &vertical, &mut cells);
        }
        Ok(Allocation::from_map(cells))
    }

    fn accumulate_part(
        &self,
        part: &Part<'_>,
        measure: f64,
        weight: f64,
        vertical: &VerticalExtent,
        cells: &mut BTreeMap<CellHash, f64>,
    ) {
        let (min, max) = part.bounds();
        let bbox = BoundingBox::new(
            Point3::new(min.x, min.y, vertical.z_min),
            Point3::new(max.x, max.y, vertical.z_max),
        );
        let height = vertical.height();

        for column in self.grid.match_bounding_box_columns(&bbox) {
            let footprint = self.grid.column_footprint(column.x, column.y);
            let xy = part.xy_efficiency(&footprint, measure);
            if xy <= 0.0 {
                continue;
            }
            for z in column.levels {
                let (lo, hi) = self.grid.level_range(z);
                let z_eff = if height > 0.0 {
                    clipping::interval_overlap(vertical.z_min, vertical.z_max, lo, hi) / height
                } else if vertical.z_min >= lo && vertical.z_min < hi {
                    1.0
                } else {
                    0.0
                };
                if z_eff <= 0.0 {
                    continue;
                }
                if let Ok(hash) = CellHash::encode(CellIndex::new(column.x, column.y, z)) {
                    *cells.entry(hash).or_insert(0.0) += weight * xy * z_eff;
                }
            }
        }
    }
}
