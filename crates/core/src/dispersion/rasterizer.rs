//! Rasterizing an interval's emissions onto the grid
//!
//! Per interval, every emission's geometry is allocated to cells, per-cell
//! totals are accumulated, and each pollutant is normalized by its interval
//! total. Distinct geometries are allocated once (and in parallel); the
//! accumulation itself is a single-writer reduction.

use crate::core_types::{Pollutant, Quantities};
use crate::dispersion::axis::AxisSequence;
use crate::grid::{CellHash, GeometryCellAllocator, SpatialGrid3D};
use crate::modules::SourceEmissions;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Gridded values of one pollutant for one interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellValueTable {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub pollutant: Pollutant,
    /// Absolute interval total over every emission, rasterized or not
    pub total: f64,
    /// Absolute amount per touched cell
    pub values: BTreeMap<CellHash, f64>,
    /// `values / total`; empty when the total is zero
    pub normalized: BTreeMap<CellHash, f64>,
    /// Order used for [`Self::matrix`]
    pub axis_sequence: AxisSequence,
    /// Extent of [`Self::matrix`] along each sequence entry, outermost first
    pub shape: [u32; 3],
    /// Grid cell counts `[x, y, z]`
    pub grid_cells: [u32; 3],
}

impl CellValueTable {
    /// Sum of the per-cell absolute values
    pub fn rasterized_total(&self) -> f64 {
        self.values.values().sum()
    }

    /// Normalized value of one cell, 0.0 when untouched
    pub fn normalized_value(&self, hash: &CellHash) -> f64 {
        self.normalized.get(hash).copied().unwrap_or(0.0)
    }

    /// Normalized value of every grid cell, in axis-sequence order
    ///
    /// Built from the touched cells only; the table itself stays sparse.
    pub fn matrix(&self) -> Vec<f64> {
        let len = self.grid_cells.iter().map(|&c| c as usize).product();
        let mut matrix = vec![0.0; len];
        for (hash, value) in &self.normalized {
            if let Some(offset) = self.axis_sequence.position(hash.decode(), self.grid_cells) {
                matrix[offset] = *value;
            }
        }
        matrix
    }
}

/// Routes emissions through a [`GeometryCellAllocator`]
#[derive(Debug)]
pub struct GridRasterizer {
    allocator: GeometryCellAllocator,
    axis_sequence: AxisSequence,
}

impl GridRasterizer {
    pub fn new(grid: Arc<SpatialGrid3D>, axis_sequence: AxisSequence) -> Self {
        Self {
            allocator: GeometryCellAllocator::new(grid),
            axis_sequence,
        }
    }

    pub fn allocator(&self) -> &GeometryCellAllocator {
        &self.allocator
    }

    pub fn axis_sequence(&self) -> AxisSequence {
        self.axis_sequence
    }

    /// Absolute per-cell totals of every pollutant, plus the interval totals
    ///
    /// Emissions without a usable geometry are skipped with a warning but
    /// still count towards the interval totals.
    pub fn accumulate(
        &self,
        emissions: &[SourceEmissions],
    ) -> (BTreeMap<CellHash, Quantities>, Quantities) {
        let geometries = emissions
            .iter()
            .flat_map(|s| s.emissions.iter())
            .filter_map(|e| e.geometry.as_ref());
        let allocations = self.allocator.allocate_all(geometries);

        let mut cells: BTreeMap<CellHash, Quantities> = BTreeMap::new();
        let mut totals = Quantities::ZERO;
        for source in emissions {
            for emission in &source.emissions {
                totals = totals.add(&emission.quantities);
                if emission.quantities.is_zero() {
                    continue;
                }
                let Some(geometry) = &emission.geometry else {
                    warn!(source = %source.source, "Emission has no geometry, skipped");
                    continue;
                };
                let allocation = match allocations.get(&geometry.cache_key()) {
                    Some(Ok(allocation)) => allocation,
                    Some(Err(e)) => {
                        warn!(
                            source = %source.source,
                            geometry = %geometry,
                            error = %e,
                            "Invalid geometry, emission skipped"
                        );
                        continue;
                    }
                    None => continue,
                };
                if allocation.is_under_allocated() {
                    warn!(
                        source = %source.source,
                        geometry = %geometry,
                        allocated = allocation.allocated_fraction,
                        "Geometry extends beyond the grid, emission under-allocated"
                    );
                }
                for cell in &allocation.cells {
                    let entry = cells.entry(cell.hash.clone()).or_default();
                    *entry = entry.add(&emission.quantities.scale(cell.efficiency));
                }
            }
        }
        (cells, totals)
    }

    /// One [`CellValueTable`] per requested pollutant
    pub fn rasterize(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        emissions: &[SourceEmissions],
        pollutants: &[Pollutant],
    ) -> Vec<CellValueTable> {
        let (cells, totals) = self.accumulate(emissions);
        debug!(cells = cells.len(), %start, "Rasterized interval");

        let grid_cells = self.allocator.grid().definition().cells();
        let shape = self.axis_sequence.shape(grid_cells);

        pollutants
            .iter()
            .map(|&pollutant| {
                let total = totals.get(pollutant);
                let values: BTreeMap<CellHash, f64> = cells
                    .iter()
                    .map(|(hash, q)| (hash.clone(), q.get(pollutant)))
                    .filter(|(_, v)| *v != 0.0)
                    .collect();
                let normalized: BTreeMap<CellHash, f64> = if total.abs() > 0.0 {
                    values
                        .iter()
                        .map(|(hash, v)| (hash.clone(), v / total.abs()))
                        .collect()
                } else {
                    BTreeMap::new()
                };
                CellValueTable {
                    start,
                    end,
                    pollutant,
                    total,
                    values,
                    normalized,
                    axis_sequence: self.axis_sequence,
                    shape,
                    grid_cells,
                }
            })
            .collect()
    }
}
