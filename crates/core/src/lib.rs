//! Airport Emission Inventory Core Library
//!
//! Steps an airport emission study through its time series. For every interval,
//! source modules produce geometry-tagged emissions, which are stored per
//! source and handed to dispersion modules that rasterize them onto a 3D grid
//! around the airport reference point.
//!
//! ## Grid Rasterization
//!
//! - Web Mercator projected grid centered on the airport reference point
//! - Fixed-width `xxxxx|yyyyy|zzzzz` cell hashes
//! - Point, line and polygon geometries split into per-cell efficiencies
//! - Memoized allocations shared across sources with identical geometries

// Core types and utilities
pub mod core_types;

// Grid and geometry allocation
pub mod grid;

// Module contracts and the run loop
pub mod modules;
pub mod pipeline;
pub mod store;

// Built-in modules
pub mod dispersion;
pub mod sources;

pub mod config;

// Re-export core types
pub use core_types::{AmbientCondition, Emission, Geometry, InventoryTime, Pollutant, Quantities};

// Re-export grid types
pub use grid::{CellHash, GeometryCellAllocator, GridDefinition, SpatialGrid3D, VerticalOrigin};

// Re-export run types
pub use config::{ModuleSelection, StudyConfig};
pub use modules::{DispersionModule, DispersionRegistry, SourceModule, SourceRegistry};
pub use pipeline::{CancellationToken, EmissionStore, RunMonitor, RunOutcome, TimeSeriesPipeline};
pub use store::{InventoryStore, MemoryStore};
