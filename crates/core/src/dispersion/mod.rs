//! Grid rasterization of interval emissions
//!
//! [`GridRasterizer`] turns one interval's emissions into normalized per-cell
//! tables; [`GridDispersionModule`] wraps it as a dispersion module.

pub mod axis;
pub mod module;
pub mod rasterizer;

pub use axis::{Axis, AxisSequence, AxisSequenceError, AxisStep};
pub use module::{GridDispersionModule, GridDispersionOptions, TableSink};
pub use rasterizer::{CellValueTable, GridRasterizer};

use crate::modules::{DispersionModule, DispersionRegistry};

/// Register the built-in dispersion modules
///
/// When `sink` is given, every [`GridDispersionModule`] created by the
/// registry pushes its tables into it.
pub fn register_builtin(registry: &mut DispersionRegistry, sink: Option<TableSink>) {
    registry.register(GridDispersionModule::NAME, move || -> Box<dyn DispersionModule> {
        match &sink {
            Some(sink) => Box::new(GridDispersionModule::with_sink(sink.clone())),
            None => Box::new(GridDispersionModule::new()),
        }
    });
}
