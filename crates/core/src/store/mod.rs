//! Inventory store collaborator
//!
//! The pipeline reads the study's time series, ambient conditions and grid
//! definition through [`InventoryStore`] and writes the grid definition and
//! cell-coordinate table back. [`MemoryStore`] is an in-memory implementation
//! that persists as JSON.

mod memory;

pub use memory::MemoryStore;

use crate::core_types::{AmbientCondition, InventoryTime};
use crate::grid::{CellBounds, CellHash, GridDefinition, GridError};
use chrono::NaiveDateTime;

/// Store access errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A lookup found nothing
    #[error("no {0} found")]
    NotFound(&'static str),
    /// A persisted grid definition failed validation
    #[error("stored grid definition is invalid: {0}")]
    InvalidGrid(#[from] GridError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tabular lookups the pipeline needs from persistent storage
pub trait InventoryStore {
    /// The ordered inventory time series
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when no time series is stored.
    fn time_series(&self) -> Result<Vec<InventoryTime>, StoreError>;

    /// Ambient record closest in time to `at`
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when no record exists.
    fn nearest_ambient_condition(&self, at: NaiveDateTime) -> Result<AmbientCondition, StoreError>;

    /// The stored grid definition
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when none is stored.
    fn grid_definition(&self) -> Result<GridDefinition, StoreError>;

    /// Replace the stored grid definition
    ///
    /// # Errors
    /// Returns an error if the definition cannot be written.
    fn save_grid_definition(&mut self, definition: &GridDefinition) -> Result<(), StoreError>;

    /// Replace the cell-coordinates table; returns the number of rows written
    ///
    /// # Errors
    /// Returns an error if the rows cannot be written.
    fn save_cell_coordinates(
        &mut self,
        rows: &mut dyn Iterator<Item = (CellHash, CellBounds)>,
    ) -> Result<usize, StoreError>;
}
