//! In-memory, JSON-persistable inventory store

use crate::core_types::{nearest_by_time, AmbientCondition, InventoryTime};
use crate::grid::{CellBounds, CellHash, GridDefinition};
use crate::store::{InventoryStore, StoreError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Inventory tables held in memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStore {
    pub time_series: Vec<InventoryTime>,
    pub ambient_conditions: Vec<AmbientCondition>,
    pub grid: Option<GridDefinition>,
    pub cell_coordinates: BTreeMap<CellHash, CellBounds>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_series(mut self, series: Vec<InventoryTime>) -> Self {
        self.time_series = series;
        self
    }

    pub fn with_ambient_conditions(mut self, records: Vec<AmbientCondition>) -> Self {
        self.ambient_conditions = records;
        self
    }

    pub fn with_grid(mut self, definition: GridDefinition) -> Self {
        self.grid = Some(definition);
        self
    }

    /// Load a store from a JSON file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save the store as pretty JSON
    ///
    /// # Errors
    /// Returns error if the store cannot be serialized or the file written
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl InventoryStore for MemoryStore {
    fn time_series(&self) -> Result<Vec<InventoryTime>, StoreError> {
        if self.time_series.is_empty() {
            return Err(StoreError::NotFound("time series"));
        }
        Ok(self.time_series.clone())
    }

    fn nearest_ambient_condition(&self, at: NaiveDateTime) -> Result<AmbientCondition, StoreError> {
        nearest_by_time(&self.ambient_conditions, at)
            .cloned()
            .ok_or(StoreError::NotFound("ambient condition"))
    }

    fn grid_definition(&self) -> Result<GridDefinition, StoreError> {
        self.grid
            .clone()
            .ok_or(StoreError::NotFound("grid definition"))
    }

    fn save_grid_definition(&mut self, definition: &GridDefinition) -> Result<(), StoreError> {
        self.grid = Some(definition.clone());
        Ok(())
    }

    fn save_cell_coordinates(
        &mut self,
        rows: &mut dyn Iterator<Item = (CellHash, CellBounds)>,
    ) -> Result<usize, StoreError> {
        self.cell_coordinates.clear();
        self.cell_coordinates.extend(rows);
        debug!(rows = self.cell_coordinates.len(), "Saved cell coordinates");
        Ok(self.cell_coordinates.len())
    }
}
