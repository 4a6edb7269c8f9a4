//! Study configuration
//!
//! A study is described by one JSON document: the grid, the time series, the
//! ambient records, and which modules run with which options.
//!
//! ```json
//! {
//!   "grid": { "x_cells": 40, "y_cells": 40, "z_cells": 10,
//!             "x_resolution_m": 250, "y_resolution_m": 250, "z_resolution_m": 50,
//!             "reference_latitude": 51.4700, "reference_longitude": -0.4543 },
//!   "time_series": { "start": "2024-06-01T00:00:00", "end": "2024-06-02T00:00:00",
//!                    "step_minutes": 60 },
//!   "source_modules": [ { "name": "StaticSource", "sources": ["boiler_house"],
//!                         "options": { "sources": { } } } ],
//!   "dispersion_modules": [ { "name": "GridDispersion" } ]
//! }
//! ```

use crate::core_types::{
    is_strictly_increasing, regular_series, AmbientCondition, InventoryTime,
    DEFAULT_MIXING_HEIGHT_M,
};
use crate::grid::GridDefinition;
use crate::modules::{DispersionRegistry, RegistryError, SourceRegistry};
use crate::pipeline::{PipelineError, TimeSeriesPipeline};
use crate::store::MemoryStore;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Errors loading, validating or applying a study configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read or write study file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse study file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid time series: {0}")]
    InvalidTimeSeries(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Time series given either as a regular range or as explicit entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSeriesConfig {
    /// `start..=end` every `step_minutes`
    Regular {
        start: NaiveDateTime,
        end: NaiveDateTime,
        step_minutes: i64,
        #[serde(default = "default_mixing_height")]
        mixing_height_m: f64,
    },
    Explicit(Vec<InventoryTime>),
}

fn default_mixing_height() -> f64 {
    DEFAULT_MIXING_HEIGHT_M
}

impl TimeSeriesConfig {
    /// Expand into the ordered series
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidTimeSeries`] when `step_minutes` is not
    /// positive or does not fit a duration.
    pub fn expand(&self) -> Result<Vec<InventoryTime>, ConfigError> {
        match self {
            TimeSeriesConfig::Regular {
                start,
                end,
                step_minutes,
                mixing_height_m,
            } => {
                if *step_minutes <= 0 {
                    return Err(ConfigError::InvalidTimeSeries(format!(
                        "step_minutes must be positive, got {step_minutes}"
                    )));
                }
                let step = Duration::try_minutes(*step_minutes).ok_or_else(|| {
                    ConfigError::InvalidTimeSeries(format!(
                        "step_minutes {step_minutes} is out of range"
                    ))
                })?;
                Ok(regular_series(*start, *end, step, *mixing_height_m))
            }
            TimeSeriesConfig::Explicit(series) => Ok(series.clone()),
        }
    }
}

/// One module to instantiate, by registered name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSelection {
    pub name: String,
    /// Sources the module is responsible for (source modules only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Free-form options parsed by the module itself
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
}

impl ModuleSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            options: serde_json::Value::Null,
        }
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }
}

/// Complete description of one study
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    pub grid: GridDefinition,
    pub time_series: TimeSeriesConfig,
    #[serde(default)]
    pub ambient_conditions: Vec<AmbientCondition>,
    #[serde(default)]
    pub source_modules: Vec<ModuleSelection>,
    #[serde(default)]
    pub dispersion_modules: Vec<ModuleSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl StudyConfig {
    /// Study with no modules and no ambient records
    pub fn new(grid: GridDefinition, time_series: TimeSeriesConfig) -> Self {
        Self {
            grid,
            time_series,
            ambient_conditions: Vec::new(),
            source_modules: Vec::new(),
            dispersion_modules: Vec::new(),
            output_dir: None,
        }
    }

    /// Load a study from a JSON file
    ///
    /// The grid definition is validated while parsing.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Save the study to a JSON file
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// The expanded, validated time series
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidTimeSeries`] when the step is out of
    /// range or the series is empty or not strictly increasing.
    pub fn time_series(&self) -> Result<Vec<InventoryTime>, ConfigError> {
        let series = self.time_series.expand()?;
        if series.is_empty() {
            return Err(ConfigError::InvalidTimeSeries("time series is empty".into()));
        }
        if !is_strictly_increasing(&series) {
            return Err(ConfigError::InvalidTimeSeries(
                "timestamps must be strictly increasing".into(),
            ));
        }
        Ok(series)
    }

    /// Check the time series and every module name before anything runs
    ///
    /// Returns the validated series.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(
        &self,
        sources: &SourceRegistry,
        dispersion: &DispersionRegistry,
    ) -> Result<Vec<InventoryTime>, ConfigError> {
        let series = self.time_series()?;
        for selection in &self.source_modules {
            if !sources.contains(&selection.name) {
                return Err(RegistryError::UnknownModule {
                    kind: sources.kind(),
                    name: selection.name.clone(),
                }
                .into());
            }
        }
        for selection in &self.dispersion_modules {
            if !dispersion.contains(&selection.name) {
                return Err(RegistryError::UnknownModule {
                    kind: dispersion.kind(),
                    name: selection.name.clone(),
                }
                .into());
            }
        }
        Ok(series)
    }

    /// In-memory store holding the study's tables
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidTimeSeries`] for an invalid series.
    pub fn to_store(&self) -> Result<MemoryStore, ConfigError> {
        Ok(MemoryStore::new()
            .with_time_series(self.time_series()?)
            .with_ambient_conditions(self.ambient_conditions.clone())
            .with_grid(self.grid.clone()))
    }

    /// Validate the study and assemble a pipeline from the registries
    ///
    /// # Errors
    /// Fails before any module is created if the time series is invalid or a
    /// module name is not registered.
    pub fn build_pipeline(
        &self,
        sources: &SourceRegistry,
        dispersion: &DispersionRegistry,
    ) -> Result<TimeSeriesPipeline, ConfigError> {
        let series = self.validate(sources, dispersion)?;
        let mut pipeline = TimeSeriesPipeline::new(self.grid.clone(), series)?;
        for selection in &self.source_modules {
            pipeline.add_source_module(
                sources.resolve(&selection.name)?,
                selection.sources.clone(),
                selection.options.clone(),
            );
        }
        for selection in &self.dispersion_modules {
            pipeline.add_dispersion_module(
                dispersion.resolve(&selection.name)?,
                selection.options.clone(),
            );
        }
        if let Some(dir) = &self.output_dir {
            pipeline.set_output_dir(dir);
        }
        info!(
            source_modules = self.source_modules.len(),
            dispersion_modules = self.dispersion_modules.len(),
            "Study pipeline assembled"
        );
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispersion::{self, GridDispersionModule};
    use crate::sources::{self, StaticSourceModule};
    use crate::store::InventoryStore;

    const STUDY: &str = r#"{
        "grid": {
            "x_cells": 8, "y_cells": 8, "z_cells": 4,
            "x_resolution_m": 250.0, "y_resolution_m": 250.0, "z_resolution_m": 50.0,
            "reference_latitude": 47.4647, "reference_longitude": 8.5492,
            "reference_altitude_m": 432.0, "vertical_origin": "ground"
        },
        "time_series": {
            "start": "2024-06-01T00:00:00", "end": "2024-06-01T06:00:00", "step_minutes": 60
        },
        "source_modules": [
            { "name": "StaticSource", "sources": ["boiler_house"] }
        ],
        "dispersion_modules": [ { "name": "GridDispersion", "options": { "pollutants": ["nox_g"] } } ]
    }"#;

    fn registries() -> (SourceRegistry, DispersionRegistry) {
        let mut source_registry = SourceRegistry::default();
        sources::register_builtin(&mut source_registry);
        let mut dispersion_registry = DispersionRegistry::default();
        dispersion::register_builtin(&mut dispersion_registry, None);
        (source_registry, dispersion_registry)
    }

    #[test]
    fn test_parse_regular_study() {
        let config: StudyConfig = serde_json::from_str(STUDY).unwrap();
        let series = config.time_series().unwrap();
        assert_eq!(series.len(), 7);
        assert_eq!(series[0].mixing_height_m, DEFAULT_MIXING_HEIGHT_M);
        assert_eq!(config.source_modules[0].name, StaticSourceModule::NAME);
        assert_eq!(config.dispersion_modules[0].name, GridDispersionModule::NAME);
    }

    #[test]
    fn test_explicit_series_must_increase() {
        let mut config: StudyConfig = serde_json::from_str(STUDY).unwrap();
        let mut series = config.time_series.expand().unwrap();
        series.swap(1, 2);
        config.time_series = TimeSeriesConfig::Explicit(series);
        assert!(matches!(
            config.time_series(),
            Err(ConfigError::InvalidTimeSeries(_))
        ));
    }

    #[test]
    fn test_non_positive_step_rejected() {
        let mut config: StudyConfig = serde_json::from_str(STUDY).unwrap();
        if let TimeSeriesConfig::Regular { step_minutes, .. } = &mut config.time_series {
            *step_minutes = 0;
        }
        assert!(config.time_series().is_err());
    }

    #[test]
    fn test_oversized_step_rejected() {
        let mut config: StudyConfig = serde_json::from_str(STUDY).unwrap();
        if let TimeSeriesConfig::Regular { step_minutes, .. } = &mut config.time_series {
            *step_minutes = i64::MAX / 10;
        }
        assert!(matches!(
            config.time_series(),
            Err(ConfigError::InvalidTimeSeries(_))
        ));
        let (s, d) = registries();
        assert!(config.build_pipeline(&s, &d).is_err());
    }

    #[test]
    fn test_step_past_calendar_end_keeps_start() {
        let mut config: StudyConfig = serde_json::from_str(STUDY).unwrap();
        if let TimeSeriesConfig::Regular { step_minutes, .. } = &mut config.time_series {
            *step_minutes = 1_000_000_000_000;
        }
        let series = config.time_series().unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_invalid_grid_rejected_on_parse() {
        let bad = STUDY.replace("\"x_cells\": 8", "\"x_cells\": 0");
        assert!(serde_json::from_str::<StudyConfig>(&bad).is_err());
    }

    #[test]
    fn test_unknown_module_fails_fast() {
        let mut config: StudyConfig = serde_json::from_str(STUDY).unwrap();
        config.dispersion_modules.push(ModuleSelection::new("Lasport"));
        let (s, d) = registries();
        let err = config.build_pipeline(&s, &d).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::Registry(RegistryError::UnknownModule { ref name, .. })
                if name == "Lasport"
        ));
    }

    #[test]
    fn test_build_pipeline_and_store() {
        let config: StudyConfig = serde_json::from_str(STUDY).unwrap();
        let (s, d) = registries();
        let pipeline = config.build_pipeline(&s, &d).unwrap();
        assert_eq!(pipeline.interval_count(), 6);
        let store = config.to_store().unwrap();
        assert_eq!(store.grid_definition().unwrap(), config.grid);
        assert_eq!(store.time_series().unwrap().len(), 7);
    }

    #[test]
    fn test_save_and_load() {
        let config: StudyConfig = serde_json::from_str(STUDY).unwrap();
        let name = format!("airq-study-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        config.save(&path).unwrap();
        let loaded = StudyConfig::load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(loaded.time_series, config.time_series);
        assert_eq!(loaded.source_modules, config.source_modules);
        assert_eq!(loaded.dispersion_modules, config.dispersion_modules);
        assert_eq!(loaded.grid.cells(), config.grid.cells());
    }
}
