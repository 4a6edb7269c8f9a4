//! Pluggable source and dispersion modules
//!
//! A source module turns activity for one category of airport sources into
//! geometry-tagged emissions per interval. A dispersion module consumes the
//! complete set of emissions for an interval to prepare input for an external
//! dispersion model. Both share the same lifecycle:
//!
//! `begin_job` once, `process` once per interval, `end_job` once.

pub mod registry;

pub use registry::{DispersionRegistry, ModuleRegistry, RegistryError, SourceRegistry};

use crate::core_types::{AmbientCondition, Emission, InventoryTime};
use crate::grid::SpatialGrid3D;
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Errors reported by a module
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// The module could not complete the requested step
    #[error("module '{module}' failed: {message}")]
    Failed { module: String, message: String },
    /// Options supplied in the study configuration did not parse
    #[error("module '{module}' has invalid options: {source}")]
    InvalidOptions {
        module: String,
        #[source]
        source: serde_json::Error,
    },
    /// Writing an artifact failed
    #[error("module '{module}' I/O error: {source}")]
    Io {
        module: String,
        #[source]
        source: std::io::Error,
    },
}

impl ModuleError {
    pub fn failed(module: impl Into<String>, message: impl Into<String>) -> Self {
        ModuleError::Failed {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Name of the module that reported the error
    pub fn module(&self) -> &str {
        match self {
            ModuleError::Failed { module, .. }
            | ModuleError::InvalidOptions { module, .. }
            | ModuleError::Io { module, .. } => module,
        }
    }
}

/// Shared run context handed to every module at `begin_job`
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// Grid the run rasterizes onto
    pub grid: Arc<SpatialGrid3D>,
    /// Module-specific options from the study configuration
    pub options: serde_json::Value,
    /// Where modules may write artifacts
    pub output_dir: Option<PathBuf>,
}

impl ModuleContext {
    pub fn new(grid: Arc<SpatialGrid3D>) -> Self {
        Self {
            grid,
            options: serde_json::Value::Null,
            output_dir: None,
        }
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Deserialize the options into a module's own options type
    ///
    /// `null` options yield `T::default()`.
    ///
    /// # Errors
    /// Returns [`ModuleError::InvalidOptions`] if the options do not match `T`.
    pub fn parse_options<T>(&self, module: &str) -> Result<T, ModuleError>
    where
        T: DeserializeOwned + Default,
    {
        if self.options.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.options.clone()).map_err(|source| ModuleError::InvalidOptions {
            module: module.to_string(),
            source,
        })
    }
}

/// One tuple yielded by a source module
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEmission {
    /// When the emission happens; must fall within the processed interval
    pub timestamp: NaiveDateTime,
    /// Declared source name
    pub source: String,
    /// `None` when the source emitted nothing representable
    pub emission: Option<Emission>,
}

impl SourceEmission {
    pub fn new(
        timestamp: NaiveDateTime,
        source: impl Into<String>,
        emission: Option<Emission>,
    ) -> Self {
        Self {
            timestamp,
            source: source.into(),
            emission,
        }
    }
}

/// All emissions of one source within one interval
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceEmissions {
    pub source: String,
    pub emissions: Vec<Emission>,
}

impl SourceEmissions {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            emissions: Vec::new(),
        }
    }

    /// Sum of every emission of this source
    pub fn total(&self) -> Emission {
        Emission::merge(&self.emissions)
    }
}

/// Producer of emissions for one category of airport activity
pub trait SourceModule {
    /// Declared module name
    fn name(&self) -> &str;

    /// Prepare for a run
    ///
    /// # Errors
    /// Failures are logged by the pipeline and never abort the run.
    fn begin_job(&mut self, _context: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Emissions of the named sources during `[start, end)`
    ///
    /// # Errors
    /// Any error aborts the run.
    fn process(
        &mut self,
        start: &InventoryTime,
        end: &InventoryTime,
        sources: &[String],
        ambient: &AmbientCondition,
    ) -> Result<Vec<SourceEmission>, ModuleError>;

    /// Flush artifacts; called once for every module that began
    ///
    /// # Errors
    /// Failures are logged by the pipeline and never abort the run.
    fn end_job(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Consumer of one interval's complete emission set
pub trait DispersionModule {
    /// Declared module name
    fn name(&self) -> &str;

    /// Prepare for a run
    ///
    /// # Errors
    /// Failures are logged by the pipeline and never abort the run.
    fn begin_job(&mut self, _context: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Consume every source's emissions for `[start, end)`
    ///
    /// # Errors
    /// Any error aborts the run.
    fn process(
        &mut self,
        start: &InventoryTime,
        end: &InventoryTime,
        emissions: &[SourceEmissions],
        ambient: &AmbientCondition,
    ) -> Result<(), ModuleError>;

    /// Flush artifacts; called once for every module that began
    ///
    /// # Errors
    /// Failures are logged by the pipeline and never abort the run.
    fn end_job(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}
