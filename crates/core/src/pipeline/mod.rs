//! Time-series pipeline
//!
//! Drives one run across the inventory time series:
//!
//! ```text
//! Idle -> BeginJob -> { ResolveAmbient -> Sources -> Dispersion }* -> EndJob -> Done
//! ```
//!
//! Every adjacent pair of timestamps is one interval `[start, end)`. Within an
//! interval all source modules finish before any dispersion module runs, and
//! dispersion modules only see emissions timestamped inside the interval.
//! `end_job` runs for every module that received `begin_job`, whether the run
//! completed, was cancelled or failed.

mod emission_store;
mod monitor;

pub use emission_store::{EmissionStore, IntervalEmissions};
pub use monitor::{CancellationToken, LoggingMonitor, NoopMonitor, RunMonitor};

use crate::core_types::{is_strictly_increasing, AmbientCondition, Emission, InventoryTime};
use crate::grid::{GridDefinition, GridError, SpatialGrid3D};
use crate::modules::{
    DispersionModule, ModuleContext, ModuleError, RegistryError, SourceEmission, SourceEmissions,
    SourceModule,
};
use crate::store::{InventoryStore, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Errors that stop a run or prevent it from starting
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid grid definition: {0}")]
    Grid(#[from] GridError),
    #[error("invalid time series: {0}")]
    InvalidTimeSeries(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A module's `process` failed; the run is incomplete
    #[error("interval {interval}: {source}")]
    ModuleFailed {
        interval: usize,
        #[source]
        source: ModuleError,
    },
}

/// Where the pipeline is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    BeginJob,
    Stepping { interval: usize },
    EndJob,
    /// Every interval processed
    Done,
    /// Stopped early by the monitor
    Cancelled,
    /// A module failed; results are partial
    Failed,
}

/// How a run that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { intervals: usize },
    Cancelled { completed: usize },
}

impl RunOutcome {
    /// Intervals processed before the run ended
    pub fn intervals_processed(&self) -> usize {
        match *self {
            RunOutcome::Completed { intervals } => intervals,
            RunOutcome::Cancelled { completed } => completed,
        }
    }
}

struct SourceSlot {
    module: Box<dyn SourceModule>,
    sources: Vec<String>,
    options: serde_json::Value,
}

struct DispersionSlot {
    module: Box<dyn DispersionModule>,
    options: serde_json::Value,
}

/// Orchestrates source and dispersion modules over a time series
pub struct TimeSeriesPipeline {
    grid: Arc<SpatialGrid3D>,
    time_series: Vec<InventoryTime>,
    source_modules: Vec<SourceSlot>,
    dispersion_modules: Vec<DispersionSlot>,
    output_dir: Option<PathBuf>,
    emissions: EmissionStore,
    state: PipelineState,
}

impl TimeSeriesPipeline {
    /// Pipeline over an explicit grid and time series
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidTimeSeries`] for an empty or
    /// non-increasing series.
    pub fn new(
        grid: GridDefinition,
        time_series: Vec<InventoryTime>,
    ) -> Result<Self, PipelineError> {
        if time_series.is_empty() {
            return Err(PipelineError::InvalidTimeSeries("time series is empty".into()));
        }
        if !is_strictly_increasing(&time_series) {
            return Err(PipelineError::InvalidTimeSeries(
                "timestamps must be strictly increasing".into(),
            ));
        }
        info!(
            timestamps = time_series.len(),
            cells = grid.cell_count(),
            "Created time-series pipeline"
        );
        Ok(Self {
            grid: Arc::new(SpatialGrid3D::new(grid)),
            time_series,
            source_modules: Vec::new(),
            dispersion_modules: Vec::new(),
            output_dir: None,
            emissions: EmissionStore::new(),
            state: PipelineState::Idle,
        })
    }

    /// Pipeline over the grid and time series held by `store`
    ///
    /// # Errors
    /// Returns an error if either table is missing or invalid.
    pub fn from_store(store: &dyn InventoryStore) -> Result<Self, PipelineError> {
        Self::new(store.grid_definition()?, store.time_series()?)
    }

    /// Add a source module responsible for the named sources
    pub fn add_source_module(
        &mut self,
        module: Box<dyn SourceModule>,
        sources: Vec<String>,
        options: serde_json::Value,
    ) -> &mut Self {
        debug!(module = module.name(), sources = sources.len(), "Added source module");
        self.source_modules.push(SourceSlot {
            module,
            sources,
            options,
        });
        self
    }

    /// Add a dispersion module
    pub fn add_dispersion_module(
        &mut self,
        module: Box<dyn DispersionModule>,
        options: serde_json::Value,
    ) -> &mut Self {
        debug!(module = module.name(), "Added dispersion module");
        self.dispersion_modules.push(DispersionSlot { module, options });
        self
    }

    /// Directory handed to modules for their artifacts
    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn grid(&self) -> &Arc<SpatialGrid3D> {
        &self.grid
    }

    pub fn time_series(&self) -> &[InventoryTime] {
        &self.time_series
    }

    /// Number of intervals a complete run processes
    pub fn interval_count(&self) -> usize {
        self.time_series.len().saturating_sub(1)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Emissions of the most recent run
    pub fn emission_store(&self) -> &EmissionStore {
        &self.emissions
    }

    /// Take ownership of the most recent run's emissions
    pub fn into_emission_store(self) -> EmissionStore {
        self.emissions
    }

    /// Run every interval
    ///
    /// Ambient lookups that fail fall back to [`AmbientCondition::default`].
    ///
    /// # Errors
    /// Returns [`PipelineError::ModuleFailed`] if a module's `process` fails.
    /// `end_job` has still been called on every module when this returns.
    pub fn run(
        &mut self,
        store: &dyn InventoryStore,
        monitor: &dyn RunMonitor,
    ) -> Result<RunOutcome, PipelineError> {
        self.emissions.clear();
        self.set_state(PipelineState::BeginJob);
        self.begin_all();

        let result = self.step_all(store, monitor);

        self.set_state(PipelineState::EndJob);
        self.end_all();

        let final_state = match &result {
            Ok(RunOutcome::Completed { .. }) => PipelineState::Done,
            Ok(RunOutcome::Cancelled { .. }) => PipelineState::Cancelled,
            Err(_) => PipelineState::Failed,
        };
        self.set_state(final_state);
        match &result {
            Ok(outcome) => info!(
                processed = outcome.intervals_processed(),
                total = self.interval_count(),
                "Run finished"
            ),
            Err(e) => error!(error = %e, "Run failed"),
        }
        result
    }

    fn set_state(&mut self, state: PipelineState) {
        if !matches!(state, PipelineState::Stepping { .. }) {
            info!(?state, "Pipeline state");
        }
        self.state = state;
    }

    fn context(&self, options: &serde_json::Value) -> ModuleContext {
        let mut context =
            ModuleContext::new(Arc::clone(&self.grid)).with_options(options.clone());
        context.output_dir.clone_from(&self.output_dir);
        context
    }

    fn begin_all(&mut self) {
        for i in 0..self.source_modules.len() {
            let context = self.context(&self.source_modules[i].options);
            let module = &mut self.source_modules[i].module;
            debug!(module = module.name(), "begin_job");
            if let Err(e) = module.begin_job(&context) {
                error!(module = module.name(), error = %e, "begin_job failed, continuing");
            }
        }
        for i in 0..self.dispersion_modules.len() {
            let context = self.context(&self.dispersion_modules[i].options);
            let module = &mut self.dispersion_modules[i].module;
            debug!(module = module.name(), "begin_job");
            if let Err(e) = module.begin_job(&context) {
                error!(module = module.name(), error = %e, "begin_job failed, continuing");
            }
        }
    }

    fn end_all(&mut self) {
        for slot in &mut self.source_modules {
            debug!(module = slot.module.name(), "end_job");
            if let Err(e) = slot.module.end_job() {
                error!(module = slot.module.name(), error = %e, "end_job failed");
            }
        }
        for slot in &mut self.dispersion_modules {
            debug!(module = slot.module.name(), "end_job");
            if let Err(e) = slot.module.end_job() {
                error!(module = slot.module.name(), error = %e, "end_job failed");
            }
        }
    }

    fn step_all(
        &mut self,
        store: &dyn InventoryStore,
        monitor: &dyn RunMonitor,
    ) -> Result<RunOutcome, PipelineError> {
        let total = self.interval_count();
        for index in 0..total {
            if monitor.is_cancelled() {
                info!(completed = index, total, "Run cancelled");
                return Ok(RunOutcome::Cancelled { completed: index });
            }
            self.state = PipelineState::Stepping { interval: index };
            let start = self.time_series[index];
            let end = self.time_series[index + 1];
            let ambient = resolve_ambient(store, &start);
            self.step(index, &start, &end, &ambient)?;
            monitor.report_progress((index + 1) as f64 * 100.0 / total as f64);
        }
        Ok(RunOutcome::Completed { intervals: total })
    }

    fn step(
        &mut self,
        index: usize,
        start: &InventoryTime,
        end: &InventoryTime,
        ambient: &AmbientCondition,
    ) -> Result<(), PipelineError> {
        debug!(interval = index, start = %start.time, end = %end.time, "Processing interval");

        let mut grouped: Vec<SourceEmissions> = Vec::new();
        for slot in &mut self.source_modules {
            let produced = slot
                .module
                .process(start, end, &slot.sources, ambient)
                .map_err(|source| PipelineError::ModuleFailed {
                    interval: index,
                    source,
                })?;
            collect_interval(slot.module.name(), produced, start, end, &mut grouped);
        }

        let interval = self.emissions.record(*start, *end, grouped);
        for slot in &mut self.dispersion_modules {
            slot.module
                .process(start, end, &interval.sources, ambient)
                .map_err(|source| PipelineError::ModuleFailed {
                    interval: index,
                    source,
                })?;
        }
        Ok(())
    }
}

/// Ambient condition at the interval start, or the documented default
fn resolve_ambient(store: &dyn InventoryStore, start: &InventoryTime) -> AmbientCondition {
    match store.nearest_ambient_condition(start.time) {
        Ok(ambient) => ambient,
        Err(e) => {
            warn!(at = %start.time, error = %e, "No ambient condition, using default");
            AmbientCondition::default()
        }
    }
}

/// Group a module's output by source, keeping only in-interval emissions
fn collect_interval(
    module: &str,
    produced: Vec<SourceEmission>,
    start: &InventoryTime,
    end: &InventoryTime,
    grouped: &mut Vec<SourceEmissions>,
) {
    for item in produced {
        if item.timestamp < start.time || item.timestamp >= end.time {
            warn!(
                module,
                source = %item.source,
                timestamp = %item.timestamp,
                "Emission outside the processed interval, dropped"
            );
            continue;
        }
        let emission = item.emission.unwrap_or_else(Emission::zero);
        match grouped.iter_mut().find(|g| g.source == item.source) {
            Some(group) => group.emissions.push(emission),
            None => grouped.push(SourceEmissions {
                source: item.source,
                emissions: vec![emission],
            }),
        }
    }
}
