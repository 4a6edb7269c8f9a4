//! Time-series pipeline lifecycle tests
//!
//! Recording modules journal every lifecycle call so the tests can check
//! ordering, interval visibility, failure handling and cancellation.
//!
//! Run tests with: cargo test --test `pipeline_lifecycle`

use airq_core::core_types::{AmbientCondition, Emission, InventoryTime, Pollutant, Quantities};
use airq_core::grid::{GridDefinition, GridDefinitionRecord, VerticalOrigin};
use airq_core::modules::{
    DispersionModule, ModuleContext, ModuleError, SourceEmission, SourceEmissions, SourceModule,
    SourceRegistry,
};
use airq_core::pipeline::{
    CancellationToken, PipelineError, PipelineState, RunMonitor, RunOutcome, TimeSeriesPipeline,
};
use airq_core::store::MemoryStore;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Begin(&'static str),
    Process(&'static str, NaiveDateTime),
    End(&'static str),
}

type Journal = Arc<Mutex<Vec<Event>>>;

fn at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 8, 20)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn series(n: u32) -> Vec<InventoryTime> {
    (0..n).map(|h| InventoryTime::new(at(h))).collect()
}

fn definition() -> GridDefinition {
    GridDefinition::new(GridDefinitionRecord {
        x_cells: 10,
        y_cells: 10,
        z_cells: 1,
        x_resolution_m: 100.0,
        y_resolution_m: 100.0,
        z_resolution_m: 100.0,
        reference_latitude: 0.0,
        reference_longitude: 0.0,
        reference_altitude_m: 0.0,
        vertical_origin: VerticalOrigin::Centered,
    })
    .unwrap()
}

fn count(journal: &Journal, event: &Event) -> usize {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter(|e| *e == event)
        .count()
}

/// Emits one NOx unit per source at the interval start, and a marker
/// quantity stamped at the interval end that must never reach dispersion
struct RecordingSource {
    journal: Journal,
    fail_at: Option<NaiveDateTime>,
    ambient_temperatures: Arc<Mutex<Vec<f64>>>,
}

impl RecordingSource {
    const FUTURE_MARKER: f64 = 1_000.0;

    fn new(journal: &Journal) -> Self {
        Self {
            journal: Arc::clone(journal),
            fail_at: None,
            ambient_temperatures: Arc::default(),
        }
    }
}

impl SourceModule for RecordingSource {
    fn name(&self) -> &str {
        "RecordingSource"
    }

    fn begin_job(&mut self, _context: &ModuleContext) -> Result<(), ModuleError> {
        self.journal.lock().unwrap().push(Event::Begin("source"));
        Ok(())
    }

    fn process(
        &mut self,
        start: &InventoryTime,
        end: &InventoryTime,
        sources: &[String],
        ambient: &AmbientCondition,
    ) -> Result<Vec<SourceEmission>, ModuleError> {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Process("source", start.time));
        self.ambient_temperatures
            .lock()
            .unwrap()
            .push(ambient.temperature_k);
        if self.fail_at == Some(start.time) {
            return Err(ModuleError::failed(self.name(), "activity table missing"));
        }
        let mut out = Vec::new();
        for source in sources {
            let unit = Emission::new(
                Quantities::ZERO.with(Pollutant::NoxG, 1.0),
                airq_core::Geometry::point(50.0, 50.0),
            );
            let marker = Emission::new(
                Quantities::ZERO.with(Pollutant::NoxG, Self::FUTURE_MARKER),
                airq_core::Geometry::point(50.0, 50.0),
            );
            out.push(SourceEmission::new(start.time, source.clone(), Some(unit)));
            out.push(SourceEmission::new(end.time, source.clone(), Some(marker)));
        }
        Ok(out)
    }

    fn end_job(&mut self) -> Result<(), ModuleError> {
        self.journal.lock().unwrap().push(Event::End("source"));
        Ok(())
    }
}

/// Records the NOx total of every interval it is handed
struct RecordingDispersion {
    journal: Journal,
    totals: Arc<Mutex<Vec<f64>>>,
}

impl DispersionModule for RecordingDispersion {
    fn name(&self) -> &str {
        "RecordingDispersion"
    }

    fn begin_job(&mut self, _context: &ModuleContext) -> Result<(), ModuleError> {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Begin("dispersion"));
        Ok(())
    }

    fn process(
        &mut self,
        start: &InventoryTime,
        _end: &InventoryTime,
        emissions: &[SourceEmissions],
        _ambient: &AmbientCondition,
    ) -> Result<(), ModuleError> {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Process("dispersion", start.time));
        let total: f64 = emissions
            .iter()
            .map(|s| s.total().value(Pollutant::NoxG))
            .sum();
        self.totals.lock().unwrap().push(total);
        Ok(())
    }

    fn end_job(&mut self) -> Result<(), ModuleError> {
        self.journal.lock().unwrap().push(Event::End("dispersion"));
        Ok(())
    }
}

/// Fails both job hooks but processes every interval normally
struct FaultyHooks {
    journal: Journal,
}

impl DispersionModule for FaultyHooks {
    fn name(&self) -> &str {
        "FaultyHooks"
    }

    fn begin_job(&mut self, _context: &ModuleContext) -> Result<(), ModuleError> {
        self.journal.lock().unwrap().push(Event::Begin("faulty"));
        Err(ModuleError::failed(self.name(), "license server unreachable"))
    }

    fn process(
        &mut self,
        start: &InventoryTime,
        _end: &InventoryTime,
        _emissions: &[SourceEmissions],
        _ambient: &AmbientCondition,
    ) -> Result<(), ModuleError> {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Process("faulty", start.time));
        Ok(())
    }

    fn end_job(&mut self) -> Result<(), ModuleError> {
        self.journal.lock().unwrap().push(Event::End("faulty"));
        Err(ModuleError::failed(self.name(), "output volume full"))
    }
}

struct Harness {
    pipeline: TimeSeriesPipeline,
    journal: Journal,
    totals: Arc<Mutex<Vec<f64>>>,
    ambient_temperatures: Arc<Mutex<Vec<f64>>>,
}

fn harness(timestamps: u32, fail_at: Option<NaiveDateTime>) -> Harness {
    let journal: Journal = Arc::default();
    let totals: Arc<Mutex<Vec<f64>>> = Arc::default();
    let mut source = RecordingSource::new(&journal);
    source.fail_at = fail_at;
    let ambient_temperatures = Arc::clone(&source.ambient_temperatures);

    let mut pipeline = TimeSeriesPipeline::new(definition(), series(timestamps)).unwrap();
    pipeline
        .add_source_module(
            Box::new(source),
            vec!["gate_a1".into(), "gate_a2".into()],
            serde_json::Value::Null,
        )
        .add_dispersion_module(
            Box::new(RecordingDispersion {
                journal: Arc::clone(&journal),
                totals: Arc::clone(&totals),
            }),
            serde_json::Value::Null,
        );
    Harness {
        pipeline,
        journal,
        totals,
        ambient_temperatures,
    }
}

/// Cancels once `limit` intervals have reported progress
struct StopAfter {
    limit: usize,
    reports: AtomicUsize,
    token: CancellationToken,
}

impl RunMonitor for StopAfter {
    fn report_progress(&self, _percent: f64) {
        if self.reports.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit {
            self.token.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lifecycle ordering
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_lifecycle_order_for_complete_run() {
    let mut h = harness(3, None);
    let outcome = h
        .pipeline
        .run(&MemoryStore::new(), &CancellationToken::new())
        .unwrap();

    assert_eq!(outcome, RunOutcome::Completed { intervals: 2 });
    assert_eq!(h.pipeline.state(), PipelineState::Done);
    assert_eq!(
        *h.journal.lock().unwrap(),
        vec![
            Event::Begin("source"),
            Event::Begin("dispersion"),
            Event::Process("source", at(0)),
            Event::Process("dispersion", at(0)),
            Event::Process("source", at(1)),
            Event::Process("dispersion", at(1)),
            Event::End("source"),
            Event::End("dispersion"),
        ]
    );
    assert_eq!(h.pipeline.emission_store().len(), 2);
}

#[test]
fn test_dispersion_never_sees_future_emissions() {
    let mut h = harness(5, None);
    h.pipeline
        .run(&MemoryStore::new(), &CancellationToken::new())
        .unwrap();

    // Two sources, one unit each; the end-stamped markers are dropped
    let totals = h.totals.lock().unwrap();
    assert_eq!(*totals, vec![2.0; 4]);
    assert!(totals.iter().all(|t| *t < RecordingSource::FUTURE_MARKER));
    assert_eq!(h.pipeline.emission_store().total().nox_g, 8.0);
}

#[test]
fn test_ambient_resolved_at_interval_start() {
    let store = MemoryStore::new().with_ambient_conditions(vec![
        AmbientCondition::observed(at(0), 280.0, 101_000.0, 0.5, 3.0, 90.0),
        AmbientCondition::observed(at(1), 290.0, 101_000.0, 0.5, 3.0, 90.0),
    ]);
    let mut h = harness(3, None);
    h.pipeline.run(&store, &CancellationToken::new()).unwrap();
    assert_eq!(*h.ambient_temperatures.lock().unwrap(), vec![280.0, 290.0]);
}

#[test]
fn test_missing_ambient_falls_back_to_default() {
    let mut h = harness(2, None);
    h.pipeline
        .run(&MemoryStore::new(), &CancellationToken::new())
        .unwrap();
    assert_eq!(
        *h.ambient_temperatures.lock().unwrap(),
        vec![AmbientCondition::ISA_TEMPERATURE_K]
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// Failure and cancellation
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_module_failure_still_ends_every_module_once() {
    let mut h = harness(5, Some(at(2)));
    let err = h
        .pipeline
        .run(&MemoryStore::new(), &CancellationToken::new())
        .unwrap_err();

    match err {
        PipelineError::ModuleFailed { interval, source } => {
            assert_eq!(interval, 2);
            assert_eq!(source.module(), "RecordingSource");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.pipeline.state(), PipelineState::Failed);
    assert_eq!(count(&h.journal, &Event::End("source")), 1);
    assert_eq!(count(&h.journal, &Event::End("dispersion")), 1);
    assert_eq!(count(&h.journal, &Event::Process("dispersion", at(2))), 0);
    assert_eq!(h.pipeline.emission_store().len(), 2);
}

#[test]
fn test_failing_job_hooks_do_not_stop_the_run() {
    let journal: Journal = Arc::default();
    let totals: Arc<Mutex<Vec<f64>>> = Arc::default();
    let mut pipeline = TimeSeriesPipeline::new(definition(), series(4)).unwrap();
    pipeline
        .add_source_module(
            Box::new(RecordingSource::new(&journal)),
            vec!["stand_301".into()],
            serde_json::Value::Null,
        )
        .add_dispersion_module(
            Box::new(FaultyHooks {
                journal: Arc::clone(&journal),
            }),
            serde_json::Value::Null,
        )
        .add_dispersion_module(
            Box::new(RecordingDispersion {
                journal: Arc::clone(&journal),
                totals: Arc::clone(&totals),
            }),
            serde_json::Value::Null,
        );

    let outcome = pipeline
        .run(&MemoryStore::new(), &CancellationToken::new())
        .unwrap();

    assert_eq!(outcome, RunOutcome::Completed { intervals: 3 });
    assert_eq!(pipeline.state(), PipelineState::Done);
    for hour in 0..3 {
        assert_eq!(count(&journal, &Event::Process("faulty", at(hour))), 1);
        assert_eq!(count(&journal, &Event::Process("dispersion", at(hour))), 1);
    }
    assert_eq!(count(&journal, &Event::End("faulty")), 1);
    assert_eq!(count(&journal, &Event::End("source")), 1);
    assert_eq!(count(&journal, &Event::End("dispersion")), 1);
    assert_eq!(*totals.lock().unwrap(), vec![1.0; 3]);
    assert_eq!(pipeline.emission_store().len(), 3);
}

#[test]
fn test_cancellation_between_intervals() {
    let mut h = harness(6, None);
    let monitor = StopAfter {
        limit: 2,
        reports: AtomicUsize::new(0),
        token: CancellationToken::new(),
    };
    let outcome = h.pipeline.run(&MemoryStore::new(), &monitor).unwrap();

    assert_eq!(outcome, RunOutcome::Cancelled { completed: 2 });
    assert_eq!(h.pipeline.state(), PipelineState::Cancelled);
    assert_eq!(h.pipeline.emission_store().len(), 2);
    assert_eq!(count(&h.journal, &Event::Process("source", at(2))), 0);
    assert_eq!(count(&h.journal, &Event::End("source")), 1);
    assert_eq!(count(&h.journal, &Event::End("dispersion")), 1);
}

#[test]
fn test_rerun_replaces_previous_emissions() {
    let mut h = harness(3, None);
    let store = MemoryStore::new();
    h.pipeline.run(&store, &CancellationToken::new()).unwrap();
    h.pipeline.run(&store, &CancellationToken::new()).unwrap();
    assert_eq!(h.pipeline.emission_store().len(), 2);
    assert_eq!(count(&h.journal, &Event::End("source")), 2);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════════

fn recording_factory(
    journal: &Journal,
) -> impl Fn() -> Box<dyn SourceModule> + Send + Sync + 'static {
    let journal = Arc::clone(journal);
    move || -> Box<dyn SourceModule> { Box::new(RecordingSource::new(&journal)) }
}

#[test]
fn test_duplicate_names_resolve_to_first_registered() {
    let journal: Journal = Arc::default();
    let mut registry = SourceRegistry::default();
    registry.register("Aircraft", recording_factory(&journal));
    registry.register("Aircraft", || -> Box<dyn SourceModule> {
        Box::new(airq_core::sources::StaticSourceModule::new())
    });

    let all = registry.get_modules_by_name("Aircraft").unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].name(), "RecordingSource");
    assert_eq!(all[1].name(), "StaticSource");
    assert_eq!(registry.resolve("Aircraft").unwrap().name(), "RecordingSource");
    assert_eq!(registry.names(), vec!["Aircraft"]);
}

#[test]
fn test_same_factory_registered_twice_overwrites() {
    let journal: Journal = Arc::default();
    let mut registry = SourceRegistry::default();
    for _ in 0..2 {
        registry.register("Aircraft", recording_factory(&journal));
    }
    assert_eq!(registry.len(), 1);
}
