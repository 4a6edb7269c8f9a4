use airq_core::config::StudyConfig;
use airq_core::dispersion;
use airq_core::modules::{DispersionRegistry, SourceRegistry};
use airq_core::pipeline::{CancellationToken, LoggingMonitor, RunMonitor, RunOutcome};
use airq_core::sources;
use airq_core::store::InventoryStore;
use airq_core::Pollutant;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Airport emission inventory runner
#[derive(Parser, Debug)]
#[command(name = "airq-headless")]
#[command(
    about = "Run an airport emission study and rasterize it onto a 3D grid",
    long_about = None
)]
struct Args {
    /// Study description (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory for module artifacts and the emission store; overrides the study's `output_dir`
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many intervals
    #[arg(short, long)]
    max_intervals: Option<usize>,

    /// Write the inventory tables, including the grid cell coordinates, to this JSON file
    #[arg(short, long)]
    save_store: Option<PathBuf>,
}

/// Logging monitor that cancels after a fixed number of intervals
struct IntervalLimit {
    inner: LoggingMonitor,
    remaining: Option<AtomicUsize>,
}

impl IntervalLimit {
    fn new(max_intervals: Option<usize>) -> Self {
        let inner = LoggingMonitor::new(CancellationToken::new());
        if max_intervals == Some(0) {
            inner.token().cancel();
        }
        Self {
            inner,
            remaining: max_intervals.map(AtomicUsize::new),
        }
    }
}

impl RunMonitor for IntervalLimit {
    fn report_progress(&self, percent: f64) {
        self.inner.report_progress(percent);
        if let Some(remaining) = &self.remaining {
            if remaining.fetch_sub(1, Ordering::SeqCst) <= 1 {
                self.inner.token().cancel();
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Study failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = StudyConfig::load(&args.config)?;
    if let Some(output) = &args.output {
        config.output_dir = Some(output.clone());
    }
    info!(config = %args.config.display(), "Loaded study");

    let mut source_registry = SourceRegistry::default();
    sources::register_builtin(&mut source_registry);
    let mut dispersion_registry = DispersionRegistry::default();
    dispersion::register_builtin(&mut dispersion_registry, None);

    let mut pipeline = config.build_pipeline(&source_registry, &dispersion_registry)?;
    let mut store = config.to_store()?;
    let grid = std::sync::Arc::clone(pipeline.grid());

    println!("=== Airport Emission Inventory ===\n");
    let [nx, ny, nz] = grid.definition().cells();
    println!(
        "Grid: {nx}x{ny}x{nz} cells, {} intervals",
        pipeline.interval_count()
    );

    let monitor = IntervalLimit::new(args.max_intervals);
    let outcome = pipeline.run(&store, &monitor)?;
    match outcome {
        RunOutcome::Completed { intervals } => println!("Completed {intervals} intervals"),
        RunOutcome::Cancelled { completed } => {
            println!("Stopped after {completed} of {} intervals", pipeline.interval_count());
        }
    }

    let emissions = pipeline.emission_store();
    let total = emissions.total();
    println!("\nTotals:");
    for pollutant in Pollutant::ALL {
        let value = total.get(pollutant);
        if value != 0.0 {
            println!("  {:<16} {value:>14.3}", pollutant.key());
        }
    }
    println!("\nBy source (nox_g):");
    for (source, quantities) in emissions.source_totals() {
        println!("  {source:<24} {:>14.3}", quantities.get(Pollutant::NoxG));
    }

    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("emissions.json");
        emissions.save(&path)?;
        info!(path = %path.display(), "Saved emission store");
    }

    if let Some(path) = &args.save_store {
        store.save_grid_definition(grid.definition())?;
        let rows = store.save_cell_coordinates(&mut grid.cell_coordinates())?;
        store.save(path)?;
        info!(path = %path.display(), cells = rows, "Saved inventory store");
    }
    Ok(())
}
