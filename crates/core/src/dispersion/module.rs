//! Built-in grid dispersion module
//!
//! Rasterizes every interval into [`CellValueTable`]s. Tables go to an optional
//! shared sink as they are produced. With an output directory configured, each
//! interval is appended straight away to one JSON array per pollutant, so only
//! the latest interval stays in memory.

use crate::core_types::{AmbientCondition, InventoryTime, Pollutant};
use crate::dispersion::axis::AxisSequence;
use crate::dispersion::rasterizer::{CellValueTable, GridRasterizer};
use crate::modules::{DispersionModule, ModuleContext, ModuleError, SourceEmissions};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Shared destination for tables produced during a run
pub type TableSink = Arc<Mutex<Vec<CellValueTable>>>;

/// Options accepted under the module's `options` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridDispersionOptions {
    /// Pollutants to rasterize; every pollutant when empty
    pub pollutants: Vec<Pollutant>,
    /// Write order of the gridded matrix
    pub axis_sequence: AxisSequence,
    /// Write JSON tables when an output directory is set
    pub write_files: bool,
}

impl Default for GridDispersionOptions {
    fn default() -> Self {
        Self {
            pollutants: Vec::new(),
            axis_sequence: AxisSequence::default(),
            write_files: true,
        }
    }
}

/// Table as written to disk, with its dense matrix
#[derive(Serialize)]
struct GriddedTable<'a> {
    #[serde(flatten)]
    table: &'a CellValueTable,
    matrix: Vec<f64>,
}

/// JSON array of one pollutant's tables, appended per interval
struct TableFile {
    path: PathBuf,
    out: BufWriter<File>,
    intervals: usize,
}

impl TableFile {
    fn create(path: PathBuf) -> io::Result<Self> {
        let mut out = BufWriter::new(File::create(&path)?);
        out.write_all(b"[\n")?;
        Ok(Self {
            path,
            out,
            intervals: 0,
        })
    }

    fn append(&mut self, table: &CellValueTable) -> io::Result<()> {
        if self.intervals > 0 {
            self.out.write_all(b",\n")?;
        }
        let gridded = GriddedTable {
            table,
            matrix: table.matrix(),
        };
        serde_json::to_writer_pretty(&mut self.out, &gridded)?;
        self.intervals += 1;
        Ok(())
    }

    fn finish(mut self) -> io::Result<(PathBuf, usize)> {
        self.out.write_all(b"\n]\n")?;
        self.out.flush()?;
        Ok((self.path, self.intervals))
    }
}

/// Dispersion module producing per-cell value tables
pub struct GridDispersionModule {
    sink: Option<TableSink>,
    options: GridDispersionOptions,
    rasterizer: Option<GridRasterizer>,
    output_dir: Option<PathBuf>,
    latest: Vec<CellValueTable>,
    files: Vec<(Pollutant, TableFile)>,
}

impl GridDispersionModule {
    /// Declared registry name
    pub const NAME: &'static str = "GridDispersion";

    pub fn new() -> Self {
        Self {
            sink: None,
            options: GridDispersionOptions::default(),
            rasterizer: None,
            output_dir: None,
            latest: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Module that also pushes every table into `sink`
    pub fn with_sink(sink: TableSink) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new()
        }
    }

    fn pollutants(&self) -> Vec<Pollutant> {
        if self.options.pollutants.is_empty() {
            Pollutant::ALL.to_vec()
        } else {
            self.options.pollutants.clone()
        }
    }

    /// Tables of the most recently processed interval
    pub fn tables(&self) -> &[CellValueTable] {
        &self.latest
    }

    fn io_error(source: io::Error) -> ModuleError {
        ModuleError::Io {
            module: Self::NAME.to_string(),
            source,
        }
    }

    fn append_tables(&mut self, tables: &[CellValueTable]) -> Result<(), ModuleError> {
        if !self.options.write_files {
            return Ok(());
        }
        let Some(dir) = self.output_dir.as_deref() else {
            return Ok(());
        };
        for table in tables {
            let slot = self.files.iter().position(|(p, _)| *p == table.pollutant);
            let slot = match slot {
                Some(slot) => slot,
                None => {
                    self.files
                        .push((table.pollutant, Self::open_table_file(dir, table.pollutant)?));
                    self.files.len() - 1
                }
            };
            self.files[slot].1.append(table).map_err(Self::io_error)?;
        }
        Ok(())
    }

    fn open_table_file(dir: &Path, pollutant: Pollutant) -> Result<TableFile, ModuleError> {
        fs::create_dir_all(dir).map_err(Self::io_error)?;
        let path = dir.join(format!("grid_{}.json", pollutant.key()));
        TableFile::create(path).map_err(Self::io_error)
    }
}

impl Default for GridDispersionModule {
    fn default() -> Self {
        Self::new()
    }
}

impl DispersionModule for GridDispersionModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn begin_job(&mut self, context: &ModuleContext) -> Result<(), ModuleError> {
        self.latest.clear();
        self.files.clear();
        self.output_dir.clone_from(&context.output_dir);
        // Fall back to defaults so the run can continue if the options are bad
        let parsed = context.parse_options::<GridDispersionOptions>(Self::NAME);
        self.options = parsed.as_ref().cloned().unwrap_or_default();
        self.rasterizer = Some(GridRasterizer::new(
            Arc::clone(&context.grid),
            self.options.axis_sequence,
        ));
        parsed.map(|_| ())
    }

    fn process(
        &mut self,
        start: &InventoryTime,
        end: &InventoryTime,
        emissions: &[SourceEmissions],
        _ambient: &AmbientCondition,
    ) -> Result<(), ModuleError> {
        let pollutants = self.pollutants();
        let rasterizer = self
            .rasterizer
            .as_ref()
            .ok_or_else(|| ModuleError::failed(Self::NAME, "process called before begin_job"))?;
        let tables = rasterizer.rasterize(start.time, end.time, emissions, &pollutants);
        if let Some(sink) = &self.sink {
            let mut sink = sink
                .lock()
                .map_err(|_| ModuleError::failed(Self::NAME, "table sink lock poisoned"))?;
            sink.extend(tables.iter().cloned());
        }
        self.append_tables(&tables)?;
        self.latest = tables;
        Ok(())
    }

    fn end_job(&mut self) -> Result<(), ModuleError> {
        self.rasterizer = None;
        let files = std::mem::take(&mut self.files);
        let count = files.len();
        for (_, file) in files {
            let (path, intervals) = file.finish().map_err(Self::io_error)?;
            debug!(path = %path.display(), intervals, "Wrote cell value tables");
        }
        if count > 0 {
            if let Some(dir) = &self.output_dir {
                info!(files = count, dir = %dir.display(), "Grid dispersion tables written");
            }
        }
        Ok(())
    }
}
