use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value as JsonValue;

use super::binning::bin_rows;
use super::model::{CellValue, Table};

/// Per-run loss log file name.
pub const LOSS_FILE: &str = "loss.csv";
/// Per-run metadata file name.
pub const PARAMS_FILE: &str = "params.json";
/// Collated output written inside the results directory.
pub const COMBINED_FILE: &str = "combined.csv";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{} not found", path.display())]
    MissingFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reading {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing CSV {}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("parsing JSON {}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: expected a JSON object of run parameters", path.display())]
    NotAnObject { path: PathBuf },

    #[error("{}, row {row}, column '{column}': '{value}' is not a number", path.display())]
    NotNumeric {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
}

impl LoadError {
    /// Whether this error only means the run is incomplete on disk.
    pub fn is_missing_file(&self) -> bool {
        matches!(self, LoadError::MissingFile { .. })
    }
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            LoadError::MissingFile {
                path: path.to_path_buf(),
                source,
            }
        } else {
            LoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Per-run files
// ---------------------------------------------------------------------------

/// A numeric loss log as read from `loss.csv`.
#[derive(Debug, Clone, PartialEq)]
pub struct LossLog {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// CSV layout: header row with column names (`step`, `loss`, ...),
/// every cell numeric.
pub fn read_loss_log(path: &Path) -> Result<LossLog, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_reader(open(path)?);
    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.map_err(csv_err)?;
        let row = record
            .iter()
            .zip(&columns)
            .map(|(value, column)| {
                value.trim().parse::<f64>().map_err(|_| LoadError::NotNumeric {
                    path: path.to_path_buf(),
                    row: row_no,
                    column: column.clone(),
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, LoadError>>()?;
        rows.push(row);
    }

    Ok(LossLog { columns, rows })
}

/// Expected JSON schema: a flat object, e.g.
///
/// ```json
/// { "env": "PongNoFrameskip-v4", "seed": 3, "lr": 0.0001 }
/// ```
pub fn read_params(path: &Path) -> Result<BTreeMap<String, CellValue>, LoadError> {
    let root: JsonValue =
        serde_json::from_reader(io::BufReader::new(open(path)?)).map_err(|source| {
            LoadError::Json {
                path: path.to_path_buf(),
                source,
            }
        })?;

    let JsonValue::Object(obj) = root else {
        return Err(LoadError::NotAnObject {
            path: path.to_path_buf(),
        });
    };

    Ok(obj
        .into_iter()
        .map(|(key, val)| (key, json_to_cell(&val)))
        .collect())
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

/// Read one run directory: bin its loss log by `bin_size` and broadcast
/// every parameter in `params.json` as a constant column.
pub fn parse_run(run_dir: &Path, bin_size: usize) -> Result<Table, LoadError> {
    let log = read_loss_log(&run_dir.join(LOSS_FILE))?;
    let params = read_params(&run_dir.join(PARAMS_FILE))?;

    let mut table = Table::new(log.columns);
    for row in bin_rows(&log.rows, bin_size) {
        table.push_row(row.into_iter().map(CellValue::Float).collect());
    }
    for (key, value) in params {
        table.broadcast_column(&key, value);
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// Collation
// ---------------------------------------------------------------------------

/// Parse every run directory under `results_dir` and stack the results.
///
/// Runs missing `loss.csv` or `params.json` are reported and skipped; any
/// other failure aborts the batch.
pub fn collate_results(results_dir: &Path, bin_size: usize) -> Result<Table> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(results_dir)
        .with_context(|| format!("listing {}", results_dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()
        .with_context(|| format!("listing {}", results_dir.display()))?;
    entries.sort();

    let mut tables = Vec::new();
    for run in entries {
        log::info!("Found {}", run.display());
        if !run.is_dir() {
            log::debug!("Skipping {}: not a run directory", run.display());
            continue;
        }
        match parse_run(&run, bin_size) {
            Ok(table) => tables.push(table),
            Err(e) if e.is_missing_file() => {
                log::error!("Error in parsing filepath {}: {e}", run.display());
            }
            Err(e) => return Err(e).with_context(|| format!("parsing run {}", run.display())),
        }
    }

    if tables.is_empty() {
        bail!("no runs to collate in {}", results_dir.display());
    }

    let combined = Table::concat(tables);
    log::info!(
        "Collated {} rows with columns {:?}",
        combined.len(),
        combined.columns
    );
    Ok(combined)
}

// ---------------------------------------------------------------------------
// Combined table I/O
// ---------------------------------------------------------------------------

/// Write a table as CSV: header row, then one record per row.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer
        .write_record(&table.columns)
        .context("writing CSV header")?;
    for (row_no, row) in table.rows.iter().enumerate() {
        writer
            .write_record(row.iter().map(CellValue::to_field))
            .with_context(|| format!("writing CSV row {row_no}"))?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

/// Read a table written by [`write_table`], inferring each cell's type.
pub fn read_table(path: &Path) -> Result<Table> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let columns: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut table = Table::new(columns);
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        table.push_row(record.iter().map(CellValue::from_field).collect());
    }
    Ok(table)
}
