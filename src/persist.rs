//! Writes the two artifacts of a trial: the raw capture log and the clean
//! table. The raw log keeps every line the reader saw; the clean table keeps
//! only the lines that follow the active [`SampleFormat`], so it is always
//! fully numeric with a fixed column count.

use crate::sample_format::SampleFormat;

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Header of the single column in the raw artifact.
pub const RAW_HEADER: &str = "timestamped_line";

/// A line captured from a source, stamped with the wall clock at capture.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    /// Local wall clock when the line was read.
    pub captured_at: DateTime<Local>,
    /// The line as the source produced it, trimmed.
    pub text: String,
}

impl RawSample {
    /// Stamps `text` with the current time.
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            captured_at: Local::now(),
            text: text.into(),
        }
    }
}

impl fmt::Display for RawSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.captured_at.format("%H:%M:%S"), self.text)
    }
}

/// Failure writing one of the artifacts.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The csv writer failed on `path`.
    #[error("csv error writing {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    /// `path` could not be created or flushed.
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where the artifacts of one trial ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub raw: PathBuf,
    /// `None` when no captured line matched the format.
    pub clean: Option<PathBuf>,
    /// Data rows in the raw artifact.
    pub raw_rows: usize,
    /// Data rows in the clean artifact.
    pub clean_rows: usize,
}

/// `RAW_<stem>.csv`
pub fn raw_file_name(stem: &str) -> String {
    format!("RAW_{stem}.csv")
}

/// `CLEAN_<stem>.csv`
pub fn clean_file_name(stem: &str) -> String {
    format!("CLEAN_{stem}.csv")
}

/// Writes both artifacts of a trial into `slot`.
pub fn persist(
    samples: &[RawSample],
    slot: &Path,
    stem: &str,
    format: SampleFormat,
) -> Result<Artifacts, PersistError> {
    let lines: Vec<String> = samples.iter().map(RawSample::to_string).collect();

    let raw = slot.join(raw_file_name(stem));
    write_raw(&lines, &raw)?;
    info!("Saved raw log ({} lines) to {}", lines.len(), raw.display());

    let path = slot.join(clean_file_name(stem));
    let clean_rows = write_clean(&lines, &path, format)?;
    let clean = if clean_rows > 0 {
        info!("Saved clean log ({clean_rows} rows) to {}", path.display());
        Some(path)
    } else {
        warn!("No valid structured sensor data found, {format} table not written");
        None
    };

    Ok(Artifacts {
        raw,
        clean,
        raw_rows: lines.len(),
        clean_rows,
    })
}

fn create_writer(path: &Path) -> Result<csv::Writer<File>, PersistError> {
    let file = File::create(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file))
}

fn write_raw(lines: &[String], path: &Path) -> Result<(), PersistError> {
    let csv_err = |source| PersistError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = create_writer(path)?;
    writer.write_record([RAW_HEADER]).map_err(csv_err)?;
    for line in lines {
        writer.write_record([line]).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Returns the number of rows written. Nothing is created when no line
/// matches.
fn write_clean(lines: &[String], path: &Path, format: SampleFormat) -> Result<usize, PersistError> {
    let rows: Vec<Vec<&str>> = lines
        .iter()
        .filter_map(|line| match format.parse(line) {
            Some(sample) if sample.values().is_some() => Some(sample.fields),
            _ => {
                debug!("Dropping line from clean table: {line:?}");
                None
            }
        })
        .collect();

    if rows.is_empty() {
        return Ok(0);
    }

    let csv_err = |source| PersistError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = create_writer(path)?;
    writer.write_record(format.columns()).map_err(csv_err)?;
    for row in &rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(rows.len())
}
