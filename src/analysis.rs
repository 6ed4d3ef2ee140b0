//! Aggregates the clean artifacts of an experiment per (condition, location).
//!
//! Any file named `CLEAN_TRIAL_<n>_LOC_<m>_<LUMP|NOLUMP>.csv` below the
//! experiment directory counts, whatever slot directory it sits in, so
//! repeated attempts of the same trial are all included. The first column is
//! taken as time; the channel column is looked up by header name.

use crate::{
    trial_name::{Condition, TrialSpec},
    TransposableIter,
};

use log::{debug, warn};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no experiment data at {0}")]
    NotFound(PathBuf),

    #[error("io error reading {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("csv error reading {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{path} has no column {column:?}")]
    MissingColumn { path: PathBuf, column: String },
}

/// The time column and one channel of a single clean artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSeries {
    pub spec: TrialSpec,
    pub path: PathBuf,
    pub time: Vec<f64>,
    pub values: Vec<f64>,
}

/// All trials recorded for one condition at one location.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub condition: Condition,
    pub location_no: u32,
    /// Number of clean artifacts in the group.
    pub trials: usize,
    /// Total data rows across those artifacts.
    pub rows: usize,
    pub mean: f64,
    pub peak: f64,
    /// `(time, value)` averaged across trials sample by sample, as long as the
    /// shortest trial.
    pub mean_trace: Vec<(f64, f64)>,
}

impl GroupSummary {
    pub fn label(&self) -> String {
        format!("LOC_{}_{}", self.location_no, self.condition)
    }
}

/// The trial a clean artifact belongs to, judging by its file name.
pub fn clean_file_spec(path: &Path) -> Option<TrialSpec> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_prefix("CLEAN_")?.strip_suffix(".csv")?;
    stem.parse().ok()
}

/// Every clean artifact below `root`, sorted by path.
pub fn find_clean_files(root: &Path) -> Result<Vec<(TrialSpec, PathBuf)>, AnalysisError> {
    if !root.is_dir() {
        return Err(AnalysisError::NotFound(root.to_path_buf()));
    }

    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let io_err = |source| AnalysisError::Io {
            path: dir.clone(),
            source,
        };
        for entry in fs::read_dir(&dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Some(spec) = clean_file_spec(&path) {
                found.push((spec, path));
            }
        }
    }

    found.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(found)
}

/// Reads the time column and `channel` from a clean artifact. Rows where
/// either field is not a number are skipped.
pub fn load_series(spec: TrialSpec, path: &Path, channel: &str) -> Result<TrialSeries, AnalysisError> {
    let csv_err = |source| AnalysisError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let column = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .position(|h| h.trim() == channel)
        .ok_or_else(|| AnalysisError::MissingColumn {
            path: path.to_path_buf(),
            column: channel.to_owned(),
        })?;

    let mut time = Vec::new();
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let t = record.get(0).and_then(|f| f.trim().parse::<f64>().ok());
        let v = record.get(column).and_then(|f| f.trim().parse::<f64>().ok());
        match (t, v) {
            (Some(t), Some(v)) => {
                time.push(t);
                values.push(v);
            }
            _ => debug!("Skipping row {:?} in {}", record, path.display()),
        }
    }

    Ok(TrialSeries {
        spec,
        path: path.to_path_buf(),
        time,
        values,
    })
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Groups series by (location, condition) and summarizes each group.
pub fn summarize_series(series: Vec<TrialSeries>) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<(u32, Condition), Vec<TrialSeries>> = BTreeMap::new();
    for s in series {
        groups
            .entry((s.spec.location_no, s.spec.condition))
            .or_default()
            .push(s);
    }

    groups
        .into_iter()
        .map(|((location_no, condition), members)| {
            let all: Vec<f64> = members.iter().flat_map(|s| s.values.iter().copied()).collect();
            let peak = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            let times = members.iter().map(|s| s.time.clone()).transpose().map(|ts| mean(&ts));
            let values = members
                .iter()
                .map(|s| s.values.clone())
                .transpose()
                .map(|vs| mean(&vs));

            GroupSummary {
                condition,
                location_no,
                trials: members.len(),
                rows: all.len(),
                mean: mean(&all),
                peak: if all.is_empty() { 0.0 } else { peak },
                mean_trace: times.zip(values).collect(),
            }
        })
        .collect()
}

/// Loads every clean artifact below `root` and summarizes it. Files that
/// cannot be read, or lack `channel`, are skipped with a warning.
pub fn summarize(root: &Path, channel: &str) -> Result<Vec<GroupSummary>, AnalysisError> {
    let series = find_clean_files(root)?
        .into_iter()
        .filter_map(|(spec, path)| match load_series(spec, &path, channel) {
            Ok(series) => Some(series),
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                None
            }
        })
        .collect();
    Ok(summarize_series(series))
}
