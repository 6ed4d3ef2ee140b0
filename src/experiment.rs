//! An experiment is one submitted configuration: a directory name, the trial
//! and location counts, the conditions under test, and the timing of each
//! trial. It expands into an ordered batch of trials that are run one at a
//! time, by index, so an operator can stop between trials and resume later.
//!
//! For each trial the source is chosen before any storage is reserved, so a
//! trial that cannot start leaves nothing behind on disk.

use crate::{
    config::Settings,
    directory::{AllocationError, DirectoryAllocator},
    session::{AcquisitionSession, CancelSignal, SessionError, SessionOptions, TrialReport},
    source::{self, PortScanner, SourceError, SourceOptions, SystemPorts},
    trial_name::{self, NameError, TrialSpec},
};

use log::info;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("trial index {index} out of range, the batch has {len} trials")]
    NoSuchTrial { index: usize, len: usize },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentConfig {
    /// Experiment directory, below the configured data directory.
    pub directory: String,
    pub trials: u32,
    pub locations: u32,
    pub conditions: Vec<String>,
    pub duration: Duration,
    pub start_delay: Duration,
}

/// A completed trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialOutcome {
    pub spec: TrialSpec,
    /// The storage slot the artifacts were written to.
    pub slot: PathBuf,
    pub report: TrialReport,
}

pub struct Experiment {
    config: ExperimentConfig,
    batch: Vec<TrialSpec>,
    root: PathBuf,
    allocator: DirectoryAllocator,
    source_options: SourceOptions,
    session_options: SessionOptions,
    prefer_mock: bool,
    scanner: Box<dyn PortScanner>,
}

impl Experiment {
    /// Validates the configuration and expands it into the trial batch.
    /// Nothing is created on disk.
    pub fn new(
        config: ExperimentConfig,
        settings: &Settings,
        prefer_mock: bool,
    ) -> Result<Self, ExperimentError> {
        let directory = config.directory.trim();
        if directory.is_empty() {
            return Err(ExperimentError::Config("directory name is empty"));
        }
        if directory.contains(['/', '\\']) || directory == "." || directory == ".." {
            return Err(ExperimentError::Config(
                "directory name must be a single path component",
            ));
        }
        if config.duration.is_zero() {
            return Err(ExperimentError::Config("logging duration must be positive"));
        }

        let batch = trial_name::generate(config.trials, config.locations, &config.conditions)?;
        let root = settings.data_directory.join(directory);

        Ok(Self {
            batch,
            root,
            allocator: DirectoryAllocator::new(settings.alternative_limit),
            source_options: settings.source_options(),
            session_options: SessionOptions {
                format: settings.sample_format,
                delay_capture: settings.delay_capture,
            },
            prefer_mock,
            scanner: Box::new(SystemPorts),
            config,
        })
    }

    /// Replaces the system port scan, e.g. with a fixed list of ports.
    pub fn with_scanner(self, scanner: impl PortScanner + 'static) -> Self {
        Self {
            scanner: Box::new(scanner),
            ..self
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// The ordered batch; trial indices refer to positions in this slice.
    pub fn trials(&self) -> &[TrialSpec] {
        &self.batch
    }

    /// `<data directory>/<experiment directory>`
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs the trial at `index`: picks a source, reserves a fresh slot and
    /// logs into it.
    pub fn run_trial(
        &self,
        index: usize,
        cancel: &CancelSignal,
    ) -> Result<TrialOutcome, ExperimentError> {
        let spec = *self.batch.get(index).ok_or(ExperimentError::NoSuchTrial {
            index,
            len: self.batch.len(),
        })?;
        let name = spec.name();
        info!("Starting trial {} of {}: {name}", index + 1, self.batch.len());

        let source = source::select(self.prefer_mock, self.scanner.as_ref(), &self.source_options)?;
        let slot = self.allocator.allocate(&self.root, &name)?;

        let mut session = AcquisitionSession::new(source, self.session_options);
        let report = session.run(
            self.config.duration,
            self.config.start_delay,
            &slot,
            &name,
            cancel,
        )?;

        info!("Trial {name} completed, data saved in {}", slot.display());
        Ok(TrialOutcome { spec, slot, report })
    }
}
