//! Process-wide settings, read once at startup from a [ron] file:
//!
//! ```text
//! (
//!     data_directory: "data",
//!     alternative_limit: 100,
//! )
//! ```
//!
//! Only `data_directory` and `alternative_limit` are required. A missing or
//! invalid settings file is fatal; there is no built-in fallback location
//! for experiment data.

use crate::{
    sample_format::SampleFormat,
    session::DelayCapture,
    source::{MockPattern, SourceOptions},
};

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Default settings file, relative to the working directory.
pub const DEFAULT_SETTINGS_PATH: &str = "settings.ron";

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("settings file {path} could not be read: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The settings file is not valid RON for [`Settings`].
    #[error("settings file {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        source: ron::de::SpannedError,
    },

    /// A value parsed but is out of range.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_settle_time_ms() -> u64 {
    2000
}

/// Contents of the settings file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Root of all experiment output.
    pub data_directory: PathBuf,
    /// How many `_<n>` suffixes to try before giving up on a trial name.
    pub alternative_limit: usize,

    /// Serial line speed.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout per poll, and the mock's sample period.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Wait after opening a port while the board resets.
    #[serde(default = "default_settle_time_ms")]
    pub settle_time_ms: u64,
    /// Grammar for the clean artifact.
    #[serde(default)]
    pub sample_format: SampleFormat,
    /// What the mock produces; must suit `sample_format`.
    #[serde(default)]
    pub mock_pattern: MockPattern,
    /// Policy for lines a board sends during the start delay.
    #[serde(default)]
    pub delay_capture: DelayCapture,
}

impl Settings {
    /// Settings with the given required fields and defaults for the rest.
    pub fn new(data_directory: impl Into<PathBuf>, alternative_limit: usize) -> Self {
        Self {
            data_directory: data_directory.into(),
            alternative_limit,
            baud_rate: default_baud_rate(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_time_ms: default_settle_time_ms(),
            sample_format: SampleFormat::default(),
            mock_pattern: MockPattern::default(),
            delay_capture: DelayCapture::default(),
        }
    }

    /// Reads and validates a settings file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_ron(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(settings)
    }

    /// Parses and validates settings from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = ron::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.data_directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "data_directory",
                reason: "must not be empty",
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be at least 1",
            });
        }
        if self.mock_pattern.sample_format() != self.sample_format {
            return Err(ConfigError::Invalid {
                field: "mock_pattern",
                reason: "produces lines that sample_format does not accept",
            });
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "baud_rate",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// `poll_interval_ms` as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Options for opening a source under these settings.
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            baud_rate: self.baud_rate,
            poll_interval: self.poll_interval(),
            settle_time: Duration::from_millis(self.settle_time_ms),
            mock_pattern: self.mock_pattern,
        }
    }
}
