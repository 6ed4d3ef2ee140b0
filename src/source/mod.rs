//! Where samples come from. A [`Source`] is either an attached board on a
//! serial port ([`HardwareSource`]) or a synthetic generator
//! ([`MockSource`]). [`select`] decides which one a session gets:
//!
//! - exactly one matching board: open it
//! - no matching board: fall back to the mock, so rehearsals work without
//!   hardware
//! - several matching boards: refuse, the caller has to disambiguate

mod hardware;
mod mock;
mod ports;

pub use hardware::{HardwareSource, LineAssembler};
pub use mock::{MockPattern, MockSource};
pub use ports::{
    classify, is_candidate, FixedPorts, Platform, PortInfo, PortMatch, PortScanner, SystemPorts,
};

use log::{error, info, warn};
use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

/// Written to a device to start streaming.
pub const START_MARKER: u8 = b's';
/// Written to a device to stop streaming.
pub const STOP_MARKER: u8 = b'e';

/// Capabilities shared by real and synthetic sources. A source is open once
/// constructed; it is moved into the session's reader thread and closed there.
pub trait Source: Send {
    /// Human readable name for logs, e.g. the device path.
    fn name(&self) -> String;

    /// Whether the source only streams after [`START_MARKER`] is written.
    fn is_device_gated(&self) -> bool;

    /// Blocks for at most one poll interval. Returns `Ok(None)` when no full
    /// line arrived in that time.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Writes a single control byte such as [`START_MARKER`].
    fn write_control(&mut self, byte: u8) -> io::Result<()>;

    /// Releases the underlying connection. Further reads fail.
    fn close(&mut self) -> io::Result<()>;
}

/// Why no source could be handed to a session.
#[derive(Debug, Error)]
pub enum SourceError {
    /// More than one attached device looks like a data logger.
    #[error("multiple candidate devices found: {}", list_paths(.0))]
    AmbiguousSource(Vec<PortInfo>),

    /// The chosen port could not be opened or configured.
    #[error("failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    /// The operating system could not list its serial ports.
    #[error("failed to enumerate serial ports: {0}")]
    Scan(#[from] serialport::Error),
}

fn list_paths(ports: &[PortInfo]) -> String {
    ports
        .iter()
        .map(|p| p.path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Knobs for opening a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOptions {
    /// Serial line speed.
    pub baud_rate: u32,
    /// How long a single read may block, and the mock's sample period.
    pub poll_interval: Duration,
    /// Wait after opening a port, boards reset when the port opens.
    pub settle_time: Duration,
    /// What the mock produces when it is chosen.
    pub mock_pattern: MockPattern,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            poll_interval: Duration::from_millis(10),
            settle_time: Duration::from_secs(2),
            mock_pattern: MockPattern::default(),
        }
    }
}

/// Picks and opens the source for a session.
pub fn select(
    prefer_mock: bool,
    scanner: &dyn PortScanner,
    options: &SourceOptions,
) -> Result<Box<dyn Source>, SourceError> {
    if prefer_mock {
        info!("Using mock data source");
        return Ok(Box::new(MockSource::new(
            options.mock_pattern,
            options.poll_interval,
        )));
    }

    let ports = match scanner.scan() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Port scan failed ({e}), treating as no device attached");
            Vec::new()
        }
    };

    match classify(&ports, Platform::current()) {
        PortMatch::Single(port) => {
            info!("Opening serial port {} @ {} baud", port.path, options.baud_rate);
            let source = HardwareSource::open(&port.path, options)?;
            Ok(Box::new(source))
        }
        PortMatch::NoMatch => {
            warn!("No data logger found, switching to mock data source");
            Ok(Box::new(MockSource::new(
                options.mock_pattern,
                options.poll_interval,
            )))
        }
        PortMatch::Ambiguous(candidates) => {
            error!("Multiple data loggers found: {}", list_paths(&candidates));
            Err(SourceError::AmbiguousSource(candidates))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_options() -> SourceOptions {
        SourceOptions {
            poll_interval: Duration::from_millis(1),
            ..SourceOptions::default()
        }
    }

    #[test]
    fn no_ports_falls_back_to_mock() {
        let mut source = select(false, &FixedPorts(vec![]), &fast_options()).unwrap();
        assert!(!source.is_device_gated());
        assert!(source.read_line().unwrap().is_some());
    }

    #[test]
    fn unrelated_ports_fall_back_to_mock() {
        let ports = vec![PortInfo::bare("/dev/ttyS0"), PortInfo::bare("COM1")];
        let source = select(false, &FixedPorts(ports), &fast_options()).unwrap();
        assert!(!source.is_device_gated());
    }

    #[test]
    fn prefer_mock_skips_scan() {
        struct Panics;
        impl PortScanner for Panics {
            fn scan(&self) -> Result<Vec<PortInfo>, SourceError> {
                panic!("scanned")
            }
        }
        let source = select(true, &Panics, &fast_options()).unwrap();
        assert_eq!(source.name(), "mock");
    }

    #[test]
    fn two_boards_are_ambiguous() {
        let uno = PortInfo {
            vid: Some(0x2341),
            pid: Some(0x0043),
            ..PortInfo::bare("/dev/fake-uno")
        };
        let ch340 = PortInfo {
            vid: Some(0x1A86),
            pid: Some(0x7523),
            ..PortInfo::bare("/dev/fake-ch340")
        };
        let err = select(false, &FixedPorts(vec![uno.clone(), ch340.clone()]), &fast_options())
            .err()
            .unwrap();
        match err {
            SourceError::AmbiguousSource(candidates) => {
                assert_eq!(candidates, vec![uno, ch340]);
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
