//! A data logger board on a serial port.

use super::{Source, SourceError, SourceOptions};

use log::{debug, info};
use serial2::SerialPort;
use std::{collections::VecDeque, io, path::PathBuf, thread::sleep};

/// Splits a byte stream into trimmed text lines.
///
/// Often the first line after opening is cut off or has garbage from the
/// board's buffer; it is decoded lossily and left for the parser to reject.
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: Vec<u8>,
    ready: VecDeque<String>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes. Completed non-empty lines become available from
    /// [`LineAssembler::next_line`].
    pub fn push(&mut self, bytes: &[u8]) {
        for &c in bytes {
            if c == b'\n' {
                let line = String::from_utf8_lossy(&self.partial).trim().to_owned();
                if !line.is_empty() {
                    self.ready.push_back(line);
                }
                self.partial.clear();
            } else {
                self.partial.push(c);
            }
        }
    }

    pub fn next_line(&mut self) -> Option<String> {
        self.ready.pop_front()
    }
}

/// An open serial connection to a board that streams one reading per line
/// once it receives the start marker.
pub struct HardwareSource {
    path: String,
    port: Option<SerialPort>,
    lines: LineAssembler,
}

impl HardwareSource {
    /// Opens `path`, waits for the board to come out of reset and drops
    /// whatever it printed while booting.
    pub fn open(path: &str, options: &SourceOptions) -> Result<Self, SourceError> {
        let open_err = |source| SourceError::Open {
            path: PathBuf::from(path),
            source,
        };

        let mut port = SerialPort::open(path, options.baud_rate).map_err(open_err)?;
        port.set_read_timeout(options.poll_interval).map_err(open_err)?;

        sleep(options.settle_time);
        port.discard_input_buffer().map_err(open_err)?;

        Ok(Self {
            path: path.to_owned(),
            port: Some(port),
            lines: LineAssembler::new(),
        })
    }

    fn port(&self) -> io::Result<&SerialPort> {
        self.port
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Source for HardwareSource {
    fn name(&self) -> String {
        self.path.clone()
    }

    fn is_device_gated(&self) -> bool {
        true
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.lines.next_line() {
            return Ok(Some(line));
        }

        let mut buffer = [0; 256];
        match self.port()?.read(&mut buffer) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device disconnected",
            )),
            Ok(n) => {
                self.lines.push(&buffer[..n]);
                Ok(self.lines.next_line())
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn write_control(&mut self, byte: u8) -> io::Result<()> {
        debug!("Writing control byte {:?} to {}", byte as char, self.path);
        self.port()?.write_all(&[byte])
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.path);
        }
        Ok(())
    }
}
