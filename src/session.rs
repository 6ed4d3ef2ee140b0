//! One logging run, from the moment the reader starts to the moment both CSV
//! artifacts are on disk.
//!
//! ```text
//! Idle -> Delaying -> Logging -> Stopped -> Persisted
//! ```
//!
//! The reader thread starts as soon as [`AcquisitionSession::run`] is called,
//! so nothing the source prints during the start delay is lost. The reader
//! owns the [`Source`] and the sample buffer outright. The controller only
//! talks to it over a control channel and gets the buffer back from the join
//! handle, after the reader has closed the source.
//!
//! Whatever happens during the run (interrupt, read fault), the controller
//! still stops the reader, joins it, and writes whatever was captured.

use crate::{
    persist::{persist, Artifacts, PersistError, RawSample},
    sample_format::SampleFormat,
    source::{Source, START_MARKER, STOP_MARKER},
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started yet.
    Idle,
    /// Reader running, waiting out the start delay.
    Delaying,
    /// Start signal sent, inside the logging window.
    Logging,
    /// Reader stopped and joined.
    Stopped,
    /// Both artifacts written.
    Persisted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What to do with lines a device-gated source sends before the start
/// signal. Sources that are not gated always have every line recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum DelayCapture {
    /// Keep them; they are written to both artifacts like any other line.
    #[default]
    Keep,
    /// Drop them; only lines read after the start signal are recorded.
    Discard,
}

/// How a session records and parses what it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOptions {
    /// Grammar for the clean artifact.
    pub format: SampleFormat,
    /// Policy for lines read during the start delay.
    pub delay_capture: DelayCapture,
}

/// Why a session could not produce its artifacts.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The logging window was zero.
    #[error("logging duration must be greater than zero")]
    InvalidDuration,

    /// Sessions are single use.
    #[error("session has already run")]
    AlreadyRun,

    /// The reader thread could not be started.
    #[error("failed to spawn reader thread: {0}")]
    Spawn(io::Error),

    /// The reader thread panicked, taking the buffer with it.
    #[error("reader thread panicked, captured data is lost")]
    ReaderPanicked,

    /// The storage slot could not be created.
    #[error("failed to create storage slot {path}: {source}")]
    Slot { path: PathBuf, source: io::Error },

    /// Writing an artifact failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Creates a linked interrupt handle and the signal a session waits on.
pub fn cancellation() -> (Canceller, CancelSignal) {
    let (tx, rx) = mpsc::channel();
    (Canceller(tx), CancelSignal(rx))
}

/// Interrupts the session holding the matching [`CancelSignal`]. Cloneable,
/// so it can be handed to a UI thread.
#[derive(Debug, Clone)]
pub struct Canceller(Sender<()>);

impl Canceller {
    /// Asks the session to stop as soon as possible.
    pub fn cancel(&self) {
        // The session may already be done, nobody to tell.
        let _ = self.0.send(());
    }
}

#[derive(Debug)]
pub struct CancelSignal(Receiver<()>);

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        cancellation().1
    }

    /// Sleeps for `duration`. Returns `true` if interrupted first.
    fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        match self.0.recv_timeout(duration) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
                false
            }
        }
    }
}

/// Outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialReport {
    pub artifacts: Artifacts,
    /// Stopped early by the operator.
    pub interrupted: bool,
    /// The read error that ended capture early, if any.
    pub source_fault: Option<String>,
    pub source_name: String,
}

enum Signal {
    Start,
    Stop,
}

struct ReaderOutcome {
    samples: Vec<RawSample>,
    fault: Option<String>,
}

/// A single timed acquisition over one source.
pub struct AcquisitionSession {
    source: Option<Box<dyn Source>>,
    options: SessionOptions,
    state: SessionState,
}

impl AcquisitionSession {
    /// Binds a session to an already opened source.
    pub fn new(source: Box<dyn Source>, options: SessionOptions) -> Self {
        Self {
            source: Some(source),
            options,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("Session {} -> {}", self.state, state);
        self.state = state;
    }

    /// Waits `start_delay`, logs for `duration`, then writes
    /// `RAW_<stem>.csv` and `CLEAN_<stem>.csv` into `slot`.
    ///
    /// An interrupt from `cancel` cuts the run short but everything captured
    /// so far is still written. A read fault ends capture early and is
    /// reported in [`TrialReport::source_fault`], not as an error.
    pub fn run(
        &mut self,
        duration: Duration,
        start_delay: Duration,
        slot: &Path,
        stem: &str,
        cancel: &CancelSignal,
    ) -> Result<TrialReport, SessionError> {
        if duration.is_zero() {
            return Err(SessionError::InvalidDuration);
        }
        let source = self.source.take().ok_or(SessionError::AlreadyRun)?;
        let source_name = source.name();

        self.set_state(SessionState::Delaying);
        let (control_tx, control_rx) = mpsc::channel();
        let delay_capture = self.options.delay_capture;
        let reader = thread::Builder::new()
            .name("presure-reader".to_owned())
            .spawn(move || reader_loop(source, control_rx, delay_capture))
            .map_err(SessionError::Spawn)?;

        let mut interrupted = false;
        if !start_delay.is_zero() {
            info!("Waiting {:.1}s before logging...", start_delay.as_secs_f64());
            interrupted = cancel.wait(start_delay);
        }

        if !interrupted {
            self.set_state(SessionState::Logging);
            info!("Logging for {:.1}s started", duration.as_secs_f64());
            // A reader that already hit a fault has hung up; nothing to start.
            let _ = control_tx.send(Signal::Start);
            interrupted = cancel.wait(duration);
        }
        if interrupted {
            warn!("Logging interrupted by user");
        }

        self.set_state(SessionState::Stopped);
        let _ = control_tx.send(Signal::Stop);
        let outcome = reader.join().map_err(|_| SessionError::ReaderPanicked)?;
        info!(
            "Logging finished, {} lines captured from {}",
            outcome.samples.len(),
            source_name
        );

        fs::create_dir_all(slot).map_err(|source| SessionError::Slot {
            path: slot.to_path_buf(),
            source,
        })?;
        let artifacts = persist(&outcome.samples, slot, stem, self.options.format)?;
        self.set_state(SessionState::Persisted);

        Ok(TrialReport {
            artifacts,
            interrupted,
            source_fault: outcome.fault,
            source_name,
        })
    }
}

fn reader_loop(
    mut source: Box<dyn Source>,
    control: Receiver<Signal>,
    delay_capture: DelayCapture,
) -> ReaderOutcome {
    let name = source.name();
    let gated = source.is_device_gated();
    let mut samples = Vec::new();
    let mut fault = None;
    let mut logging = false;

    loop {
        match control.try_recv() {
            Ok(Signal::Start) => {
                if gated {
                    if let Err(e) = source.write_control(START_MARKER) {
                        error!("Failed to send start marker to {name}: {e}");
                        fault = Some(e.to_string());
                        break;
                    }
                }
                logging = true;
            }
            Ok(Signal::Stop) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match source.read_line() {
            Ok(Some(text)) => {
                if logging || !gated || delay_capture == DelayCapture::Keep {
                    let sample = RawSample::now(text);
                    debug!("{sample}");
                    samples.push(sample);
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("Read error on {name}: {e}");
                fault = Some(e.to_string());
                break;
            }
        }
    }

    if logging && gated {
        if let Err(e) = source.write_control(STOP_MARKER) {
            warn!("Failed to send stop marker to {name}: {e}");
        }
    }
    if let Err(e) = source.close() {
        warn!("Failed to close {name}: {e}");
    }

    ReaderOutcome { samples, fault }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{select, FixedPorts, SourceOptions};
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    };

    /// A source that emits numbered pipe-format lines, with a garbage line
    /// every fifth read, and records what was written to it.
    #[derive(Clone, Default)]
    struct Probe {
        produced: Arc<AtomicUsize>,
        controls: Arc<Mutex<Vec<u8>>>,
        closed: Arc<AtomicBool>,
    }

    struct ScriptedSource {
        probe: Probe,
        gated: bool,
        interval: Duration,
        fail_after: Option<usize>,
        started: bool,
    }

    impl ScriptedSource {
        fn new(probe: &Probe) -> Self {
            Self {
                probe: probe.clone(),
                gated: false,
                interval: Duration::from_millis(2),
                fail_after: None,
                started: false,
            }
        }
    }

    impl Source for ScriptedSource {
        fn name(&self) -> String {
            "scripted".to_owned()
        }

        fn is_device_gated(&self) -> bool {
            self.gated
        }

        fn read_line(&mut self) -> io::Result<Option<String>> {
            thread::sleep(self.interval);
            let n = self.probe.produced.load(Ordering::SeqCst);
            if self.fail_after == Some(n) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            self.probe.produced.fetch_add(1, Ordering::SeqCst);
            let line = if n % 5 == 4 {
                "noise".to_owned()
            } else if self.gated && !self.started {
                format!("pre {n}")
            } else {
                format!("{n}.0 | 1 | 2 | 3 | 4")
            };
            Ok(Some(line))
        }

        fn write_control(&mut self, byte: u8) -> io::Result<()> {
            if byte == START_MARKER {
                self.started = true;
            }
            self.probe.controls.lock().unwrap().push(byte);
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.probe.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn rows(path: &Path) -> Vec<csv::StringRecord> {
        csv::Reader::from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn full_run() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let mut session =
            AcquisitionSession::new(Box::new(ScriptedSource::new(&probe)), SessionOptions::default());
        assert_eq!(session.state(), SessionState::Idle);

        let report = session
            .run(
                Duration::from_millis(100),
                Duration::ZERO,
                tmp.path(),
                "T",
                &CancelSignal::never(),
            )
            .unwrap();

        assert_eq!(session.state(), SessionState::Persisted);
        assert!(!report.interrupted);
        assert_eq!(report.source_fault, None);
        assert!(probe.closed.load(Ordering::SeqCst));
        assert_eq!(report.artifacts.raw_rows, probe.produced.load(Ordering::SeqCst));
        assert!(report.artifacts.raw_rows > 0);
        assert_eq!(rows(&report.artifacts.raw).len(), report.artifacts.raw_rows);
        // the mock is not gated, so no markers are written
        assert!(probe.controls.lock().unwrap().is_empty());
    }

    #[test]
    fn interrupted_run_keeps_partial_capture() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let mut session =
            AcquisitionSession::new(Box::new(ScriptedSource::new(&probe)), SessionOptions::default());

        let duration = Duration::from_millis(500);
        let (canceller, signal) = cancellation();
        let interrupter = thread::spawn(move || {
            thread::sleep(duration * 2 / 5);
            canceller.cancel();
        });

        let started = Instant::now();
        let report = session
            .run(duration, Duration::ZERO, tmp.path(), "T", &signal)
            .unwrap();
        interrupter.join().unwrap();

        assert!(report.interrupted);
        assert!(started.elapsed() < duration);
        assert_eq!(session.state(), SessionState::Persisted);

        let produced = probe.produced.load(Ordering::SeqCst);
        let raw = rows(&report.artifacts.raw);
        assert_eq!(raw.len(), produced);

        let clean_path = report.artifacts.clean.unwrap();
        let clean = rows(&clean_path);
        assert!(clean.len() < raw.len());
        assert_eq!(clean.len(), report.artifacts.clean_rows);
        for row in clean {
            assert_eq!(row.len(), 5);
            assert!(row.iter().all(|f| f.parse::<f64>().is_ok()));
        }
    }

    #[test]
    fn interrupt_during_delay_still_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let mut session =
            AcquisitionSession::new(Box::new(ScriptedSource::new(&probe)), SessionOptions::default());
        let (canceller, signal) = cancellation();
        canceller.cancel();

        let report = session
            .run(
                Duration::from_secs(10),
                Duration::from_secs(10),
                tmp.path(),
                "T",
                &signal,
            )
            .unwrap();

        assert!(report.interrupted);
        assert!(report.artifacts.raw.exists());
        assert!(probe.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn gated_source_gets_start_and_stop() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let source = ScriptedSource {
            gated: true,
            ..ScriptedSource::new(&probe)
        };
        let mut session = AcquisitionSession::new(Box::new(source), SessionOptions::default());
        session
            .run(
                Duration::from_millis(50),
                Duration::from_millis(20),
                tmp.path(),
                "T",
                &CancelSignal::never(),
            )
            .unwrap();

        assert_eq!(*probe.controls.lock().unwrap(), vec![START_MARKER, STOP_MARKER]);
        assert!(probe.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn delay_window_capture_policy() {
        for (policy, expect_pre) in [(DelayCapture::Keep, true), (DelayCapture::Discard, false)] {
            let tmp = tempfile::tempdir().unwrap();
            let probe = Probe::default();
            let source = ScriptedSource {
                gated: true,
                ..ScriptedSource::new(&probe)
            };
            let options = SessionOptions {
                delay_capture: policy,
                ..SessionOptions::default()
            };
            let report = AcquisitionSession::new(Box::new(source), options)
                .run(
                    Duration::from_millis(60),
                    Duration::from_millis(60),
                    tmp.path(),
                    "T",
                    &CancelSignal::never(),
                )
                .unwrap();

            let has_pre = rows(&report.artifacts.raw)
                .iter()
                .any(|r| r[0].contains("] pre "));
            assert_eq!(has_pre, expect_pre, "{policy:?}");
        }
    }

    #[test]
    fn ungated_source_keeps_delay_lines_under_discard() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let options = SessionOptions {
            delay_capture: DelayCapture::Discard,
            ..SessionOptions::default()
        };
        let report = AcquisitionSession::new(Box::new(ScriptedSource::new(&probe)), options)
            .run(
                Duration::from_millis(40),
                Duration::from_millis(60),
                tmp.path(),
                "T",
                &CancelSignal::never(),
            )
            .unwrap();

        // every line read, delay window included, is on disk
        assert_eq!(report.artifacts.raw_rows, probe.produced.load(Ordering::SeqCst));
        let raw = rows(&report.artifacts.raw);
        assert!(raw[0][0].ends_with("] 0.0 | 1 | 2 | 3 | 4"), "{:?}", raw[0]);
    }

    #[test]
    fn read_fault_still_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let source = ScriptedSource {
            fail_after: Some(3),
            ..ScriptedSource::new(&probe)
        };
        let report = AcquisitionSession::new(Box::new(source), SessionOptions::default())
            .run(
                Duration::from_millis(80),
                Duration::ZERO,
                tmp.path(),
                "T",
                &CancelSignal::never(),
            )
            .unwrap();

        assert!(report.source_fault.unwrap().contains("unplugged"));
        assert_eq!(report.artifacts.raw_rows, 3);
        assert_eq!(report.artifacts.clean_rows, 3);
        assert!(probe.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn zero_duration_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let mut session =
            AcquisitionSession::new(Box::new(ScriptedSource::new(&probe)), SessionOptions::default());
        let err = session
            .run(Duration::ZERO, Duration::ZERO, tmp.path(), "T", &CancelSignal::never())
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidDuration));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn session_runs_once() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let mut session =
            AcquisitionSession::new(Box::new(ScriptedSource::new(&probe)), SessionOptions::default());
        let short = Duration::from_millis(10);
        session
            .run(short, Duration::ZERO, tmp.path(), "A", &CancelSignal::never())
            .unwrap();
        let err = session
            .run(short, Duration::ZERO, tmp.path(), "B", &CancelSignal::never())
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyRun));
    }

    #[test]
    fn mock_fallback_produces_data() {
        let tmp = tempfile::tempdir().unwrap();
        let options = SourceOptions {
            poll_interval: Duration::from_millis(2),
            ..SourceOptions::default()
        };
        let source = select(false, &FixedPorts(vec![]), &options).unwrap();
        let report = AcquisitionSession::new(source, SessionOptions::default())
            .run(
                Duration::from_millis(50),
                Duration::ZERO,
                tmp.path(),
                "T",
                &CancelSignal::never(),
            )
            .unwrap();

        assert_eq!(report.source_name, "mock");
        assert!(report.artifacts.raw_rows > 0);
        assert_eq!(report.artifacts.clean_rows, report.artifacts.raw_rows);
    }
}
