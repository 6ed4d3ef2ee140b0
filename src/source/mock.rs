//! A synthetic source for rehearsals and tests. It produces one reading per
//! poll interval without touching any device, and streams from the moment it
//! is created since there is no device to start.

use super::Source;
use crate::sample_format::SampleFormat;

use chrono::{Local, Timelike};
use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    f64::consts::PI,
    io,
    time::{Duration, Instant},
};

/// Which kind of fake data the mock produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum MockPattern {
    /// Random integers in the pipe format, see
    /// [`SampleFormat::PipeV1`](crate::sample_format::SampleFormat::PipeV1).
    #[default]
    Random,
    /// Slow sine waves in the labelled force format, see
    /// [`SampleFormat::ForceV1`](crate::sample_format::SampleFormat::ForceV1).
    Waveform,
}

impl MockPattern {
    /// The format whose grammar accepts this pattern's lines.
    pub fn sample_format(&self) -> SampleFormat {
        match self {
            MockPattern::Random => SampleFormat::PipeV1,
            MockPattern::Waveform => SampleFormat::ForceV1,
        }
    }
}

/// Generates readings without a device.
pub struct MockSource {
    pattern: MockPattern,
    poll_interval: Duration,
    started: Instant,
    rng: StdRng,
}

impl MockSource {
    pub fn new(pattern: MockPattern, poll_interval: Duration) -> Self {
        Self {
            pattern,
            poll_interval,
            started: Instant::now(),
            rng: StdRng::from_entropy(),
        }
    }

    /// A mock whose random values are reproducible.
    pub fn with_seed(pattern: MockPattern, poll_interval: Duration, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(pattern, poll_interval)
        }
    }
}

impl Source for MockSource {
    fn name(&self) -> String {
        "mock".to_owned()
    }

    fn is_device_gated(&self) -> bool {
        false
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        spin_sleep::sleep(self.poll_interval);
        let line = match self.pattern {
            MockPattern::Random => {
                let now = Local::now();
                let seconds = now.second() as f64 + now.nanosecond() as f64 / 1e9;
                random_line(&mut self.rng, seconds)
            }
            MockPattern::Waveform => waveform_line(self.started.elapsed().as_secs_f64()),
        };
        Ok(Some(line))
    }

    fn write_control(&mut self, byte: u8) -> io::Result<()> {
        debug!("Mock source ignoring control byte {:?}", byte as char);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// `<seconds> | <a> | <b> | <c> | <d>` with values in the ranges the real
/// sensors report.
fn random_line(rng: &mut impl Rng, seconds_in_minute: f64) -> String {
    format!(
        "{:.3} | {} | {} | {} | {}",
        seconds_in_minute,
        rng.gen_range(28000..=32000),
        rng.gen_range(28000..=32000),
        rng.gen_range(40..=60),
        rng.gen_range(24000..=26000),
    )
}

fn round4(x: f64) -> f64 {
    (x * 1e4).round() / 1e4
}

/// `1 + sin(2πft)`, rounded to four places, so values stay in `[0, 2]`.
fn wave(freq_hz: f64, t: f64) -> f64 {
    1.0 + round4((2.0 * PI * freq_hz * t).sin())
}

fn waveform_line(t: f64) -> String {
    let force = 2.5 + 1.5 * wave(0.5, t);
    let delta = 0.1 * wave(1.0, t);
    let fsr1 = 500 + (100.0 * wave(0.2, t)) as i64;
    let fsr2 = 600 + (150.0 * wave(0.3, t)) as i64;
    let fsr3 = 700 + (200.0 * wave(0.4, t)) as i64;
    format!(
        "{t:.2}, Force(N): {force:.4}, ΔF(N): {delta:.4}, FSR1: {fsr1}, FSR2: {fsr2}, FSR3: {fsr3}"
    )
}
