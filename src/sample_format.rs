//! Line grammars for the sensor wire formats.
//!
//! Each [`SampleFormat`] couples a small grammar with the column header of the
//! clean CSV it produces, so a change in what the device prints is a change to
//! a named format rather than to a loose pattern somewhere. Every captured
//! line looks like `[HH:MM:SS] <payload>`; the bracketed clock is added by the
//! reader, the payload comes from the device.
//!
//! Fields are kept as the text the device sent, so the clean CSV preserves the
//! device's formatting (`0.100` stays `0.100`).

use nom::{
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0, multispace1, satisfy},
    combinator::{opt, recognize},
    multi::count,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, versioned device output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum SampleFormat {
    /// `0.100 | 31085 | 29010 | 50 | 25444`: time followed by four integer
    /// channels separated by pipes.
    #[default]
    PipeV1,
    /// `1.25, Force(N): 4.1000, ΔF(N): 0.1000, FSR1: 612, FSR2: 745, FSR3: 890`:
    /// the labelled force/FSR format.
    ForceV1,
}

const PIPE_V1_COLUMNS: &[&str] = &["Time(s)", "A", "B", "C", "D"];
const FORCE_V1_COLUMNS: &[&str] = &["Time(s)", "Force(N)", "DeltaF(N)", "FSR1", "FSR2", "FSR3"];

/// One successfully parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample<'a> {
    /// The `HH:MM:SS` capture clock.
    pub clock: &'a str,
    /// One entry per column of the owning format, numeric text.
    pub fields: Vec<&'a str>,
}

impl<'a> Sample<'a> {
    /// The fields as numbers, or `None` if any of them does not convert.
    pub fn values(&self) -> Option<Vec<f64>> {
        self.fields.iter().map(|f| f.parse().ok()).collect()
    }
}

impl SampleFormat {
    /// Column header of the clean CSV.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            SampleFormat::PipeV1 => PIPE_V1_COLUMNS,
            SampleFormat::ForceV1 => FORCE_V1_COLUMNS,
        }
    }

    /// Parses a captured line, returning `None` if it does not follow this
    /// format. Anything after the last field is ignored.
    pub fn parse<'a>(&self, line: &'a str) -> Option<Sample<'a>> {
        let result = match self {
            SampleFormat::PipeV1 => parse_pipe_v1(line),
            SampleFormat::ForceV1 => parse_force_v1(line),
        };
        result.ok().map(|(_rest, sample)| sample)
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::PipeV1 => "pipe-v1",
            SampleFormat::ForceV1 => "force-v1",
        };
        f.write_str(name)
    }
}

fn two_digits(s: &str) -> IResult<&str, &str> {
    recognize(count(satisfy(|c| c.is_ascii_digit()), 2))(s)
}

/// `[HH:MM:SS]`, returning `HH:MM:SS`.
fn parse_clock(s: &str) -> IResult<&str, &str> {
    preceded(
        multispace0,
        delimited(
            char('['),
            recognize(tuple((two_digits, char(':'), two_digits, char(':'), two_digits))),
            char(']'),
        ),
    )(s)
}

/// `\d+(\.\d+)?`
fn unsigned_decimal(s: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, opt(pair(char('.'), digit1))))(s)
}

/// `-?\d+(\.\d+)?`
fn signed_decimal(s: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), unsigned_decimal))(s)
}

fn pipe(s: &str) -> IResult<&str, char> {
    delimited(multispace1, char('|'), multispace1)(s)
}

fn parse_pipe_v1(s: &str) -> IResult<&str, Sample> {
    let (s, clock) = parse_clock(s)?;
    let (s, time) = preceded(multispace1, unsigned_decimal)(s)?;
    let (s, (a, b, c, d)) = tuple((
        preceded(pipe, digit1),
        preceded(pipe, digit1),
        preceded(pipe, digit1),
        preceded(pipe, digit1),
    ))(s)?;
    Ok((
        s,
        Sample {
            clock,
            fields: vec![time, a, b, c, d],
        },
    ))
}

fn parse_force_v1(s: &str) -> IResult<&str, Sample> {
    let (s, clock) = parse_clock(s)?;
    let (s, (time, force, delta, fsr1, fsr2, fsr3)) = tuple((
        preceded(multispace1, unsigned_decimal),
        preceded(tag(", Force(N): "), signed_decimal),
        preceded(tag(", ΔF(N): "), signed_decimal),
        preceded(tag(", FSR1: "), digit1),
        preceded(tag(", FSR2: "), digit1),
        preceded(tag(", FSR3: "), digit1),
    ))(s)?;
    Ok((
        s,
        Sample {
            clock,
            fields: vec![time, force, delta, fsr1, fsr2, fsr3],
        },
    ))
}
