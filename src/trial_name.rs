//! Trial naming. A batch of trials is the cartesian product of trial numbers,
//! sensor locations, and conditions, expanded in a fixed order:
//!
//! - outer: trial number, `1..=trials`
//! - middle: location number, `1..=locations`
//! - inner: condition, in the order the caller gave them
//!
//! That order is part of the contract; resuming a batch at trial `N` means
//! indexing into the generated list.

use std::{fmt, str::FromStr};

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::u32,
    combinator::{all_consuming, map, map_res},
    sequence::{preceded, tuple},
    Finish, IResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The experimental category of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Condition {
    /// A lump is present under the sensor.
    #[serde(rename = "LUMP")]
    Lump,
    /// No lump is present.
    #[serde(rename = "NOLUMP")]
    NoLump,
}

impl Condition {
    /// The canonical upper-case spelling used in names and files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Lump => "LUMP",
            Condition::NoLump => "NOLUMP",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = NameError;

    /// Accepts exactly `LUMP` and `NOLUMP`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LUMP" => Ok(Condition::Lump),
            "NOLUMP" => Ok(Condition::NoLump),
            _ => Err(NameError::InvalidCondition(vec![s.to_owned()])),
        }
    }
}

/// Errors raised while expanding a trial configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// One or more requested conditions are not `LUMP` or `NOLUMP`.
    #[error("invalid condition values {0:?}, allowed: LUMP, NOLUMP")]
    InvalidCondition(Vec<String>),

    /// Trial and location counts start at one.
    #[error("{0} count must be at least 1")]
    ZeroCount(&'static str),

    /// A string that is not a canonical trial name.
    #[error("not a trial name: {0:?}")]
    Unrecognized(String),
}

/// One trial attempt: which repetition, where the sensor sits, and what is
/// under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrialSpec {
    /// Repetition number, starting at 1.
    pub trial_no: u32,
    /// Sensor location, starting at 1.
    pub location_no: u32,
    /// The condition under test.
    pub condition: Condition,
}

impl TrialSpec {
    /// The canonical name, `TRIAL_<n>_LOC_<m>_<CONDITION>`.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TrialSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TRIAL_{}_LOC_{}_{}",
            self.trial_no, self.location_no, self.condition
        )
    }
}

fn parse_condition(s: &str) -> IResult<&str, Condition> {
    alt((
        map(tag("NOLUMP"), |_| Condition::NoLump),
        map(tag("LUMP"), |_| Condition::Lump),
    ))(s)
}

fn parse_positive(s: &str) -> IResult<&str, u32> {
    map_res(u32, |n| if n == 0 { Err("zero") } else { Ok(n) })(s)
}

fn parse_trial_spec(s: &str) -> IResult<&str, TrialSpec> {
    map(
        tuple((
            preceded(tag("TRIAL_"), parse_positive),
            preceded(tag("_LOC_"), parse_positive),
            preceded(tag("_"), parse_condition),
        )),
        |(trial_no, location_no, condition)| TrialSpec {
            trial_no,
            location_no,
            condition,
        },
    )(s)
}

impl FromStr for TrialSpec {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(parse_trial_spec)(s)
            .finish()
            .map(|(_, spec)| spec)
            .map_err(|_| NameError::Unrecognized(s.to_owned()))
    }
}

/// Expands a configuration into the ordered trial batch, validating the
/// condition names first. An empty condition list is valid and produces an
/// empty batch.
pub fn generate<S: AsRef<str>>(
    trials: u32,
    locations: u32,
    conditions: &[S],
) -> Result<Vec<TrialSpec>, NameError> {
    let mut parsed = Vec::with_capacity(conditions.len());
    let mut invalid = Vec::new();
    for raw in conditions {
        match raw.as_ref().parse::<Condition>() {
            Ok(condition) => parsed.push(condition),
            Err(_) => invalid.push(raw.as_ref().to_owned()),
        }
    }
    if !invalid.is_empty() {
        return Err(NameError::InvalidCondition(invalid));
    }

    generate_specs(trials, locations, &parsed)
}

/// Same as [`generate`] for callers that already hold parsed conditions.
pub fn generate_specs(
    trials: u32,
    locations: u32,
    conditions: &[Condition],
) -> Result<Vec<TrialSpec>, NameError> {
    if trials == 0 {
        return Err(NameError::ZeroCount("trial"));
    }
    if locations == 0 {
        return Err(NameError::ZeroCount("location"));
    }

    let specs = (1..=trials)
        .flat_map(|trial_no| {
            (1..=locations).flat_map(move |location_no| {
                conditions.iter().map(move |&condition| TrialSpec {
                    trial_no,
                    location_no,
                    condition,
                })
            })
        })
        .collect();
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn names(specs: &[TrialSpec]) -> Vec<String> {
        specs.iter().map(TrialSpec::name).collect()
    }

    #[test]
    fn single_trial() {
        let specs = generate(1, 1, &["LUMP"]).unwrap();
        assert_eq!(names(&specs), vec!["TRIAL_1_LOC_1_LUMP"]);
    }

    #[test]
    fn nested_order() {
        let specs = generate(2, 2, &["LUMP", "NOLUMP"]).unwrap();
        assert_eq!(
            names(&specs),
            vec![
                "TRIAL_1_LOC_1_LUMP",
                "TRIAL_1_LOC_1_NOLUMP",
                "TRIAL_1_LOC_2_LUMP",
                "TRIAL_1_LOC_2_NOLUMP",
                "TRIAL_2_LOC_1_LUMP",
                "TRIAL_2_LOC_1_NOLUMP",
                "TRIAL_2_LOC_2_LUMP",
                "TRIAL_2_LOC_2_NOLUMP",
            ]
        );
    }

    #[test]
    fn caller_condition_order_is_kept() {
        let specs = generate(1, 1, &["NOLUMP", "LUMP"]).unwrap();
        assert_eq!(
            names(&specs),
            vec!["TRIAL_1_LOC_1_NOLUMP", "TRIAL_1_LOC_1_LUMP"]
        );
    }

    #[test]
    fn empty_conditions_is_empty_batch() {
        let specs = generate::<&str>(1, 1, &[]).unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn invalid_condition() {
        for (t, l) in [(1, 1), (3, 2), (10, 7)] {
            assert_eq!(
                generate(t, l, &["INVALID"]),
                Err(NameError::InvalidCondition(vec!["INVALID".to_owned()]))
            );
        }
    }

    #[test]
    fn all_invalid_conditions_are_reported() {
        let err = generate(1, 1, &["LUMP", "lumpy", "X"]).unwrap_err();
        assert_eq!(
            err,
            NameError::InvalidCondition(vec!["lumpy".to_owned(), "X".to_owned()])
        );
    }

    #[test]
    fn zero_counts_rejected() {
        assert_eq!(
            generate(0, 1, &["LUMP"]),
            Err(NameError::ZeroCount("trial"))
        );
        assert_eq!(
            generate(1, 0, &["LUMP"]),
            Err(NameError::ZeroCount("location"))
        );
    }

    #[test]
    fn size_and_uniqueness() {
        let condition_sets: [&[&str]; 4] = [&[], &["LUMP"], &["NOLUMP"], &["LUMP", "NOLUMP"]];
        for trials in 1..=4 {
            for locations in 1..=4 {
                for conditions in condition_sets {
                    let specs = generate(trials, locations, conditions).unwrap();
                    assert_eq!(
                        specs.len(),
                        (trials * locations) as usize * conditions.len()
                    );
                    let unique: HashSet<String> = names(&specs).into_iter().collect();
                    assert_eq!(unique.len(), specs.len());
                }
            }
        }
    }

    #[test]
    fn conditions_are_strict() {
        assert_eq!("LUMP".parse::<Condition>(), Ok(Condition::Lump));
        assert_eq!("NOLUMP".parse::<Condition>(), Ok(Condition::NoLump));
        for s in ["Lump", "No Lump", "lump", "NO LUMP", " LUMP"] {
            assert!(s.parse::<Condition>().is_err(), "{s:?} accepted");
        }
        assert_eq!(
            generate(1, 1, &["Lump"]),
            Err(NameError::InvalidCondition(vec!["Lump".to_owned()]))
        );
    }

    #[test]
    fn name_parses_back() {
        let spec = TrialSpec {
            trial_no: 12,
            location_no: 3,
            condition: Condition::NoLump,
        };
        assert_eq!(spec.name().parse::<TrialSpec>(), Ok(spec));
    }

    #[test]
    fn bad_names_do_not_parse() {
        for s in [
            "TRIAL_0_LOC_1_LUMP",
            "TRIAL_1_LOC_1_LUMPY",
            "TRIAL_1_LOC_1",
            "TRIAL_1_LOC_1_LUMP_0",
            "trial_1_loc_1_lump",
        ] {
            assert!(s.parse::<TrialSpec>().is_err(), "{s} parsed");
        }
    }
}
