//! PreSure records pressure sensor trials for lump detection experiments.
//!
//! An experiment is a batch of trials, one per trial number, location and
//! condition (with or without a lump). Each trial reads timestamped lines
//! from a serial data logger board, or from a simulated source when no board
//! is attached, for a fixed duration. The raw lines and a parsed, cleaned
//! table are written as CSV into a fresh directory per trial, so nothing is
//! ever overwritten. Finished experiments can be summarized per condition
//! and location.
//!
//! The pieces, bottom up:
//! - [trial_name] expands the experiment shape into ordered trial names
//! - [directory] reserves a unique directory per trial
//! - [source] finds the board, or falls back to [source::MockSource]
//! - [sample_format] and [persist] turn captured lines into CSV artifacts
//! - [session] runs one timed acquisition
//! - [experiment] ties the above together per trial
//! - [analysis] aggregates the clean artifacts afterwards

#![warn(missing_docs)]
pub mod analysis;
pub mod args;
pub mod config;
pub mod directory;
pub mod experiment;
pub mod gui;
pub mod persist;
pub mod sample_format;
pub mod session;
pub mod source;
pub mod trial_name;

/// An iterator function that transposes the order of iteration based on
/// [this StackOverflow answer](https://stackoverflow.com/a/75477884/17443903).
/// Stops at the shortest inner iterator, and yields nothing when there are
/// no inner iterators at all.
pub struct TransposeIter<I, T>
where
    I: IntoIterator<Item = T>,
{
    iterators: Vec<I::IntoIter>,
}

#[allow(missing_docs)]
pub trait TransposableIter<I, T>
where
    Self: Sized,
    Self: IntoIterator<Item = I>,
    I: IntoIterator<Item = T>,
{
    fn transpose(self) -> TransposeIter<I, T> {
        let iterators: Vec<_> = self.into_iter().map(|i| i.into_iter()).collect();
        TransposeIter { iterators }
    }
}

impl<I, T> Iterator for TransposeIter<I, T>
where
    I: IntoIterator<Item = T>,
{
    type Item = Vec<T>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.iterators.is_empty() {
            return None;
        }
        let output: Option<Vec<T>> = self.iterators.iter_mut().map(|iter| iter.next()).collect();
        output
    }
}

impl<I, T, Any> TransposableIter<I, T> for Any
where
    Any: IntoIterator<Item = I>,
    I: IntoIterator<Item = T>,
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_stops_at_shortest() {
        let rows = vec![vec![1, 2, 3], vec![4, 5]];
        let cols: Vec<Vec<i32>> = rows.transpose().collect();
        assert_eq!(cols, vec![vec![1, 4], vec![2, 5]]);
    }

    #[test]
    fn transpose_of_nothing() {
        let rows: Vec<Vec<i32>> = vec![];
        assert_eq!(rows.transpose().next(), None);
    }
}
