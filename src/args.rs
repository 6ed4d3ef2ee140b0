// Commandline argument parser using clap for PreSure

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_SETTINGS_PATH;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct PresureArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform: run trials, list ports, or analyze results
    pub command: CommandTask,

    /// Settings file with the data directory and acquisition parameters
    #[arg(short = 'c', long = "config", global = true, default_value = DEFAULT_SETTINGS_PATH)]
    pub config: PathBuf,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Run an experiment, one trial at a time
    #[command(about)]
    Run(RunCommand),

    /// List attached serial ports and whether they look like a logger board
    #[command(about)]
    Ports,

    /// Summarize the clean data of an experiment per condition and location
    #[command(about)]
    Analyze(AnalyzeCommand),
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RunCommand {
    /// Experiment directory, created below the data directory
    #[arg(short = 'd', long = "directory")]
    pub directory: String,

    /// Number of trials per location and condition
    #[arg(short = 't', long = "trials", default_value_t = 1)]
    pub trials: u32,

    /// Number of locations
    #[arg(short = 'l', long = "locations", default_value_t = 1)]
    pub locations: u32,

    /// Conditions under test, LUMP and/or NOLUMP
    #[arg(short = 'k', long = "conditions", default_values = ["LUMP", "NOLUMP"])]
    #[clap(num_args = 0..)]
    pub conditions: Vec<String>,

    /// Logging duration of each trial, in seconds
    #[arg(short = 's', long = "duration", default_value_t = 30.0)]
    pub duration: f64,

    /// Delay between pressing start and logging, in seconds
    #[arg(long = "delay", default_value_t = 0.0)]
    pub delay: f64,

    /// Trial to start from, counting from 1, to resume an interrupted experiment
    #[arg(long = "start-at", default_value_t = 1)]
    pub start_at: usize,

    /// Use the simulated source even when a board is attached
    #[arg(short = 'm', long = "mock")]
    pub mock: bool,

    /// Run every trial without prompting or drawing the progress screen
    #[arg(long = "headless")]
    pub headless: bool,

    /// Stop the experiment at the first failed trial
    #[arg(long = "halt-on-error")]
    pub halt_on_error: bool,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct AnalyzeCommand {
    /// Experiment directory below the data directory
    #[arg(short = 'd', long = "directory")]
    pub directory: String,

    /// Column to aggregate, by header name
    #[arg(long = "channel", default_value = "A")]
    pub channel: String,

    /// Plot the mean traces in the terminal
    #[arg(long = "chart")]
    pub chart: bool,
}
