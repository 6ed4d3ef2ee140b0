//! Operator front end: runs experiments trial by trial, reports attached
//! ports, and summarizes finished experiments.

use clap::Parser;
use presure::{
    analysis,
    args::{AnalyzeCommand, CommandTask, PresureArgs, RunCommand},
    config::Settings,
    experiment::{Experiment, ExperimentConfig, TrialOutcome},
    gui,
    session::CancelSignal,
    source::{classify, is_candidate, Platform, PortMatch, PortScanner, SystemPorts},
};

use log::{error, info, warn};
use std::{
    error::Error,
    io::{self, Write},
    process::ExitCode,
    time::Duration,
};

// Example:
// cargo run --bin presure -- run
//                            --directory  Experiment_Alpha
//                            --trials     3
//                            --locations  2
//                            --conditions LUMP NOLUMP
//                            --duration   30
//                            --delay      2

fn main() -> ExitCode {
    env_logger::init();
    let args = PresureArgs::parse();

    let settings = match Settings::from_path(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            eprintln!("Cannot start without valid settings: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!("Data directory is {}", settings.data_directory.display());

    let res = match args.command {
        CommandTask::Run(cmd) => run(cmd, &settings),
        CommandTask::Ports => ports(),
        CommandTask::Analyze(cmd) => analyze(cmd, &settings),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn seconds(what: &str, secs: f64) -> Result<Duration, Box<dyn Error>> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("{what} must be a non-negative number of seconds").into())
}

enum Prompt {
    Start,
    Quit,
}

fn prompt(label: &str) -> io::Result<Prompt> {
    print!("Next: {label}. Press Enter to start, or q then Enter to quit: ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(Prompt::Quit);
    }
    match line.trim() {
        "q" | "Q" => Ok(Prompt::Quit),
        _ => Ok(Prompt::Start),
    }
}

fn report(outcome: &TrialOutcome) {
    let report = &outcome.report;
    let status = match (&report.source_fault, report.interrupted) {
        (Some(fault), _) => format!("ended by source fault ({fault})"),
        (None, true) => "interrupted".to_owned(),
        (None, false) => "completed".to_owned(),
    };
    println!(
        "{} {status} from {}: {} raw rows, {} clean rows, saved in {}",
        outcome.spec,
        report.source_name,
        report.artifacts.raw_rows,
        report.artifacts.clean_rows,
        outcome.slot.display()
    );
}

fn run(cmd: RunCommand, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let config = ExperimentConfig {
        directory: cmd.directory,
        trials: cmd.trials,
        locations: cmd.locations,
        conditions: cmd.conditions,
        duration: seconds("duration", cmd.duration)?,
        start_delay: seconds("delay", cmd.delay)?,
    };
    let experiment = Experiment::new(config, settings, cmd.mock)?;

    let total = experiment.trials().len();
    if total == 0 {
        warn!("No conditions selected, there are no trials to run");
        println!("No trials to run.");
        return Ok(());
    }
    if cmd.start_at == 0 || cmd.start_at > total {
        return Err(format!("--start-at must be between 1 and {total}").into());
    }

    let timeline = experiment.config().start_delay + experiment.config().duration;
    let mut failures = 0;
    for index in (cmd.start_at - 1)..total {
        let spec = experiment.trials()[index];
        let label = format!("trial {} of {total}, {spec}", index + 1);

        if !cmd.headless {
            if let Prompt::Quit = prompt(&label)? {
                println!(
                    "Stopped before {spec}. Resume with --start-at {}",
                    index + 1
                );
                return Ok(());
            }
        }

        let res = if cmd.headless {
            experiment.run_trial(index, &CancelSignal::never())
        } else {
            gui::monitor_trial(&label, timeline, |cancel| {
                experiment.run_trial(index, cancel)
            })?
        };

        match res {
            Ok(outcome) => report(&outcome),
            Err(e) => {
                failures += 1;
                error!("Trial {spec} failed: {e}");
                eprintln!("{spec} failed: {e}");
                if cmd.halt_on_error {
                    return Err(format!(
                        "halted at {spec}; resume with --start-at {}",
                        index + 1
                    )
                    .into());
                }
            }
        }
    }

    println!(
        "Experiment finished: {} of {} trials succeeded, data in {}",
        total - (cmd.start_at - 1) - failures,
        total - (cmd.start_at - 1),
        experiment.root().display()
    );
    Ok(())
}

fn ports() -> Result<(), Box<dyn Error>> {
    let platform = Platform::current();
    let ports = SystemPorts.scan()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in &ports {
        let verdict = if is_candidate(port, platform) {
            "logger board"
        } else {
            "ignored"
        };
        println!("{port}\nVerdict        : {verdict}\n");
    }
    match classify(&ports, platform) {
        PortMatch::Single(port) => println!("Trials will use {}", port.path),
        PortMatch::NoMatch => println!("No board found, trials will use the simulated source"),
        PortMatch::Ambiguous(candidates) => println!(
            "{} candidate boards found, disconnect all but one before running trials",
            candidates.len()
        ),
    }
    Ok(())
}

fn analyze(cmd: AnalyzeCommand, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let root = settings.data_directory.join(&cmd.directory);
    let groups = analysis::summarize(&root, &cmd.channel)?;
    if groups.is_empty() {
        println!("No clean data with column {:?} under {}", cmd.channel, root.display());
        return Ok(());
    }

    println!(
        "{:<16} {:>7} {:>8} {:>12} {:>12}",
        "group", "trials", "rows", "mean", "peak"
    );
    for group in &groups {
        println!(
            "{:<16} {:>7} {:>8} {:>12.3} {:>12.3}",
            group.label(),
            group.trials,
            group.rows,
            group.mean,
            group.peak
        );
    }

    if cmd.chart {
        gui::show_chart(&groups, &cmd.channel)?;
    }
    Ok(())
}
