use std::{
    io::{self, stdout, Stdout},
    thread,
    time::{Duration, Instant},
};

use crate::{
    gui::error::GuiError,
    session::{self, CancelSignal},
};

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};

use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// Runs `trial` on a worker thread and shows its progress until it returns.
///
/// `timeline` is how long the trial is expected to take, start delay
/// included; it only drives the progress gauge. Any key press cancels the
/// trial through the [CancelSignal] handed to `trial`, after which the
/// screen stays up until the worker has finished writing its results. The
/// terminal is restored on every path out of this function.
pub fn monitor_trial<F, T>(title: &str, timeline: Duration, trial: F) -> Result<T, GuiError>
where
    F: FnOnce(&CancelSignal) -> T + Send,
    T: Send,
{
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let res = Terminal::new(CrosstermBackend::new(stdout()))
        .map_err(GuiError::from)
        .and_then(|mut terminal| run(&mut terminal, title, timeline, trial));
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    res
}

fn run<F, T>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    title: &str,
    timeline: Duration,
    trial: F,
) -> Result<T, GuiError>
where
    F: FnOnce(&CancelSignal) -> T + Send,
    T: Send,
{
    let (canceller, signal) = session::cancellation();

    thread::scope(|s| {
        let worker = s.spawn(move || trial(&signal));
        let started = Instant::now();
        let mut stopping = false;

        let ui: io::Result<()> = (|| {
            terminal.clear()?;
            while !worker.is_finished() {
                let elapsed = started.elapsed();
                let ratio = if timeline.is_zero() {
                    1.0
                } else {
                    (elapsed.as_secs_f64() / timeline.as_secs_f64()).min(1.0)
                };
                let hint = if stopping {
                    " Stopping, saving data... "
                } else {
                    " Press any key to stop "
                };

                terminal.draw(|frame| {
                    let block = Block::default()
                        .title(
                            Title::from(Span::from(format!(" {title} ")).magenta().bold())
                                .alignment(Alignment::Center),
                        )
                        .title(
                            Title::from(hint)
                                .alignment(Alignment::Center)
                                .position(Position::Bottom),
                        )
                        .borders(Borders::ALL);
                    let gauge = Gauge::default()
                        .block(block)
                        .gauge_style(Style::default().fg(Color::Magenta))
                        .ratio(ratio)
                        .label(format!(
                            "{:.1}s / {:.1}s",
                            elapsed.as_secs_f64().min(timeline.as_secs_f64()),
                            timeline.as_secs_f64()
                        ));
                    frame.render_widget(gauge, frame.size());
                })?;

                if event::poll(Duration::from_millis(16))? {
                    if let event::Event::Key(key) = event::read()? {
                        if key.kind == KeyEventKind::Press && !stopping {
                            canceller.cancel();
                            stopping = true;
                        }
                    }
                }
            }
            Ok(())
        })();

        // the trial still gets to save what it has if the screen fails
        if ui.is_err() {
            canceller.cancel();
        }
        let value = worker.join().map_err(|_| GuiError::WorkerPanicked)?;
        ui?;
        Ok(value)
    })
}
