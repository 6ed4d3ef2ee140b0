use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame, Terminal,
};
use std::io;

use crate::{analysis::GroupSummary, gui::error::GuiError};

const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Red,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Blue,
];

/// Plots the mean trace of every group until the user presses `q` or Esc.
pub fn show_chart(groups: &[GroupSummary], channel: &str) -> Result<(), GuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let res = Terminal::new(CrosstermBackend::new(stdout))
        .and_then(|mut terminal| {
            let res = run_chart(&mut terminal, groups, channel);
            terminal.show_cursor()?;
            res
        });

    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;

    Ok(res?)
}

fn run_chart<B: Backend>(
    terminal: &mut Terminal<B>,
    groups: &[GroupSummary],
    channel: &str,
) -> io::Result<()> {
    let bounds = Bounds::of(groups);
    loop {
        terminal.draw(|f| ui(f, groups, channel, &bounds))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press
                && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
            {
                return Ok(());
            }
        }
    }
}

/// Axis ranges covering every point of every trace.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    x: [f64; 2],
    y: [f64; 2],
}

impl Bounds {
    fn of(groups: &[GroupSummary]) -> Self {
        let mut x = [f64::INFINITY, f64::NEG_INFINITY];
        let mut y = x;
        for &(px, py) in groups.iter().flat_map(|g| g.mean_trace.iter()) {
            x = [x[0].min(px), x[1].max(px)];
            y = [y[0].min(py), y[1].max(py)];
        }
        Self {
            x: widen(x),
            y: widen(y),
        }
    }
}

/// Gives empty or degenerate ranges some width so the axes still render.
fn widen([lo, hi]: [f64; 2]) -> [f64; 2] {
    if !lo.is_finite() || !hi.is_finite() {
        [0.0, 1.0]
    } else if hi - lo < f64::EPSILON {
        [lo - 1.0, hi + 1.0]
    } else {
        [lo, hi]
    }
}

fn labels([lo, hi]: [f64; 2]) -> Vec<Span<'static>> {
    let mid = (lo + hi) / 2.0;
    [lo, mid, hi]
        .iter()
        .map(|v| Span::from(format!("{v:.1}")))
        .collect()
}

fn ui(f: &mut Frame, groups: &[GroupSummary], channel: &str, bounds: &Bounds) {
    let datasets = groups
        .iter()
        .zip(PALETTE.iter().cycle())
        .map(|(group, &color)| {
            Dataset::default()
                .name(format!("{} (n={})", group.label(), group.trials))
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(&group.mean_trace)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(format!(" Mean {channel} per group, q to quit "))
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title(Span::styled("Time (s)", Style::default().fg(Color::Red)))
                .style(Style::default().fg(Color::White))
                .bounds(bounds.x)
                .labels(labels(bounds.x)),
        )
        .y_axis(
            Axis::default()
                .title(Span::styled(channel.to_owned(), Style::default().fg(Color::Red)))
                .style(Style::default().fg(Color::White))
                .bounds(bounds.y)
                .labels(labels(bounds.y)),
        );

    f.render_widget(chart, f.size());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial_name::Condition;

    fn group(trace: Vec<(f64, f64)>) -> GroupSummary {
        GroupSummary {
            condition: Condition::Lump,
            location_no: 1,
            trials: 1,
            rows: trace.len(),
            mean: 0.0,
            peak: 0.0,
            mean_trace: trace,
        }
    }

    #[test]
    fn bounds_cover_all_traces() {
        let groups = [
            group(vec![(0.0, 5.0), (1.0, 9.0)]),
            group(vec![(0.5, -2.0), (3.0, 4.0)]),
        ];
        let bounds = Bounds::of(&groups);
        assert_eq!(bounds.x, [0.0, 3.0]);
        assert_eq!(bounds.y, [-2.0, 9.0]);
    }

    #[test]
    fn degenerate_bounds() {
        assert_eq!(Bounds::of(&[]).x, [0.0, 1.0]);
        let bounds = Bounds::of(&[group(vec![(2.0, 7.0)])]);
        assert_eq!(bounds.x, [1.0, 3.0]);
        assert_eq!(bounds.y, [6.0, 8.0]);
    }

    #[test]
    fn axis_labels() {
        let text: Vec<String> = labels([0.0, 10.0])
            .iter()
            .map(|s| s.content.to_string())
            .collect();
        assert_eq!(text, vec!["0.0", "5.0", "10.0"]);
    }
}
