//! Terminal screens, drawn with [ratatui] on a [crossterm] backend.

mod chart;
mod error;
mod trial_monitor;

pub use chart::show_chart;
pub use error::GuiError;
pub use trial_monitor::monitor_trial;
