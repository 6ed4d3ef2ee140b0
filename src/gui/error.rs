use std::io;

use thiserror::Error;

/// Failures of the terminal screens.
#[derive(Debug, Error)]
pub enum GuiError {
    /// Drawing or reading input from the terminal failed.
    #[error("terminal error: {0}")]
    Io(#[from] io::Error),

    /// The trial run behind the screen panicked.
    #[error("trial worker thread panicked")]
    WorkerPanicked,
}
