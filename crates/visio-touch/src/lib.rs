//! Touch input for visio.
//!
//! Raw line levels are turned into edges by [`EdgeSampler`], and edges into
//! gestures by [`GestureClassifier`]. Classification timing runs on a
//! [`TimerService`] so it can be driven by tokio or by virtual time in tests.

mod classifier;
mod gpio;
mod sampler;
mod timer;

pub use classifier::{ClassifierConfig, GestureCallback, GestureClassifier};
pub use gpio::SysfsGpioLine;
pub use sampler::{EdgeSampler, LineReader, run_sampler};
pub use timer::{CancelHandle, TimerCallback, TimerService, TokioTimers};
use thiserror::Error;

/// Errors raised while reading the touch line.
#[derive(Debug, Error)]
pub enum TouchError {
    /// A read of the line failed. The next sampling tick retries.
    #[error("touch line read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The line reported something other than a level
    #[error("unexpected touch line value: {0:?}")]
    InvalidLevel(String),

    /// The line could not be set up at all
    #[error("touch line unavailable: {0}")]
    LineUnavailable(String),
}

impl TouchError {
    /// Whether the sampling loop should simply retry on the next tick.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TouchError::LineUnavailable(_))
    }
}

/// Result type for touch operations.
pub type Result<T> = std::result::Result<T, TouchError>;
