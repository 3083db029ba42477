//! Fixed-cadence polling of the touch line.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Level, debug, error, info, warn};
use visio_core::TouchEdge;

use crate::classifier::GestureClassifier;
use crate::{Result, TouchError};

/// Source of the raw touch line level.
pub trait LineReader: Send {
    /// Current level of the line, `true` while touched.
    fn read_level(&mut self) -> Result<bool>;
}

impl<F> LineReader for F
where
    F: FnMut() -> Result<bool> + Send,
{
    fn read_level(&mut self) -> Result<bool> {
        self()
    }
}

/// Turns successive line levels into edges.
///
/// There is no debouncing here. A repeated edge in the same direction can
/// not happen by construction, and short touches are dealt with by the
/// classifier's timing windows.
pub struct EdgeSampler<R> {
    reader: R,
    level: bool,
}

impl<R: LineReader> EdgeSampler<R> {
    /// The line is assumed released until the first read says otherwise.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            level: false,
        }
    }

    /// Read the line once and report the edge, if the level changed.
    pub fn sample(&mut self) -> Result<Option<TouchEdge>> {
        let level = self.reader.read_level()?;
        if level == self.level {
            return Ok(None);
        }

        self.level = level;
        let now = Instant::now();
        Ok(Some(if level {
            TouchEdge::rising(now)
        } else {
            TouchEdge::falling(now)
        }))
    }
}

/// Consecutive read failures of the line. The first failure of a streak is
/// logged at warn (transient) or error, the rest at debug.
#[derive(Debug, Default)]
struct FailureStreak {
    failures: u64,
}

impl FailureStreak {
    /// Count and log one failure, returning the level it was logged at.
    fn record(&mut self, e: &TouchError) -> Level {
        self.failures += 1;
        let failures = self.failures;
        let transient = e.is_transient();
        match (failures, transient) {
            (1, true) => {
                warn!(error = %e, "touch line read failed, retrying");
                Level::WARN
            }
            (1, false) => {
                // Polling continues; the line may come back after a re-export.
                error!(error = %e, "touch line unavailable");
                Level::ERROR
            }
            _ => {
                debug!(error = %e, failures, transient, "touch line read failed");
                Level::DEBUG
            }
        }
    }

    fn clear(&mut self) {
        if self.failures > 0 {
            info!(failures = self.failures, "touch line readable again");
            self.failures = 0;
        }
    }
}

/// Poll `sampler` every `interval` and feed edges to `classifier` until
/// `shutdown` resolves.
///
/// Read failures are logged and retried on the next tick; nothing short of
/// shutdown ends the loop.
pub async fn run_sampler<R, S>(
    mut sampler: EdgeSampler<R>,
    classifier: GestureClassifier,
    interval: Duration,
    shutdown: S,
) where
    R: LineReader,
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut failures = FailureStreak::default();
    info!(interval_ms = interval.as_millis() as u64, "touch sampling started");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        match sampler.sample() {
            Ok(edge) => {
                failures.clear();
                if let Some(edge) = edge {
                    debug!(kind = ?edge.kind, "touch edge");
                    classifier.handle_edge(edge);
                }
            }
            Err(e) => {
                failures.record(&e);
            }
        }
    }

    classifier.reset();
    info!("touch sampling stopped");
}
