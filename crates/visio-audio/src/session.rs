//! Recording session lifecycle. There can only be one active capture per
//! session and the capture thread is the only reader of the audio source
//! while it runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::source::{AudioFormat, AudioSource, CaptureStream};
use crate::wav::{CaptureEnd, RecordingArtifact};
use crate::{CaptureError, RecordError, Result};

/// Upper bound on how long the capture thread waits on the source before
/// checking for a stop request.
const READ_WAIT: Duration = Duration::from_millis(20);

/// Identifies one start/stop cycle of a [`RecordingSession`].
pub type SessionId = u64;

/// Called from the capture thread when a capture ends without `stop()`,
/// i.e. on timeout or device failure. Must not call back into the session.
pub type CaptureEndedCallback = Arc<dyn Fn(SessionId, CaptureEnd) + Send + Sync>;

/// Result of stopping a session.
#[derive(Debug)]
pub enum Recording {
    /// Capture ran until stopped or timed out
    Complete(RecordingArtifact),
    /// The device failed; `artifact` holds everything captured before that
    Partial {
        artifact: RecordingArtifact,
        cause: CaptureError,
    },
}

impl Recording {
    pub fn artifact(&self) -> &RecordingArtifact {
        match self {
            Recording::Complete(artifact) | Recording::Partial { artifact, .. } => artifact,
        }
    }

    pub fn into_artifact(self) -> RecordingArtifact {
        match self {
            Recording::Complete(artifact) | Recording::Partial { artifact, .. } => artifact,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Recording::Partial { .. })
    }
}

struct ActiveCapture {
    id: SessionId,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<Option<CaptureOutcome>>,
}

struct CaptureOutcome {
    format: AudioFormat,
    samples: Vec<i16>,
    end: CaptureEnd,
    error: Option<CaptureError>,
}

/// Start/stop control over voice command capture.
pub struct RecordingSession {
    source: Arc<dyn AudioSource>,
    active: Mutex<Option<ActiveCapture>>,
    next_id: AtomicU64,
    on_ended: Option<CaptureEndedCallback>,
}

impl RecordingSession {
    pub fn new(source: Arc<dyn AudioSource>) -> Self {
        Self {
            source,
            active: Mutex::new(None),
            next_id: AtomicU64::new(0),
            on_ended: None,
        }
    }

    /// Register a listener for captures that end on their own.
    pub fn with_capture_ended(mut self, callback: CaptureEndedCallback) -> Self {
        self.on_ended = Some(callback);
        self
    }

    /// Begin capturing on a dedicated thread.
    ///
    /// Returns once the source is open. With a `timeout` the capture stops
    /// itself after that long, but the session stays active until `stop()`
    /// collects the artifact.
    pub fn start(&self, timeout: Option<Duration>) -> Result<SessionId> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(RecordError::AlreadyRecording);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let source = self.source.clone();
        let on_ended = self.on_ended.clone();
        let stop_requested = stop.clone();
        let thread = thread::Builder::new()
            .name(format!("visio-capture-{id}"))
            .spawn(move || {
                let stream = match source.open() {
                    Ok(stream) => {
                        ready_tx.send(Ok(())).ok();
                        stream
                    }
                    Err(e) => {
                        ready_tx.send(Err(e)).ok();
                        return None;
                    }
                };

                let outcome = capture(stream, &stop_requested, timeout);
                if outcome.end != CaptureEnd::Stopped {
                    if let Some(on_ended) = on_ended {
                        on_ended(id, outcome.end);
                    }
                }
                Some(outcome)
            })
            .map_err(RecordError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                thread.join().ok();
                return Err(e.into());
            }
            Err(_) => {
                thread.join().ok();
                return Err(RecordError::CaptureThreadPanicked);
            }
        }

        info!(id, ?timeout, "recording started");
        *active = Some(ActiveCapture { id, stop, thread });
        Ok(id)
    }

    /// End the active capture and finalise what it captured.
    pub fn stop(&self) -> Result<Recording> {
        // The lock is held until the capture thread has released the
        // source, so a following start() can not overlap with it.
        let mut active = self.active.lock();
        let capture = active.take().ok_or(RecordError::NotRecording)?;

        capture.stop.store(true, Ordering::Release);
        let outcome = capture
            .thread
            .join()
            .ok()
            .flatten()
            .ok_or(RecordError::CaptureThreadPanicked)?;

        let artifact = RecordingArtifact::from_samples(
            capture.id,
            outcome.format,
            &outcome.samples,
            outcome.end,
        )?;
        info!(
            id = capture.id,
            end = ?artifact.end(),
            samples = artifact.samples(),
            bytes = artifact.wav().len(),
            length_seconds = artifact.duration().as_secs_f64(),
            peak_db = artifact.peak_db(),
            "recording finished"
        );

        Ok(match outcome.error {
            Some(cause) => {
                warn!(id = capture.id, error = %cause, "recording cut short by device failure");
                Recording::Partial { artifact, cause }
            }
            None => Recording::Complete(artifact),
        })
    }

    pub fn is_recording(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Id of the capture currently holding the session, if any.
    pub fn active_id(&self) -> Option<SessionId> {
        self.active.lock().as_ref().map(|capture| capture.id)
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.active.get_mut().is_some() {
            if let Err(e) = self.stop() {
                error!("failed to stop recording on drop: {}", e);
            }
        }
    }
}

fn capture(
    mut stream: Box<dyn CaptureStream>,
    stop: &AtomicBool,
    timeout: Option<Duration>,
) -> CaptureOutcome {
    let format = stream.format();
    let started = Instant::now();
    let mut samples = Vec::new();

    let (end, error) = loop {
        if stop.load(Ordering::Acquire) {
            break (CaptureEnd::Stopped, None);
        }
        if timeout.is_some_and(|timeout| started.elapsed() >= timeout) {
            debug!(?timeout, "capture timed out");
            break (CaptureEnd::TimedOut, None);
        }

        match stream.read_chunk(READ_WAIT) {
            Ok(Some(chunk)) => samples.extend_from_slice(&chunk),
            Ok(None) => {}
            Err(e) => break (CaptureEnd::Aborted, Some(e)),
        }
    };

    stream.close();
    CaptureOutcome {
        format,
        samples,
        end,
        error,
    }
}
