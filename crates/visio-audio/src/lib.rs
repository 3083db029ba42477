//! Voice command capture.
//!
//! A [`RecordingSession`] owns the microphone for the duration of one voice
//! command. Capture runs on a dedicated thread reading from an
//! [`AudioSource`]; stopping it yields a [`Recording`] wrapping an in-memory
//! WAV [`RecordingArtifact`].

mod cpal_source;
mod session;
mod source;
mod wav;

pub use cpal_source::CpalSource;
pub use session::{CaptureEndedCallback, Recording, RecordingSession, SessionId};
pub use source::{AudioFormat, AudioSource, CaptureStream};
pub use wav::{CaptureEnd, MIN_DB, RecordingArtifact, db_fs};

use thiserror::Error;

/// Failures of the capture device.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No recording device available
    #[error("no input device available")]
    NoInputDevice,
    /// Sample format not supported
    #[error("sample format not supported: {0}")]
    SampleFormatNotSupported(String),
    /// Build stream error
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),
    /// The stream could not be started
    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),
    /// The device failed while capturing
    #[error("input device failed: {0}")]
    Device(String),
}

/// Errors returned by [`RecordingSession`].
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("failed to encode recording: {0}")]
    Encode(#[from] hound::Error),

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("capture thread panicked")]
    CaptureThreadPanicked,
}

/// Result type for recording operations.
pub type Result<T> = std::result::Result<T, RecordError>;
