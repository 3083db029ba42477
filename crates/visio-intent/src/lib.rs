//! Intent detection for recorded voice commands.
//!
//! An [`IntentService`] turns a recording into a transcript plus the intent
//! it expresses; the [`IntentDispatcher`] routes that intent to one of the
//! [`IntentHandlers`].

mod dispatch;
mod wit;

use std::fmt;

use async_trait::async_trait;
pub use dispatch::{DispatchError, Dispatched, IntentDispatcher, IntentHandlers};
use thiserror::Error;
use visio_audio::RecordingArtifact;
pub use wit::{WitClient, WitConfig};

/// Errors from the intent service. All of them are service failures and
/// are never reported as "no intent".
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("API request failed with {status}: {body}")]
    Api { status: u16, body: String },

    #[error("No API key configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl IntentError {
    /// Whether trying the same request again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            IntentError::Api { status, .. } => *status == 429 || *status >= 500,
            IntentError::Network(_) => true,
            IntentError::NoApiKey | IntentError::InvalidResponse(_) => false,
        }
    }
}

/// Result type for intent operations.
pub type Result<T> = std::result::Result<T, IntentError>;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Narrate the scene in front of the camera
    DescribeScene,
    /// Identify banknotes in front of the camera
    ReadCurrency,
    /// Report temperature and humidity
    ReadSensor,
    /// Answer a free-form question
    Prompt,
    /// An intent the device has no handler for
    Other(String),
}

impl Intent {
    /// Map a service intent name onto a known intent.
    pub fn from_name(name: &str) -> Self {
        match name {
            "describe_scene" => Intent::DescribeScene,
            "currency" => Intent::ReadCurrency,
            "wit$get_temperature" => Intent::ReadSensor,
            "gpt" => Intent::Prompt,
            other => Intent::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Intent::DescribeScene => "describe_scene",
            Intent::ReadCurrency => "currency",
            Intent::ReadSensor => "wit$get_temperature",
            Intent::Prompt => "gpt",
            Intent::Other(name) => name,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of classifying one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentResult {
    /// `None` when the service understood no intent at all
    pub intent: Option<Intent>,
    pub transcript: String,
    /// Extra data from the service, e.g. entities and traits
    pub payload: serde_json::Value,
}

/// Trait for intent detection backends.
#[async_trait]
pub trait IntentService: Send + Sync {
    /// Transcribe the recording and classify its intent.
    async fn transcribe_and_classify(&self, artifact: &RecordingArtifact) -> Result<IntentResult>;

    /// Returns the name of this service for logging/debugging.
    fn name(&self) -> &str;
}
