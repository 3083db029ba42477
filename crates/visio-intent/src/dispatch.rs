//! Routing of recognised intents to their handlers.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};
use visio_audio::RecordingArtifact;

use crate::{Intent, IntentError, IntentService};

/// One handler per intent the device understands.
#[async_trait]
pub trait IntentHandlers: Send + Sync {
    async fn describe_scene(&self) -> anyhow::Result<()>;

    async fn read_currency(&self) -> anyhow::Result<()>;

    async fn read_sensor(&self) -> anyhow::Result<()>;

    /// Answer the free-form question in `transcript`.
    async fn prompt(&self, transcript: &str) -> anyhow::Result<()>;

    /// Fallback for recordings with no intent or one without a handler.
    async fn unrecognized(&self, intent: Option<&Intent>, transcript: &str) -> anyhow::Result<()> {
        info!(
            intent = intent.map(Intent::name),
            transcript, "No handler for voice command"
        );
        Ok(())
    }
}

/// Errors surfaced by [`IntentDispatcher::dispatch`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("intent service failed after {attempts} attempt(s): {source}")]
    Service {
        attempts: u32,
        #[source]
        source: IntentError,
    },

    #[error("{intent} handler failed: {source}")]
    Handler {
        intent: String,
        #[source]
        source: anyhow::Error,
    },
}

/// What a dispatch ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub intent: Option<Intent>,
    pub transcript: String,
}

/// Sends recordings to the intent service and runs the matching handler.
pub struct IntentDispatcher {
    service: Arc<dyn IntentService>,
    handlers: Arc<dyn IntentHandlers>,
    retries: u8,
}

impl IntentDispatcher {
    pub fn new(
        service: Arc<dyn IntentService>,
        handlers: Arc<dyn IntentHandlers>,
        retries: u8,
    ) -> Self {
        Self {
            service,
            handlers,
            retries,
        }
    }

    /// Classify `artifact` and run its handler. The artifact is consumed.
    pub async fn dispatch(
        &self,
        artifact: RecordingArtifact,
    ) -> std::result::Result<Dispatched, DispatchError> {
        let mut attempts = 1;
        let mut result = self.service.transcribe_and_classify(&artifact).await;
        while let Err(e) = &result {
            if !e.is_retryable() || attempts > u32::from(self.retries) {
                break;
            }
            warn!(
                service = self.service.name(),
                attempt = attempts,
                "Retrying intent request, previous error: {}",
                e
            );
            attempts += 1;
            result = self.service.transcribe_and_classify(&artifact).await;
        }
        drop(artifact);

        let result = result.map_err(|source| DispatchError::Service { attempts, source })?;
        info!(
            intent = result.intent.as_ref().map(Intent::name),
            transcript = %result.transcript,
            "Voice command classified"
        );

        let handled = match &result.intent {
            Some(Intent::DescribeScene) => self.handlers.describe_scene().await,
            Some(Intent::ReadCurrency) => self.handlers.read_currency().await,
            Some(Intent::ReadSensor) => self.handlers.read_sensor().await,
            Some(Intent::Prompt) => self.handlers.prompt(&result.transcript).await,
            Some(Intent::Other(name)) => {
                warn!(intent = %name, "Unknown intent");
                self.handlers
                    .unrecognized(result.intent.as_ref(), &result.transcript)
                    .await
            }
            None => self.handlers.unrecognized(None, &result.transcript).await,
        };

        handled.map_err(|source| DispatchError::Handler {
            intent: result
                .intent
                .as_ref()
                .map_or("fallback", Intent::name)
                .to_string(),
            source,
        })?;

        Ok(Dispatched {
            intent: result.intent,
            transcript: result.transcript,
        })
    }
}
