//! Wit.ai speech endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use visio_audio::RecordingArtifact;

use crate::{Intent, IntentError, IntentResult, IntentService, Result};

const SPEECH_ENDPOINT: &str = "https://api.wit.ai/speech";
const DEFAULT_VERSION: &str = "20240101";

/// Configuration for the Wit.ai client.
#[derive(Debug, Clone)]
pub struct WitConfig {
    /// Server access token
    pub api_key: String,

    /// API version date (defaults to 20240101)
    pub version: Option<String>,
}

impl WitConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }
}

/// Wit.ai speech client.
#[derive(Debug, Clone)]
pub struct WitClient {
    client: reqwest::Client,
    config: WitConfig,
}

#[derive(Debug, Deserialize)]
struct WitResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    intents: Vec<WitIntent>,
    #[serde(default)]
    entities: Value,
    #[serde(default)]
    traits: Value,
    #[serde(default)]
    is_final: bool,
}

#[derive(Debug, Deserialize)]
struct WitIntent {
    name: String,
    #[serde(default)]
    confidence: f64,
}

impl WitClient {
    pub fn new(config: WitConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        Self::new(WitConfig::new(api_key))
    }
}

#[async_trait]
impl IntentService for WitClient {
    async fn transcribe_and_classify(&self, artifact: &RecordingArtifact) -> Result<IntentResult> {
        if self.config.api_key.is_empty() {
            return Err(IntentError::NoApiKey);
        }

        debug!(
            version = self.config.version(),
            audio_bytes = artifact.wav().len(),
            "Sending speech request to Wit.ai"
        );

        let response = self
            .client
            .post(SPEECH_ENDPOINT)
            .query(&[("v", self.config.version())])
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(artifact.wav().clone())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IntentError::Api { status, body });
        }

        let body = response.text().await?;
        parse_response(&body)
    }

    fn name(&self) -> &str {
        "wit"
    }
}

/// The speech endpoint streams a sequence of JSON objects while it
/// transcribes. The final one carries the intents; older API versions send
/// only that one.
fn parse_response(body: &str) -> Result<IntentResult> {
    let mut last = None;
    for message in serde_json::Deserializer::from_str(body).into_iter::<WitResponse>() {
        let message = message.map_err(|e| IntentError::InvalidResponse(e.to_string()))?;
        let is_final = message.is_final;
        last = Some(message);
        if is_final {
            break;
        }
    }

    let response =
        last.ok_or_else(|| IntentError::InvalidResponse("empty response body".to_string()))?;

    let best = response
        .intents
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
    if let Some(best) = best {
        debug!(intent = %best.name, confidence = best.confidence, "Wit.ai intent");
    }

    Ok(IntentResult {
        intent: best.map(|intent| Intent::from_name(&intent.name)),
        transcript: response.text.unwrap_or_default(),
        payload: json!({
            "entities": or_empty(response.entities),
            "traits": or_empty(response.traits),
        }),
    })
}

fn or_empty(value: Value) -> Value {
    if value.is_null() { json!({}) } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_object() {
        let body = r#"{
            "text": "what is the temperature",
            "intents": [{"id": "1", "name": "wit$get_temperature", "confidence": 0.97}],
            "entities": {},
            "traits": {"wit$sentiment": []}
        }"#;

        let result = parse_response(body).unwrap();
        assert_eq!(result.intent, Some(Intent::ReadSensor));
        assert_eq!(result.transcript, "what is the temperature");
        assert!(result.payload["traits"]["wit$sentiment"].is_array());
        assert!(result.payload["entities"].is_object());
    }

    #[test]
    fn test_parse_streamed_objects_uses_final() {
        let body = r#"
            {"text": "hey visio"}
            {"text": "hey visio what is"}
            {"text": "hey visio what is a cat", "is_final": true,
             "intents": [{"name": "gpt", "confidence": 0.6}, {"name": "maps", "confidence": 0.2}]}
        "#;

        let result = parse_response(body).unwrap();
        assert_eq!(result.intent, Some(Intent::Prompt));
        assert_eq!(result.transcript, "hey visio what is a cat");
    }

    #[test]
    fn test_parse_without_intents() {
        let result = parse_response(r#"{"text": "hmm"}"#).unwrap();
        assert_eq!(result.intent, None);
        assert_eq!(result.payload, json!({"entities": {}, "traits": {}}));
    }

    #[test]
    fn test_parse_garbage_is_invalid_response() {
        assert!(matches!(
            parse_response("<html>bad gateway</html>"),
            Err(IntentError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_response("   "),
            Err(IntentError::InvalidResponse(_))
        ));
    }
}
