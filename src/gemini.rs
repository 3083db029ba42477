//! Google Gemini client used for scene narration and prompt answers.

use anyhow::{Context, bail};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Produces text from a prompt and an optional photo.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// `image` is a JPEG.
    async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> anyhow::Result<String>;
}

/// Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", API_BASE, self.model())
    }
}

#[async_trait]
impl Narrator for GeminiClient {
    async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> anyhow::Result<String> {
        debug!(
            model = %self.model,
            prompt_chars = prompt.len(),
            image_bytes = image.map(<[u8]>::len),
            "Sending generateContent request to Gemini"
        );

        let request = build_request(prompt, image);
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Gemini request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Gemini returned {}: {}", status, body);
        }

        let response: GenerateResponse = response
            .json()
            .await
            .context("Invalid Gemini response")?;
        collect_text(response)
    }
}

fn build_request<'a>(prompt: &'a str, image: Option<&[u8]>) -> GenerateRequest<'a> {
    let mut parts = vec![RequestPart::Text { text: prompt }];
    if let Some(image) = image {
        parts.push(RequestPart::Image {
            inline_data: InlineData {
                mime_type: "image/jpeg",
                data: base64::engine::general_purpose::STANDARD.encode(image),
            },
        });
    }
    GenerateRequest {
        contents: [Content { parts }],
    }
}

fn collect_text(response: GenerateResponse) -> anyhow::Result<String> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        bail!("Gemini returned no text");
    }
    Ok(text.to_string())
}
