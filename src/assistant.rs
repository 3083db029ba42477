//! The handler set: what the device does for each voice command.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use tracing::info;
use visio_intent::{Intent, IntentHandlers};

use crate::device::{Camera, ClimateSensor, Speaker};
use crate::gemini::Narrator;

const SCENE_PROMPT: &str = "Describe this scene as if narrating to someone who can't see it. \
    Be detailed but natural, avoiding any mention of an image. Use only elements present in \
    the scene. Keep your description concise, under 100 words, while capturing the essence of \
    what's visible.";

const CURRENCY_PROMPT: &str = "Analyze the image and identify the currency. Provide the name of \
    the currency and its denomination. If there are multiple currencies, provide details for \
    each one.";

const ANSWER_PROMPT: &str = "Answer the following request. Keep the answer concise, under 100 \
    words unless the request asks otherwise, and skip introductory phrases such as 'here is'. \
    Request: ";

/// Spoken when a command produced nothing useful to say.
const NOTHING_TO_SAY: &str = "Sorry, I did not catch that.";

/// Narrates through the camera, sensor and speaker.
pub struct Assistant {
    narrator: Arc<dyn Narrator>,
    camera: Arc<dyn Camera>,
    speaker: Arc<dyn Speaker>,
    climate: Arc<dyn ClimateSensor>,
    wake_phrase: Option<Regex>,
}

impl Assistant {
    pub fn new(
        narrator: Arc<dyn Narrator>,
        camera: Arc<dyn Camera>,
        speaker: Arc<dyn Speaker>,
        climate: Arc<dyn ClimateSensor>,
    ) -> Self {
        Self {
            narrator,
            camera,
            speaker,
            climate,
            wake_phrase: None,
        }
    }

    /// Strip `phrase` (case-insensitive) from free-form prompts.
    pub fn with_wake_phrase(mut self, phrase: &str) -> anyhow::Result<Self> {
        self.wake_phrase = wake_phrase_pattern(phrase)?;
        Ok(self)
    }

    /// Remove the wake phrase from a transcript.
    pub fn strip_wake_phrase(&self, transcript: &str) -> String {
        let stripped = match &self.wake_phrase {
            Some(pattern) => pattern.replace_all(transcript, " "),
            None => transcript.into(),
        };
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    async fn narrate_photo(&self, prompt: &str) -> anyhow::Result<()> {
        let photo = self.camera.capture().await.context("camera capture failed")?;
        info!(bytes = photo.len(), "photo captured");
        let text = self.narrator.generate(prompt, Some(&photo)).await?;
        self.speaker.speak(&text).await
    }
}

fn wake_phrase_pattern(phrase: &str) -> anyhow::Result<Option<Regex>> {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?i)\b{}\b[,.!?]*", words.join(r"\s+"));
    Ok(Some(Regex::new(&pattern).context("invalid wake phrase")?))
}

#[async_trait]
impl IntentHandlers for Assistant {
    async fn describe_scene(&self) -> anyhow::Result<()> {
        self.narrate_photo(SCENE_PROMPT).await
    }

    async fn read_currency(&self) -> anyhow::Result<()> {
        self.narrate_photo(CURRENCY_PROMPT).await
    }

    async fn read_sensor(&self) -> anyhow::Result<()> {
        let reading = self.climate.read().await.context("climate sensor read failed")?;
        info!(
            temperature = reading.temperature,
            humidity = reading.humidity,
            "climate reading"
        );
        self.speaker
            .speak(&format!(
                "The temperature is {} degrees Celsius and humidity is {} percent",
                reading.temperature, reading.humidity
            ))
            .await
    }

    async fn prompt(&self, transcript: &str) -> anyhow::Result<()> {
        let request = self.strip_wake_phrase(transcript);
        info!(%request, "answering prompt");
        if request.is_empty() {
            return self.speaker.speak(NOTHING_TO_SAY).await;
        }
        let answer = self
            .narrator
            .generate(&format!("{}{}", ANSWER_PROMPT, request), None)
            .await?;
        self.speaker.speak(&answer).await
    }

    async fn unrecognized(&self, intent: Option<&Intent>, transcript: &str) -> anyhow::Result<()> {
        info!(
            intent = intent.map(Intent::name),
            transcript, "voice command not understood"
        );
        self.speaker.speak(NOTHING_TO_SAY).await
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::device::Climate;

    #[derive(Default)]
    struct Fakes {
        log: Mutex<Vec<String>>,
        camera_fails: bool,
    }

    impl Fakes {
        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    #[async_trait]
    impl Narrator for Fakes {
        async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> anyhow::Result<String> {
            let kind = if prompt.contains("currency") {
                "currency"
            } else if prompt.contains("scene") {
                "scene"
            } else {
                prompt.rsplit("Request: ").next().unwrap_or_default()
            };
            self.log
                .lock()
                .push(format!("generate:{}:{}", kind, image.map_or(0, <[u8]>::len)));
            Ok(format!("narration of {kind}"))
        }
    }

    #[async_trait]
    impl Camera for Fakes {
        async fn capture(&self) -> anyhow::Result<Vec<u8>> {
            if self.camera_fails {
                anyhow::bail!("no camera");
            }
            self.log.lock().push("capture".to_string());
            Ok(vec![0xff, 0xd8, 0xff, 0xd9])
        }
    }

    #[async_trait]
    impl Speaker for Fakes {
        async fn speak(&self, text: &str) -> anyhow::Result<()> {
            self.log.lock().push(format!("speak:{text}"));
            Ok(())
        }
    }

    #[async_trait]
    impl ClimateSensor for Fakes {
        async fn read(&self) -> anyhow::Result<Climate> {
            Ok(Climate {
                temperature: 24.0,
                humidity: 38.5,
            })
        }
    }

    fn assistant(fakes: &Arc<Fakes>) -> Assistant {
        Assistant::new(fakes.clone(), fakes.clone(), fakes.clone(), fakes.clone())
            .with_wake_phrase("hey visio")
            .unwrap()
    }

    #[tokio::test]
    async fn test_describe_scene_narrates_photo() {
        let fakes = Arc::new(Fakes::default());
        assistant(&fakes).describe_scene().await.unwrap();
        assert_eq!(
            fakes.log(),
            vec!["capture", "generate:scene:4", "speak:narration of scene"]
        );
    }

    #[tokio::test]
    async fn test_read_currency_narrates_photo() {
        let fakes = Arc::new(Fakes::default());
        assistant(&fakes).read_currency().await.unwrap();
        assert_eq!(
            fakes.log(),
            vec!["capture", "generate:currency:4", "speak:narration of currency"]
        );
    }

    #[tokio::test]
    async fn test_camera_failure_speaks_nothing() {
        let fakes = Arc::new(Fakes {
            camera_fails: true,
            ..Default::default()
        });
        assert!(assistant(&fakes).describe_scene().await.is_err());
        assert!(fakes.log().is_empty());
    }

    #[tokio::test]
    async fn test_read_sensor_speaks_reading() {
        let fakes = Arc::new(Fakes::default());
        assistant(&fakes).read_sensor().await.unwrap();
        assert_eq!(
            fakes.log(),
            vec!["speak:The temperature is 24 degrees Celsius and humidity is 38.5 percent"]
        );
    }

    #[tokio::test]
    async fn test_prompt_strips_wake_phrase() {
        let fakes = Arc::new(Fakes::default());
        assistant(&fakes)
            .prompt("Hey Visio, what is the capital of France?")
            .await
            .unwrap();
        assert_eq!(
            fakes.log(),
            vec![
                "generate:what is the capital of France?:0",
                "speak:narration of what is the capital of France?"
            ]
        );
    }

    #[tokio::test]
    async fn test_unrecognized_command_apologises() {
        let fakes = Arc::new(Fakes::default());
        let maps = Intent::Other("maps".into());
        assistant(&fakes)
            .unrecognized(Some(&maps), "where am i")
            .await
            .unwrap();
        assistant(&fakes).unrecognized(None, "").await.unwrap();

        let apology = format!("speak:{NOTHING_TO_SAY}");
        assert_eq!(fakes.log(), vec![apology.clone(), apology]);
    }

    #[tokio::test]
    async fn test_prompt_with_only_wake_phrase() {
        let fakes = Arc::new(Fakes::default());
        assistant(&fakes).prompt("hey visio").await.unwrap();
        assert_eq!(fakes.log(), vec![format!("speak:{NOTHING_TO_SAY}")]);
    }

    #[test]
    fn test_strip_wake_phrase() {
        let fakes = Arc::new(Fakes::default());
        let assistant = assistant(&fakes);
        assert_eq!(assistant.strip_wake_phrase("HEY   VISIO tell a joke"), "tell a joke");
        assert_eq!(assistant.strip_wake_phrase("tell a joke hey visio!"), "tell a joke");
        assert_eq!(assistant.strip_wake_phrase("hey visionary"), "hey visionary");

        let plain = Assistant::new(fakes.clone(), fakes.clone(), fakes.clone(), fakes.clone());
        assert_eq!(plain.strip_wake_phrase(" hey  visio "), "hey visio");
    }
}
