//! Configuration management for visio.
//!
//! The configuration lives in a single TOML file. Every section has sane
//! defaults so a missing or partial file still yields a working device.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::APP_NAME;

/// Environment variable overriding the Wit.ai key.
const WIT_KEY_ENV: &str = "WIT_API_KEY";
/// Environment variable overriding the Gemini key.
const GEMINI_KEY_ENV: &str = "API_KEY";

/// Top level configuration for the device.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub touch: TouchConfig,

    #[serde(default)]
    pub recording: RecordingConfig,

    #[serde(default)]
    pub services: ServiceConfig,

    #[serde(default)]
    pub commands: CommandConfig,

    #[serde(default)]
    pub hooks: HookConfig,
}

/// Touch sensor wiring and gesture timing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TouchConfig {
    /// GPIO line the sensor output is wired to (BCM numbering)
    pub gpio_pin: u32,

    /// The sensor drives the line high while touched
    pub active_high: bool,

    /// How often the line is polled, in milliseconds
    pub sample_interval_ms: u64,

    /// Hold time before a press becomes a long press, in seconds
    pub long_press_secs: f32,

    /// Window after a release in which a second press makes a double tap
    pub double_tap_secs: f32,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            gpio_pin: 17,
            active_high: true,
            sample_interval_ms: 10,
            long_press_secs: 1.0,
            double_tap_secs: 0.5,
        }
    }
}

impl TouchConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn long_press(&self) -> Duration {
        secs(self.long_press_secs)
    }

    pub fn double_tap(&self) -> Duration {
        secs(self.double_tap_secs)
    }
}

/// Voice command capture settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Capture stops on its own after this many seconds
    pub timeout_secs: f32,

    /// Recordings shorter than this are discarded instead of dispatched
    pub min_duration_secs: f32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10.0,
            min_duration_secs: 0.3,
        }
    }
}

impl RecordingConfig {
    /// `None` when `timeout_secs` is zero, i.e. capture runs until stopped.
    pub fn timeout(&self) -> Option<Duration> {
        Some(secs(self.timeout_secs)).filter(|timeout| !timeout.is_zero())
    }

    pub fn min_duration(&self) -> Duration {
        secs(self.min_duration_secs)
    }
}

/// Seconds from the config file; negative or invalid values become zero.
fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Cloud services used for intent detection and narration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Wit.ai server access token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wit_key: Option<String>,

    /// Google Gemini API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_key: Option<String>,

    /// Gemini model used for narration and prompts
    pub gemini_model: String,

    /// Number of retries for failed intent requests
    pub retries: u8,

    /// Phrase stripped from the front of free-form prompts
    pub wake_phrase: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            wit_key: None,
            gemini_key: None,
            gemini_model: "gemini-1.5-flash".to_string(),
            retries: 2,
            wake_phrase: "hey visio".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn wit_key(&self) -> Option<&str> {
        self.wit_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn gemini_key(&self) -> Option<&str> {
        self.gemini_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Shell commands backing the camera, speaker and climate sensor.
///
/// `{path}` and `{text}` are substituted before the command is run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Writes a JPEG still to `{path}`
    pub camera: String,

    /// Speaks `{text}` aloud
    pub speak: String,

    /// Prints `<temperature> <humidity>` on stdout
    pub climate: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            camera: "rpicam-still -n -t 1 -o {path}".to_string(),
            speak: "espeak-ng {text}".to_string(),
            climate: "visio-dht11 27".to_string(),
        }
    }
}

/// Optional commands run on session transitions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HookConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_started: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_stopped: Option<String>,
}

impl Config {
    /// Apply secrets from the environment over the file values.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(WIT_KEY_ENV) {
            self.services.wit_key = Some(key);
        }
        if let Ok(key) = std::env::var(GEMINI_KEY_ENV) {
            self.services.gemini_key = Some(key);
        }
    }
}

/// Manages loading and saving configuration files.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the default configuration directory.
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Creates a new ConfigManager with a specified configuration directory.
    pub fn with_config_dir<P: AsRef<Path>>(dir: P) -> Self {
        let config_path = dir.as_ref().join(format!("{}.toml", APP_NAME));
        Self { config_path }
    }

    /// Returns the default path to the configuration file.
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to retrieve configuration directory")?;
        Ok(config_dir.join(APP_NAME).join(format!("{}.toml", APP_NAME)))
    }

    /// Loads the configuration from the config file or returns default.
    ///
    /// Secrets are not read from the environment here, see [`Config::apply_env`].
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            info!(path = ?self.config_path, "No config file found, using defaults");
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file at {:?}", self.config_path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file at {:?}", self.config_path))?;

        Ok(config)
    }

    /// Saves the configuration to the config file.
    pub fn save(&self, config: &Config) -> Result<()> {
        let config_dir = self
            .config_path
            .parent()
            .with_context(|| format!("Failed to get parent directory of {:?}", self.config_path))?;

        fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory at {:?}", config_dir))?;

        let serialized =
            toml::to_string_pretty(&config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, serialized)
            .with_context(|| format!("Failed to write config file at {:?}", self.config_path))?;

        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Warn about settings that leave parts of the device non-functional.
pub fn warn_missing_keys(config: &Config) {
    if config.services.wit_key().is_none() {
        warn!(
            "Wit.ai key is not set. Voice commands will not work without it. \
             Set services.wit_key or the {} environment variable.",
            WIT_KEY_ENV
        );
    }
    if config.services.gemini_key().is_none() {
        warn!(
            "Gemini key is not set. Scene narration and prompts will fail. \
             Set services.gemini_key or the {} environment variable.",
            GEMINI_KEY_ENV
        );
    }
}
