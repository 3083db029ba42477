//! Camera, speaker and climate sensor.
//!
//! The hardware is driven through external programs configured in the
//! `[commands]` section. Templates are split on whitespace and `{path}` /
//! `{text}` are substituted per argument, so spoken text never goes through
//! a shell.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;
use visio_core::CommandConfig;

#[async_trait]
pub trait Camera: Send + Sync {
    /// Take a still photo, returned as JPEG bytes.
    async fn capture(&self) -> anyhow::Result<Vec<u8>>;
}

#[async_trait]
pub trait Speaker: Send + Sync {
    /// Speak `text`, returning once playback has finished.
    async fn speak(&self, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ClimateSensor: Send + Sync {
    async fn read(&self) -> anyhow::Result<Climate>;
}

/// One temperature/humidity reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    /// Degrees Celsius
    pub temperature: f32,
    /// Relative humidity in percent
    pub humidity: f32,
}

impl Climate {
    /// Parse `<temperature> <humidity>` as printed by the sensor command.
    pub fn parse(output: &str) -> anyhow::Result<Self> {
        let mut fields = output.split_whitespace();
        let (Some(temperature), Some(humidity)) = (fields.next(), fields.next()) else {
            bail!("expected `<temperature> <humidity>`, got {:?}", output.trim());
        };
        Ok(Self {
            temperature: temperature
                .parse()
                .with_context(|| format!("invalid temperature {:?}", temperature))?,
            humidity: humidity
                .parse()
                .with_context(|| format!("invalid humidity {:?}", humidity))?,
        })
    }
}

/// Devices backed by the configured commands.
#[derive(Debug, Clone)]
pub struct CommandDevices {
    commands: CommandConfig,
    photo_dir: PathBuf,
}

static PHOTO_COUNTER: AtomicU64 = AtomicU64::new(0);

impl CommandDevices {
    pub fn new(commands: CommandConfig) -> Self {
        Self {
            commands,
            photo_dir: std::env::temp_dir(),
        }
    }

    /// Store photos in `dir` instead of the system temp directory.
    pub fn with_photo_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.photo_dir = dir.into();
        self
    }

    fn photo_path(&self) -> PathBuf {
        let n = PHOTO_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.photo_dir
            .join(format!("visio-{}-{}.jpg", std::process::id(), n))
    }
}

#[async_trait]
impl Camera for CommandDevices {
    async fn capture(&self) -> anyhow::Result<Vec<u8>> {
        let path = self.photo_path();
        let path_arg = path.to_string_lossy();
        run(&self.commands.camera, &[("path", path_arg.as_ref())]).await?;

        let photo = tokio::fs::read(&path)
            .await
            .with_context(|| format!("camera wrote no photo to {}", path.display()));
        remove_photo(&path).await;
        let photo = photo?;
        debug!(bytes = photo.len(), "photo captured");
        Ok(photo)
    }
}

#[async_trait]
impl Speaker for CommandDevices {
    async fn speak(&self, text: &str) -> anyhow::Result<()> {
        run(&self.commands.speak, &[("text", text)]).await?;
        Ok(())
    }
}

#[async_trait]
impl ClimateSensor for CommandDevices {
    async fn read(&self) -> anyhow::Result<Climate> {
        let output = run(&self.commands.climate, &[]).await?;
        Climate::parse(&output)
    }
}

async fn remove_photo(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), "failed to remove photo: {}", e);
    }
}

/// Split `template` into a program and arguments, substituting `{name}`
/// placeholders.
fn command_line(template: &str, vars: &[(&str, &str)]) -> anyhow::Result<(String, Vec<String>)> {
    let mut words = template.split_whitespace().map(|word| {
        vars.iter().fold(word.to_string(), |word, (name, value)| {
            word.replace(&format!("{{{}}}", name), value)
        })
    });
    let program = words.next().context("empty command")?;
    Ok((program, words.collect()))
}

/// Run a configured command to completion and return its stdout.
async fn run(template: &str, vars: &[(&str, &str)]) -> anyhow::Result<String> {
    let (program, args) = command_line(template, vars)?;
    debug!(%program, ?args, "running device command");

    let output = Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to run {}", program))?;

    if !output.status.success() {
        bail!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_substitutes_per_argument() {
        let (program, args) =
            command_line("espeak-ng -v en {text}", &[("text", "hello; rm -rf /")]).unwrap();
        assert_eq!(program, "espeak-ng");
        assert_eq!(args, vec!["-v", "en", "hello; rm -rf /"]);

        let (_, args) = command_line("cam -o {path}.tmp", &[("path", "/tmp/a")]).unwrap();
        assert_eq!(args, vec!["-o", "/tmp/a.tmp"]);

        assert!(command_line("   ", &[]).is_err());
    }

    #[test]
    fn test_climate_parse() {
        assert_eq!(
            Climate::parse("23 41\n").unwrap(),
            Climate {
                temperature: 23.0,
                humidity: 41.0
            }
        );
        assert_eq!(Climate::parse("21.5 60.2").unwrap().temperature, 21.5);
        assert!(Climate::parse("23").is_err());
        assert!(Climate::parse("warm humid").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_devices() {
        let dir = tempfile::tempdir().unwrap();
        let devices = CommandDevices::new(CommandConfig {
            camera: "cp /etc/hostname {path}".to_string(),
            speak: "true {text}".to_string(),
            climate: "echo 19 55".to_string(),
        })
        .with_photo_dir(dir.path());

        let reading = devices.read().await.unwrap();
        assert_eq!(reading.temperature, 19.0);
        assert_eq!(reading.humidity, 55.0);

        devices.speak("hello there").await.unwrap();

        match std::fs::read("/etc/hostname") {
            Ok(expected) => {
                assert_eq!(devices.capture().await.unwrap(), expected);
                // The photo is not left behind.
                assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
            }
            Err(_) => assert!(devices.capture().await.is_err()),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_an_error() {
        let devices = CommandDevices::new(CommandConfig {
            speak: "false {text}".to_string(),
            climate: "visio-no-such-program".to_string(),
            ..Default::default()
        });
        assert!(devices.speak("hi").await.is_err());
        assert!(devices.read().await.is_err());
    }
}
