use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use visio::assistant::Assistant;
use visio::device::CommandDevices;
use visio::gemini::GeminiClient;
use visio::hooks::Hooks;
use visio::orchestrator::{self, OrchestratorConfig, SessionOrchestrator};
use visio::{
    APP_NAME_PRETTY, ConfigManager, CpalSource, DEFAULT_LOG_LEVEL, GestureClassifier,
    IntentDispatcher, LOG_ENV, RecordingSession, SysfsGpioLine, TokioTimers, VERSION, WitClient,
};
use visio_core::warn_missing_keys;
use visio_touch::{ClassifierConfig, EdgeSampler, run_sampler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .init();

    // Load config
    let config_manager = ConfigManager::new()?;
    let mut config = config_manager.load()?;
    // save back the config to create the file if it doesn't exist
    config_manager.save(&config)?;
    // secrets from the environment are never written to the file
    config.apply_env();
    warn_missing_keys(&config);
    info!(
        version = VERSION,
        config_path = %config_manager.config_path().display(),
        "Starting {}",
        APP_NAME_PRETTY
    );

    // Collaborators
    let devices = Arc::new(CommandDevices::new(config.commands.clone()));
    let narrator = Arc::new(GeminiClient::new(
        config.services.gemini_key().unwrap_or_default(),
        config.services.gemini_model.clone(),
    ));
    info!(model = narrator.model(), "Narration through Gemini");
    let assistant = Arc::new(
        Assistant::new(narrator, devices.clone(), devices.clone(), devices)
            .with_wake_phrase(&config.services.wake_phrase)?,
    );
    let intents = Arc::new(WitClient::from_api_key(
        config.services.wit_key().unwrap_or_default(),
    ));
    let dispatcher = Arc::new(IntentDispatcher::new(
        intents,
        assistant.clone(),
        config.services.retries,
    ));

    // Session orchestrator
    let (handle, mailbox) = orchestrator::mailbox();
    let session = Arc::new(
        RecordingSession::new(Arc::new(CpalSource::new()))
            .with_capture_ended(handle.capture_ended_callback()),
    );
    let worker = SessionOrchestrator::new(
        session,
        dispatcher,
        assistant,
        Hooks::new(config.hooks.clone()),
        OrchestratorConfig::from(&config.recording),
    )
    .spawn(mailbox);

    // Touch input
    let timers = Arc::new(TokioTimers::current().context("Not running inside a tokio runtime")?);
    let classifier = GestureClassifier::new(
        ClassifierConfig::from(&config.touch),
        timers,
        handle.gesture_callback(),
    );
    let line = SysfsGpioLine::open(config.touch.gpio_pin, config.touch.active_high)
        .with_context(|| format!("Failed to open touch sensor on gpio {}", config.touch.gpio_pin))?;

    info!(gpio_pin = config.touch.gpio_pin, "{} ready", APP_NAME_PRETTY);
    run_sampler(
        EdgeSampler::new(line),
        classifier,
        config.touch.sample_interval(),
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C, stopping: {}", e);
            }
        },
    )
    .await;

    info!("Shutting down");
    handle.shutdown();
    if let Err(e) = worker.await {
        warn!("Orchestrator ended abnormally: {:?}", e);
    }

    Ok(())
}
