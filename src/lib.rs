// Re-export from sub-crates
pub use visio_audio::{
    CaptureEnd, CpalSource, RecordError, Recording, RecordingArtifact, RecordingSession, SessionId,
};
pub use visio_core::{
    APP_NAME, APP_NAME_PRETTY, Config, ConfigManager, DEFAULT_LOG_LEVEL, Gesture, LOG_ENV,
    SessionState,
};
pub use visio_intent::{
    DispatchError, Intent, IntentDispatcher, IntentError, IntentHandlers, IntentService, WitClient,
};
pub use visio_touch::{GestureClassifier, SysfsGpioLine, TokioTimers};

// App-specific modules
pub mod assistant;
pub mod device;
pub mod gemini;
pub mod hooks;
pub mod orchestrator;

// Version from this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
