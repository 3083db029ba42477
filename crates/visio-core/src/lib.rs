//! Core types and configuration for visio.
//!
//! This crate provides platform-agnostic types shared by the touch, audio
//! and intent crates as well as the device binary.

mod config;
mod gesture;
mod state;

pub use config::{
    CommandConfig, Config, ConfigManager, HookConfig, RecordingConfig, ServiceConfig, TouchConfig,
    warn_missing_keys,
};
pub use gesture::{EdgeKind, Gesture, TouchEdge};
pub use state::SessionState;

/// Application name
pub const APP_NAME: &str = "visio";

/// Pretty application name for display
pub const APP_NAME_PRETTY: &str = "Visio";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "VISIO_LOG";
