//! Feedback commands run on recording transitions, e.g. to play a chime.

use std::fmt;
use std::process::Stdio;

use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use visio_core::HookConfig;

/// Variable naming the transition, set for every hook command.
pub const HOOK_EVENT_ENV: &str = "VISIO_HOOK_EVENT";

/// Recording transitions a hook can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    RecordingStarted,
    RecordingStopped,
}

impl HookEvent {
    pub fn name(self) -> &'static str {
        match self {
            HookEvent::RecordingStarted => "recording_started",
            HookEvent::RecordingStopped => "recording_stopped",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional shell commands for the start and end of a recording.
///
/// Commands run in the background so a slow chime never delays the
/// orchestrator. A failing command is logged and otherwise ignored.
#[derive(Debug, Clone, Default)]
pub struct Hooks {
    config: HookConfig,
}

impl Hooks {
    pub fn new(config: HookConfig) -> Self {
        Self { config }
    }

    pub fn recording_started(&self) {
        self.fire(HookEvent::RecordingStarted);
    }

    pub fn recording_stopped(&self) {
        self.fire(HookEvent::RecordingStopped);
    }

    fn command(&self, event: HookEvent) -> Option<&str> {
        match event {
            HookEvent::RecordingStarted => self.config.recording_started.as_deref(),
            HookEvent::RecordingStopped => self.config.recording_stopped.as_deref(),
        }
    }

    /// Spawn the command configured for `event`, if any. The task resolves to
    /// whether the command exited successfully. Needs a tokio runtime.
    fn fire(&self, event: HookEvent) -> Option<JoinHandle<bool>> {
        let command = self.command(event)?.to_owned();
        Some(tokio::spawn(run(event, command)))
    }
}

async fn run(event: HookEvent, command: String) -> bool {
    debug!(hook = %event, %command, "running hook");

    let output = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .env(HOOK_EVENT_ENV, event.name())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                hook = %event,
                status = %output.status,
                stderr = %stderr.trim(),
                "hook failed"
            );
            false
        }
        Err(e) => {
            warn!(hook = %event, error = %e, "could not run hook");
            false
        }
    }
}
