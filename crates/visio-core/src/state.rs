//! Interaction session state.

/// Whether the device is currently capturing a voice command.
///
/// Only the session orchestrator transitions this value, and only in
/// response to a classified gesture or the end of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Listening for gestures, microphone closed
    #[default]
    Idle,
    /// Capturing a voice command
    Recording,
}
