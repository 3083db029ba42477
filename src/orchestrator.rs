//! Session orchestration.
//!
//! Gestures and capture notifications are queued on a mailbox drained by a
//! single worker, so the recording session only ever sees one start or stop
//! at a time. Work that talks to the outside world (scene narration, intent
//! dispatch) goes on a second queue and runs in order behind it, keeping
//! the worker free to react to the next gesture.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use visio_audio::{
    CaptureEnd, CaptureEndedCallback, RecordError, Recording, RecordingArtifact, RecordingSession,
    SessionId,
};
use visio_core::{Gesture, RecordingConfig, SessionState};
use visio_intent::{IntentDispatcher, IntentHandlers};
use visio_touch::GestureCallback;

use crate::hooks::Hooks;

/// Recording limits applied by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    /// Capture stops on its own after this long
    pub timeout: Option<Duration>,
    /// Shorter recordings are discarded instead of dispatched
    pub min_duration: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&RecordingConfig::default())
    }
}

impl From<&RecordingConfig> for OrchestratorConfig {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            timeout: config.timeout(),
            min_duration: config.min_duration(),
        }
    }
}

#[derive(Debug)]
enum Event {
    Gesture(Gesture),
    CaptureEnded(SessionId, CaptureEnd),
    Shutdown,
}

#[derive(Debug)]
enum Action {
    Ambient,
    Dispatch(RecordingArtifact),
}

/// Sending side of the orchestrator mailbox. Cheap to clone; all methods
/// return immediately.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    events: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<SessionState>,
}

/// Receiving side, consumed by [`SessionOrchestrator::run`].
#[derive(Debug)]
pub struct Mailbox {
    events: mpsc::UnboundedReceiver<Event>,
    state: watch::Sender<SessionState>,
}

/// Create a connected handle and mailbox.
pub fn mailbox() -> (OrchestratorHandle, Mailbox) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(SessionState::Idle);
    (
        OrchestratorHandle {
            events: events_tx,
            state: state_rx,
        },
        Mailbox {
            events: events_rx,
            state: state_tx,
        },
    )
}

impl OrchestratorHandle {
    /// Queue a classified gesture.
    pub fn on_gesture(&self, gesture: Gesture) {
        self.send(Event::Gesture(gesture));
    }

    /// Queue the end of a capture that stopped on its own.
    pub fn on_capture_ended(&self, id: SessionId, end: CaptureEnd) {
        self.send(Event::CaptureEnded(id, end));
    }

    /// Callback for [`visio_touch::GestureClassifier`].
    pub fn gesture_callback(&self) -> GestureCallback {
        let events = self.events.clone();
        Box::new(move |gesture| {
            events
                .send(Event::Gesture(gesture))
                .map_err(|_| anyhow::anyhow!("orchestrator is not running"))
        })
    }

    /// Callback for [`RecordingSession::with_capture_ended`].
    pub fn capture_ended_callback(&self) -> CaptureEndedCallback {
        let handle = self.clone();
        Arc::new(move |id, end| handle.on_capture_ended(id, end))
    }

    /// Ask the worker to stop after the events already queued. An active
    /// recording is stopped and discarded; queued actions still run.
    pub fn shutdown(&self) {
        self.send(Event::Shutdown);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch session state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    fn send(&self, event: Event) {
        if let Err(e) = self.events.send(event) {
            warn!(event = ?e.0, "orchestrator is not running, dropping event");
        }
    }
}

/// Owns the session state and drives the recording session from gestures.
pub struct SessionOrchestrator {
    session: Arc<RecordingSession>,
    dispatcher: Arc<IntentDispatcher>,
    handlers: Arc<dyn IntentHandlers>,
    hooks: Hooks,
    config: OrchestratorConfig,
    state: Option<watch::Sender<SessionState>>,
    active: Option<SessionId>,
    actions: Option<mpsc::UnboundedSender<Action>>,
}

impl SessionOrchestrator {
    /// `handlers.describe_scene()` doubles as the ambient action for a
    /// single tap while idle.
    pub fn new(
        session: Arc<RecordingSession>,
        dispatcher: Arc<IntentDispatcher>,
        handlers: Arc<dyn IntentHandlers>,
        hooks: Hooks,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            session,
            dispatcher,
            handlers,
            hooks,
            config,
            state: None,
            active: None,
            actions: None,
        }
    }

    /// Run the worker on the current runtime.
    pub fn spawn(self, mailbox: Mailbox) -> JoinHandle<()> {
        tokio::spawn(self.run(mailbox))
    }

    /// Drain `mailbox` until shutdown, then wait for queued actions.
    pub async fn run(mut self, mailbox: Mailbox) {
        let Mailbox { mut events, state } = mailbox;
        self.state = Some(state);

        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        self.actions = Some(actions_tx);
        let actions = tokio::spawn(run_actions(
            actions_rx,
            self.dispatcher.clone(),
            self.handlers.clone(),
        ));

        info!(config = ?self.config, "session orchestrator started");
        while let Some(event) = events.recv().await {
            if let Event::Shutdown = event {
                break;
            }
            self.handle(event).await;
        }

        if self.active.is_some() {
            info!("stopping active recording for shutdown");
            if let Some(recording) = self.stop_recording().await {
                debug!(samples = recording.artifact().samples(), "recording discarded");
            }
        }

        // Closing the queue lets the action worker finish what is pending.
        self.actions = None;
        if let Err(e) = actions.await {
            error!("Action worker failed: {:?}", e);
        }
        info!("session orchestrator stopped");
    }

    fn current_state(&self) -> SessionState {
        self.state
            .as_ref()
            .map_or(SessionState::Idle, |state| *state.borrow())
    }

    fn set_state(&self, next: SessionState) {
        if let Some(state) = &self.state {
            let previous = state.send_replace(next);
            if previous != next {
                info!(state = ?next, "State changed");
            }
        }
    }

    async fn handle(&mut self, event: Event) {
        let state = self.current_state();
        debug!(?state, ?event, "handling event");

        match (state, event) {
            (_, Event::Gesture(Gesture::Long)) => {
                debug!("long press has no action bound");
            }
            (SessionState::Idle, Event::Gesture(Gesture::Single)) => {
                self.enqueue(Action::Ambient);
            }
            (SessionState::Idle, Event::Gesture(Gesture::Double)) => {
                self.start_recording().await;
            }
            (SessionState::Recording, Event::Gesture(Gesture::Single)) => {
                self.finish_recording().await;
            }
            (SessionState::Recording, Event::Gesture(Gesture::Double)) => {
                debug!("already recording, ignoring double tap");
            }
            (SessionState::Recording, Event::CaptureEnded(id, end)) if self.active == Some(id) => {
                info!(id, ?end, "capture ended on its own");
                self.finish_recording().await;
            }
            (_, Event::CaptureEnded(id, end)) => {
                debug!(id, ?end, active = ?self.active, "ignoring stale capture notification");
            }
            (_, Event::Shutdown) => {}
        }
    }

    async fn start_recording(&mut self) {
        let session = self.session.clone();
        let timeout = self.config.timeout;
        match tokio::task::spawn_blocking(move || session.start(timeout)).await {
            Ok(Ok(id)) => {
                self.active = Some(id);
                self.set_state(SessionState::Recording);
                self.hooks.recording_started();
            }
            Ok(Err(e)) => error!("Failed to start recording: {}", e),
            Err(e) => error!("Failed to start recording: {:?}", e),
        }
    }

    /// Stop the session and return to idle, whatever the outcome.
    async fn stop_recording(&mut self) -> Option<Recording> {
        self.active = None;
        let session = self.session.clone();
        let result = tokio::task::spawn_blocking(move || session.stop()).await;
        self.set_state(SessionState::Idle);
        self.hooks.recording_stopped();

        match result {
            Ok(Ok(recording)) => Some(recording),
            Ok(Err(RecordError::NotRecording)) => {
                warn!("Recording session was already stopped");
                None
            }
            Ok(Err(e)) => {
                error!("Failed to finish recording: {}", e);
                None
            }
            Err(e) => {
                error!("Failed to finish recording: {:?}", e);
                None
            }
        }
    }

    async fn finish_recording(&mut self) {
        let Some(recording) = self.stop_recording().await else {
            return;
        };
        if let Recording::Partial { cause, .. } = &recording {
            warn!(error = %cause, "dispatching partial recording");
        }

        let artifact = recording.into_artifact();
        if artifact.is_empty() || artifact.duration() < self.config.min_duration {
            info!(
                length_seconds = artifact.duration().as_secs_f64(),
                min_duration = ?self.config.min_duration,
                "discarding recording"
            );
            return;
        }
        self.enqueue(Action::Dispatch(artifact));
    }

    fn enqueue(&self, action: Action) {
        let sent = match &self.actions {
            Some(actions) => actions.send(action).is_ok(),
            None => false,
        };
        if !sent {
            error!("Action queue closed, dropping action");
        }
    }
}

/// Run actions one at a time, in the order they were queued. Each action
/// runs in its own task so a panicking handler does not end the queue.
async fn run_actions(
    mut actions: mpsc::UnboundedReceiver<Action>,
    dispatcher: Arc<IntentDispatcher>,
    handlers: Arc<dyn IntentHandlers>,
) {
    while let Some(action) = actions.recv().await {
        let task = match action {
            Action::Ambient => {
                let handlers = handlers.clone();
                tokio::spawn(async move {
                    if let Err(e) = handlers.describe_scene().await {
                        error!("Scene description failed: {:#}", e);
                    }
                })
            }
            Action::Dispatch(artifact) => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let id = artifact.id();
                    match dispatcher.dispatch(artifact).await {
                        Ok(dispatched) => info!(
                            id,
                            intent = dispatched.intent.as_ref().map(|intent| intent.name()),
                            "voice command handled"
                        ),
                        Err(e) => error!(id, "Voice command failed: {:#}", anyhow::Error::from(e)),
                    }
                })
            }
        };

        if let Err(e) = task.await {
            error!("Error joining action task: {:?}", e);
        }
    }
}
