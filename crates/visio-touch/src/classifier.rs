//! Tap timing state machine.
//!
//! A press arms a long-press timer. A release arms a tap-resolution timer
//! which reports a single tap unless a second press arrives within the
//! double-tap window first, in which case the double tap is reported
//! immediately and the pending single tap is dropped.
//!
//! All state lives behind one mutex. Edges and timer firings take the lock
//! only long enough to update state and arm or cancel timers; the gesture
//! callback always runs after the lock has been released.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};
use visio_core::{EdgeKind, Gesture, TouchConfig, TouchEdge};

use crate::timer::{CancelHandle, TimerService};

/// Receives every classified gesture.
pub type GestureCallback = Box<dyn Fn(Gesture) -> anyhow::Result<()> + Send + Sync>;

/// Timing windows for gesture classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Hold time after which a press is reported as a long press
    pub long_press: Duration,
    /// Release-to-press gap under which two taps make a double tap
    pub double_tap: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            long_press: Duration::from_millis(1000),
            double_tap: Duration::from_millis(500),
        }
    }
}

impl From<&TouchConfig> for ClassifierConfig {
    fn from(config: &TouchConfig) -> Self {
        Self {
            long_press: config.long_press(),
            double_tap: config.double_tap(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Pressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    LongPress,
    TapResolution,
}

/// A timer owned by the state machine. The id lets a firing timer check that
/// it has not been superseded while it was waiting for the lock.
#[derive(Debug)]
struct ArmedTimer {
    id: u64,
    handle: CancelHandle,
}

impl ArmedTimer {
    fn cancel(self) {
        self.handle.cancel();
    }
}

#[derive(Debug)]
struct ClassifierState {
    phase: Phase,
    press_started: Option<Instant>,
    last_release: Option<Instant>,
    pending_taps: u8,
    long_press: Option<ArmedTimer>,
    tap_resolution: Option<ArmedTimer>,
    next_timer_id: u64,
}

impl ClassifierState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            press_started: None,
            last_release: None,
            pending_taps: 0,
            long_press: None,
            tap_resolution: None,
            next_timer_id: 0,
        }
    }

    fn timer_id(&mut self) -> u64 {
        self.next_timer_id += 1;
        self.next_timer_id
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<ArmedTimer> {
        match kind {
            TimerKind::LongPress => &mut self.long_press,
            TimerKind::TapResolution => &mut self.tap_resolution,
        }
    }
}

struct Inner {
    config: ClassifierConfig,
    timers: Arc<dyn TimerService>,
    state: Mutex<ClassifierState>,
    callback: GestureCallback,
    this: Weak<Inner>,
}

/// Classifies touch edges into [`Gesture`]s.
///
/// Cheap to clone; clones share the same state machine.
#[derive(Clone)]
pub struct GestureClassifier {
    inner: Arc<Inner>,
}

impl GestureClassifier {
    pub fn new(
        config: ClassifierConfig,
        timers: Arc<dyn TimerService>,
        callback: GestureCallback,
    ) -> Self {
        let inner = Arc::new_cyclic(|this| Inner {
            config,
            timers,
            state: Mutex::new(ClassifierState::new()),
            callback,
            this: this.clone(),
        });
        Self { inner }
    }

    /// Feed one edge from the sampler.
    pub fn handle_edge(&self, edge: TouchEdge) {
        let gesture = {
            let mut state = self.inner.state.lock();
            match edge.kind {
                EdgeKind::Rising => self.inner.on_press(&mut state, edge.timestamp),
                EdgeKind::Falling => {
                    self.inner.on_release(&mut state, edge.timestamp);
                    None
                }
            }
        };

        if let Some(gesture) = gesture {
            self.inner.emit(gesture);
        }
    }

    /// Whether the sensor is currently held according to the state machine.
    pub fn is_pressed(&self) -> bool {
        self.inner.state.lock().phase == Phase::Pressed
    }

    /// Cancel any armed timers and forget in-flight taps.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.long_press.take() {
            timer.cancel();
        }
        if let Some(timer) = state.tap_resolution.take() {
            timer.cancel();
        }
        *state = ClassifierState::new();
    }
}

impl Inner {
    fn on_press(&self, state: &mut ClassifierState, now: Instant) -> Option<Gesture> {
        if state.phase == Phase::Pressed {
            trace!("ignoring rising edge while already pressed");
            return None;
        }

        state.phase = Phase::Pressed;
        state.press_started = Some(now);
        self.arm(state, TimerKind::LongPress, self.config.long_press);

        let within_window = state.last_release.is_some_and(|released| {
            now.saturating_duration_since(released) < self.config.double_tap
        });

        if within_window {
            // Second press inside the window: the double tap wins over the
            // single tap that the first release was waiting to report.
            if let Some(timer) = state.tap_resolution.take() {
                timer.cancel();
            }
            state.pending_taps = 0;
            return Some(Gesture::Double);
        }

        // A resolution timer that is still armed here is late; its tap is
        // outside the window already, so report it now rather than let it
        // clear the tap that is starting.
        let late_single = match state.tap_resolution.take() {
            Some(timer) => {
                timer.cancel();
                (state.pending_taps == 1).then_some(Gesture::Single)
            }
            None => None,
        };
        state.pending_taps = 1;
        late_single
    }

    fn on_release(&self, state: &mut ClassifierState, now: Instant) {
        if state.phase != Phase::Pressed {
            trace!("ignoring falling edge while not pressed");
            return;
        }

        state.phase = Phase::Idle;
        if let Some(timer) = state.long_press.take() {
            timer.cancel();
        }
        state.last_release = Some(now);

        if let Some(started) = state.press_started.take() {
            debug!(
                held_ms = now.saturating_duration_since(started).as_millis() as u64,
                pending_taps = state.pending_taps,
                "touch released"
            );
        }

        if state.pending_taps == 1 {
            self.arm(state, TimerKind::TapResolution, self.config.double_tap);
        }
    }

    fn on_timer(&self, kind: TimerKind, id: u64) -> Option<Gesture> {
        let mut state = self.state.lock();

        let slot = state.slot(kind);
        if slot.as_ref().map(|timer| timer.id) != Some(id) {
            trace!(?kind, id, "ignoring superseded timer");
            return None;
        }
        *slot = None;

        match kind {
            TimerKind::LongPress => {
                if state.phase != Phase::Pressed {
                    return None;
                }
                state.pending_taps = 0;
                Some(Gesture::Long)
            }
            TimerKind::TapResolution => {
                if state.pending_taps != 1 {
                    return None;
                }
                state.pending_taps = 0;
                Some(Gesture::Single)
            }
        }
    }

    /// Arm a timer of `kind`, replacing (and cancelling) any previous one.
    fn arm(&self, state: &mut ClassifierState, kind: TimerKind, delay: Duration) {
        let id = state.timer_id();
        let this = self.this.clone();
        let handle = self.timers.after(
            delay,
            Box::new(move || {
                let Some(inner) = this.upgrade() else {
                    return;
                };
                if let Some(gesture) = inner.on_timer(kind, id) {
                    inner.emit(gesture);
                }
            }),
        );

        if let Some(previous) = state.slot(kind).replace(ArmedTimer { id, handle }) {
            previous.cancel();
        }
    }

    fn emit(&self, gesture: Gesture) {
        info!(%gesture, "gesture classified");
        match catch_unwind(AssertUnwindSafe(|| (self.callback)(gesture))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(%gesture, error = ?e, "gesture callback failed"),
            Err(_) => error!(%gesture, "gesture callback panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    use super::*;
    use crate::timer::{TimerCallback, TokioTimers};

    /// Timer service that only records callbacks; the test decides when (and
    /// whether) each one runs.
    #[derive(Default)]
    struct ManualTimers {
        armed: parking_lot::Mutex<Vec<(Duration, Option<TimerCallback>)>>,
    }

    impl ManualTimers {
        /// Take the callback of the `index`-th timer armed with `delay`.
        fn take(&self, delay: Duration, index: usize) -> TimerCallback {
            self.armed
                .lock()
                .iter_mut()
                .filter(|(d, _)| *d == delay)
                .nth(index)
                .and_then(|(_, callback)| callback.take())
                .expect("no such timer")
        }
    }

    impl TimerService for ManualTimers {
        fn after(&self, delay: Duration, callback: TimerCallback) -> CancelHandle {
            self.armed.lock().push((delay, Some(callback)));
            CancelHandle::new(Arc::new(std::sync::atomic::AtomicBool::new(false)), None)
        }
    }

    struct Harness {
        classifier: GestureClassifier,
        gestures: mpsc::UnboundedReceiver<(Gesture, Instant)>,
        origin: Instant,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, gestures) = mpsc::unbounded_channel();
            let timers = Arc::new(TokioTimers::current().unwrap());
            let classifier = GestureClassifier::new(
                ClassifierConfig::default(),
                timers,
                Box::new(move |gesture| {
                    tx.send((gesture, Instant::now()))?;
                    Ok(())
                }),
            );
            Self {
                classifier,
                gestures,
                origin: Instant::now(),
            }
        }

        /// Move virtual time to `ms` after the start of the test.
        async fn at(&self, ms: u64) {
            let target = self.origin + Duration::from_millis(ms);
            tokio::time::sleep_until(target).await;
        }

        async fn press(&self, ms: u64) {
            self.at(ms).await;
            self.classifier.handle_edge(TouchEdge::rising(Instant::now()));
        }

        async fn release(&self, ms: u64) {
            self.at(ms).await;
            self.classifier.handle_edge(TouchEdge::falling(Instant::now()));
        }

        /// Drain everything classified so far, with times relative to start.
        fn drain(&mut self) -> Vec<(Gesture, u64)> {
            let mut out = Vec::new();
            while let Ok((gesture, at)) = self.gestures.try_recv() {
                out.push((gesture, (at - self.origin).as_millis() as u64));
            }
            out
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_second_tap_is_double() {
        let mut h = Harness::new();
        h.press(0).await;
        h.release(100).await;
        h.press(300).await;
        h.release(400).await;
        h.at(3000).await;

        let gestures = h.drain();
        assert_eq!(gestures.len(), 1, "{gestures:?}");
        assert_eq!(gestures[0].0, Gesture::Double);
        assert!(gestures[0].1 <= 400);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_taps_are_two_singles() {
        let mut h = Harness::new();
        h.press(0).await;
        h.release(100).await;
        h.press(800).await;
        h.release(900).await;
        h.at(3000).await;

        let gestures = h.drain();
        assert_eq!(gestures, vec![(Gesture::Single, 600), (Gesture::Single, 1400)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_taps_each_yield_one_single() {
        let mut h = Harness::new();
        let spacing = 500 + 50 + 80;
        for i in 0..5 {
            let start = i * spacing;
            h.press(start).await;
            h.release(start + 80).await;
        }
        h.at(10_000).await;

        let gestures = h.drain();
        assert_eq!(gestures.len(), 5);
        assert!(gestures.iter().all(|(g, _)| *g == Gesture::Single));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_is_single_long() {
        let mut h = Harness::new();
        h.press(0).await;
        h.at(2500).await;
        assert!(h.classifier.is_pressed());
        h.release(2500).await;
        h.at(5000).await;

        assert_eq!(h.drain(), vec![(Gesture::Long, 1000)]);
        assert!(!h.classifier.is_pressed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_before_long_press_cancels_it() {
        let mut h = Harness::new();
        h.press(0).await;
        h.release(999).await;
        h.at(3000).await;

        assert_eq!(h.drain(), vec![(Gesture::Single, 1499)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_press_then_quick_tap_still_doubles() {
        // A long press does not close the double-tap window of its release.
        let mut h = Harness::new();
        h.press(0).await;
        h.release(1200).await;
        h.press(1400).await;
        h.release(1450).await;
        h.at(4000).await;

        let gestures: Vec<Gesture> = h.drain().into_iter().map(|(g, _)| g).collect();
        assert_eq!(gestures, vec![Gesture::Long, Gesture::Double]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_edges_are_ignored() {
        let mut h = Harness::new();
        h.press(0).await;
        h.press(10).await;
        h.release(50).await;
        h.release(60).await;
        h.at(2000).await;

        assert_eq!(h.drain(), vec![(Gesture::Single, 550)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_callback_keeps_state_consistent() {
        let timers = Arc::new(TokioTimers::current().unwrap());
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = calls.clone();
        let classifier = GestureClassifier::new(
            ClassifierConfig::default(),
            timers,
            Box::new(move |gesture| {
                seen.lock().push(gesture);
                anyhow::bail!("handler exploded")
            }),
        );

        classifier.handle_edge(TouchEdge::rising(Instant::now()));
        sleep(Duration::from_millis(50)).await;
        classifier.handle_edge(TouchEdge::falling(Instant::now()));
        sleep(Duration::from_millis(1000)).await;

        classifier.handle_edge(TouchEdge::rising(Instant::now()));
        sleep(Duration::from_millis(1500)).await;
        classifier.handle_edge(TouchEdge::falling(Instant::now()));

        assert_eq!(*calls.lock(), vec![Gesture::Single, Gesture::Long]);
        assert!(!classifier.is_pressed());
    }

    #[test]
    fn test_late_resolution_timer_reports_single_once() {
        let timers = Arc::new(ManualTimers::default());
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = calls.clone();
        let config = ClassifierConfig::default();
        let classifier = GestureClassifier::new(
            config,
            timers.clone(),
            Box::new(move |gesture| {
                seen.lock().push(gesture);
                Ok(())
            }),
        );

        let t0 = Instant::now();
        classifier.handle_edge(TouchEdge::rising(t0));
        classifier.handle_edge(TouchEdge::falling(t0 + Duration::from_millis(100)));
        // The window has passed but the resolution timer has not run yet.
        classifier.handle_edge(TouchEdge::rising(t0 + Duration::from_millis(700)));
        assert_eq!(*calls.lock(), vec![Gesture::Single]);

        // The superseded timer finally runs and must not report the tap again.
        let stale = timers.take(config.double_tap, 0);
        stale();
        assert_eq!(*calls.lock(), vec![Gesture::Single]);

        // The second tap resolves normally through its own timer.
        classifier.handle_edge(TouchEdge::falling(t0 + Duration::from_millis(800)));
        let current = timers.take(config.double_tap, 1);
        current();
        assert_eq!(*calls.lock(), vec![Gesture::Single, Gesture::Single]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_drops_pending_tap() {
        let mut h = Harness::new();
        h.press(0).await;
        h.release(100).await;
        h.classifier.reset();
        h.at(2000).await;

        assert!(h.drain().is_empty());
    }
}
