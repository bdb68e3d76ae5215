//! Reminder engine: the blink-reminder mode state machine.
//!
//! ```text
//!            Start(camera=false)          Start(camera, !mgd)
//!   Off ──────────────────────▶ TimedPopup     Off ─────────▶ CameraGated
//!    ▲                                          Start(camera, mgd)
//!    │ Stop / retries exhausted           Off ─────────▶ CameraMgd
//!    └──────────────────────────────────── (any active mode)
//! ```
//!
//! The engine is synchronous and owns only its [`ReminderSession`]. Every
//! transition receives an [`EngineContext`] borrowing the supervisor, overlay
//! manager and timer queue from the runtime, plus the dispatch instant.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Preferences;
use crate::detector::{DetectorFault, DetectorSupervisor, RetryDecision};
use crate::exercise::ExerciseContext;
use crate::notify::{Notification, Notifier};
use crate::overlay::{OverlayKind, OverlayManager, OverlayRequest, OverlayToken};
use crate::timers::{TimerHandle, TimerKind, TimerQueue};

/// How long the Starting overlay stays up while the camera warms.
pub const STARTING_DISPLAY: Duration = Duration::from_millis(3_000);
/// Blink overlay fade.
pub const BLINK_FADE: Duration = Duration::from_millis(2_500);
/// How long the Stopped overlay stays up.
pub const STOPPED_DISPLAY: Duration = Duration::from_millis(2_000);

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Reminder mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMode {
    /// Not tracking.
    Off,
    /// Fixed cadence, no camera.
    TimedPopup,
    /// Remind only when no blink was seen for a full interval.
    CameraGated,
    /// Fixed cadence with the camera running; blinks dismiss early.
    CameraMgd,
}

impl ReminderMode {
    /// Mode selected by `Start(camera_enabled, mgd_enabled)`.
    #[must_use]
    pub fn select(camera_enabled: bool, mgd_enabled: bool) -> Self {
        match (camera_enabled, mgd_enabled) {
            (false, _) => Self::TimedPopup,
            (true, false) => Self::CameraGated,
            (true, true) => Self::CameraMgd,
        }
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        self != Self::Off
    }

    #[must_use]
    pub fn uses_camera(self) -> bool {
        matches!(self, Self::CameraGated | Self::CameraMgd)
    }
}

impl std::fmt::Display for ReminderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::TimedPopup => "timed-popup",
            Self::CameraGated => "camera-gated",
            Self::CameraMgd => "camera-mgd",
        })
    }
}

/// Collaborators borrowed for one engine transition.
pub struct EngineContext<'a> {
    pub detector: &'a mut DetectorSupervisor,
    pub overlays: &'a mut OverlayManager,
    pub timers: &'a mut TimerQueue,
    pub notifier: &'a Notifier,
    pub prefs: &'a Preferences,
    pub now: Instant,
}

impl EngineContext<'_> {
    /// Reborrow the parts the exercise scheduler needs.
    pub fn exercise(&mut self) -> ExerciseContext<'_> {
        ExerciseContext {
            overlays: self.overlays,
            timers: self.timers,
            prefs: self.prefs,
            now: self.now,
        }
    }
}

/// State owned exclusively by the engine.
#[derive(Debug)]
pub struct ReminderSession {
    mode: ReminderMode,
    interval: Duration,
    last_blink_at: Option<Instant>,
    overlay: Option<(OverlayToken, OverlayKind)>,
    tick: Option<TimerHandle>,
    paused: bool,
}

/// The reminder state machine.
#[derive(Debug)]
pub struct ReminderEngine {
    session: ReminderSession,
}

impl ReminderEngine {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            session: ReminderSession {
                mode: ReminderMode::Off,
                interval: interval.max(MIN_INTERVAL),
                last_blink_at: None,
                overlay: None,
                tick: None,
                paused: false,
            },
        }
    }

    #[must_use]
    pub fn mode(&self) -> ReminderMode {
        self.session.mode
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.mode.is_active()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.session.paused
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.session.interval
    }

    #[must_use]
    pub fn last_blink_at(&self) -> Option<Instant> {
        self.session.last_blink_at
    }

    /// Kind of the engine's current overlay, if any.
    #[must_use]
    pub fn overlay_kind(&self) -> Option<OverlayKind> {
        self.session.overlay.map(|(_, kind)| kind)
    }

    /// Handle of the pending cadence tick.
    #[must_use]
    pub fn pending_tick(&self) -> Option<TimerHandle> {
        self.session.tick
    }

    /// Start tracking. Restarts silently when already active.
    pub fn start(
        &mut self,
        ctx: &mut EngineContext<'_>,
        interval: Duration,
        camera_enabled: bool,
        mgd_enabled: bool,
    ) {
        let restarting = self.is_active();
        if restarting {
            self.halt(ctx);
        }

        let mode = ReminderMode::select(camera_enabled, mgd_enabled);
        self.session.mode = mode;
        self.session.interval = interval.max(MIN_INTERVAL);
        self.session.paused = false;
        info!(
            %mode,
            interval_ms = self.session.interval.as_millis() as u64,
            restarting,
            "tracking started"
        );

        let first_check = ctx.now + self.session.interval;
        if mode.uses_camera() {
            self.session.last_blink_at = Some(ctx.now);
            ctx.detector.arm_retries();
            self.show(ctx, OverlayKind::Starting, Some(STARTING_DISPLAY));
            self.arm_tick(ctx, first_check);
            self.request_camera(ctx);
        } else {
            self.arm_tick(ctx, first_check);
        }
        self.publish_state(ctx);
    }

    /// Stop tracking and show the Stopped overlay. No-op when already off.
    pub fn stop(&mut self, ctx: &mut EngineContext<'_>) {
        if !self.is_active() {
            debug!("stop ignored: tracking already off");
            return;
        }
        self.halt(ctx);
        self.show(ctx, OverlayKind::Stopped, Some(STOPPED_DISPLAY));
        info!("tracking stopped");
        self.publish_state(ctx);
    }

    /// Tear the session down without any overlay: cancel the tick, release
    /// the camera (the worker stays warm) and close the current overlay.
    pub fn halt(&mut self, ctx: &mut EngineContext<'_>) {
        ctx.timers.cancel_slot(&mut self.session.tick);
        let previous = self.session.mode;
        self.session.mode = ReminderMode::Off;
        self.session.paused = false;
        self.session.last_blink_at = None;
        if previous.uses_camera() {
            if let Err(e) = ctx.detector.stop_camera(ctx.timers) {
                debug!("camera not stopped: {e}");
            }
        }
        self.close_overlay(ctx);
    }

    /// Change the interval in place. `last_blink_at` is kept.
    pub fn set_interval(&mut self, ctx: &mut EngineContext<'_>, interval: Duration) {
        self.session.interval = interval.max(MIN_INTERVAL);
        if !self.is_active() || self.session.paused {
            return;
        }
        ctx.timers.cancel_slot(&mut self.session.tick);
        let at = ctx.now + self.session.interval;
        self.arm_tick(ctx, at);
        debug!(interval_ms = self.session.interval.as_millis() as u64, "interval changed");
    }

    /// A blink was detected.
    pub fn on_blink(&mut self, ctx: &mut EngineContext<'_>) {
        if !self.session.mode.uses_camera() || self.session.paused {
            return;
        }
        self.session.last_blink_at = Some(ctx.now);
        if self.overlay_kind() == Some(OverlayKind::Blink) {
            self.close_overlay(ctx);
        }
        if self.session.mode == ReminderMode::CameraGated {
            ctx.timers.cancel_slot(&mut self.session.tick);
            let at = ctx.now + self.session.interval;
            self.arm_tick(ctx, at);
        }
    }

    /// The worker finished loading models.
    pub fn on_detector_ready(&mut self, ctx: &mut EngineContext<'_>) {
        if !self.session.mode.uses_camera() || self.session.paused {
            return;
        }
        if let Err(e) = ctx.detector.start_camera() {
            warn!("failed to start camera: {e}");
        }
    }

    /// The camera started streaming.
    pub fn on_camera_active(&mut self, ctx: &mut EngineContext<'_>) {
        if !self.session.mode.uses_camera() || self.session.paused {
            return;
        }
        self.session.last_blink_at = Some(ctx.now);
        if self.overlay_kind() == Some(OverlayKind::Starting) {
            self.close_overlay(ctx);
        }
        if self.session.mode == ReminderMode::CameraGated && self.session.overlay.is_none() {
            ctx.timers.cancel_slot(&mut self.session.tick);
            let at = ctx.now + self.session.interval;
            self.arm_tick(ctx, at);
        }
        info!("camera monitoring active");
    }

    /// The camera path failed. Retries until the budget is spent, then
    /// turns tracking off with a single user-visible error.
    pub fn on_detector_fault(&mut self, ctx: &mut EngineContext<'_>, fault: &DetectorFault) {
        if !self.session.mode.uses_camera() || self.session.paused {
            debug!(%fault, "detector fault ignored outside camera tracking");
            return;
        }
        match ctx.detector.on_failure(ctx.timers, ctx.now) {
            RetryDecision::Retry { attempt, delay } => {
                warn!(%fault, attempt, delay_ms = delay.as_millis() as u64, "camera failure, retrying");
            }
            RetryDecision::GiveUp { attempts } => {
                error!(%fault, attempts, "camera failed repeatedly, stopping tracking");
                self.halt(ctx);
                ctx.notifier.emit(Notification::CameraError {
                    message: format!("Camera unavailable after {attempts} attempts: {fault}"),
                });
                self.publish_state(ctx);
            }
            RetryDecision::Exhausted => {
                debug!(%fault, "retries already exhausted");
            }
        }
    }

    /// A cadence tick fired. Ticks whose handle is no longer current are
    /// discarded.
    pub fn on_tick(&mut self, ctx: &mut EngineContext<'_>, handle: TimerHandle) {
        if self.session.tick != Some(handle) {
            debug!(%handle, "stale reminder tick discarded");
            return;
        }
        self.session.tick = None;
        if !self.is_active() || self.session.paused {
            return;
        }

        let now = ctx.now;
        match self.session.mode {
            ReminderMode::TimedPopup | ReminderMode::CameraMgd => {
                if self.overlay_kind() != Some(OverlayKind::Editor) {
                    self.show(ctx, OverlayKind::Blink, Some(BLINK_FADE));
                }
                self.arm_tick(ctx, now + BLINK_FADE + self.session.interval);
            }
            ReminderMode::CameraGated => {
                if self.session.overlay.is_some() {
                    // Re-armed when the overlay closes.
                    return;
                }
                let due = self.gated_due(now);
                if now >= due {
                    if !self.show(ctx, OverlayKind::Blink, Some(BLINK_FADE)) {
                        // No auto-close will follow, so keep the cadence alive.
                        self.arm_tick(ctx, now + self.session.interval);
                    }
                } else {
                    self.arm_tick(ctx, due);
                }
            }
            ReminderMode::Off => {}
        }
    }

    /// An engine overlay closed on its own (auto-close).
    pub fn on_overlay_closed(
        &mut self,
        ctx: &mut EngineContext<'_>,
        token: OverlayToken,
        kind: OverlayKind,
    ) {
        match self.session.overlay {
            Some((current, _)) if current == token => self.session.overlay = None,
            _ => return,
        }
        if !self.is_active() || self.session.paused {
            return;
        }
        if self.session.mode == ReminderMode::CameraGated && kind == OverlayKind::Blink {
            self.session.last_blink_at = Some(ctx.now);
        }
        self.rearm_gated(ctx);
    }

    /// Show the popup position editor in the reminder slot.
    pub fn show_editor(&mut self, ctx: &mut EngineContext<'_>) {
        self.show(ctx, OverlayKind::Editor, None);
        self.rearm_gated(ctx);
    }

    /// Close the position editor if it is showing.
    pub fn close_editor(&mut self, ctx: &mut EngineContext<'_>) {
        if self.overlay_kind() == Some(OverlayKind::Editor) {
            self.close_overlay(ctx);
            self.rearm_gated(ctx);
        }
    }

    /// Suspend the session, keeping its mode. Returns `false` if there was
    /// nothing to pause.
    pub fn pause(&mut self, ctx: &mut EngineContext<'_>) -> bool {
        if !self.is_active() || self.session.paused {
            return false;
        }
        ctx.timers.cancel_slot(&mut self.session.tick);
        self.close_overlay(ctx);
        if self.session.mode.uses_camera() {
            if let Err(e) = ctx.detector.stop_camera(ctx.timers) {
                debug!("camera not stopped on pause: {e}");
            }
        }
        self.session.paused = true;
        info!(mode = %self.session.mode, "tracking paused");
        true
    }

    /// Resume a paused session. The camera is requested again only when
    /// `restart_camera` is set.
    pub fn resume(&mut self, ctx: &mut EngineContext<'_>, restart_camera: bool) {
        if !self.session.paused {
            return;
        }
        self.session.paused = false;
        if self.session.mode.uses_camera() {
            self.session.last_blink_at = Some(ctx.now);
            if restart_camera {
                ctx.detector.arm_retries();
                self.request_camera(ctx);
            }
        }
        let at = ctx.now + self.session.interval;
        self.arm_tick(ctx, at);
        info!(mode = %self.session.mode, "tracking resumed");
    }

    fn request_camera(&mut self, ctx: &mut EngineContext<'_>) {
        if let Err(e) = ctx.detector.ensure_running(ctx.timers, ctx.now) {
            self.on_detector_fault(ctx, &DetectorFault::SpawnFailed(e.to_string()));
            return;
        }
        if ctx.detector.phase().is_ready() {
            if let Err(e) = ctx.detector.start_camera() {
                warn!("failed to start camera: {e}");
            }
        }
    }

    fn gated_due(&self, now: Instant) -> Instant {
        self.session.last_blink_at.unwrap_or(now) + self.session.interval
    }

    /// CameraGated ticks that find an overlay showing are not re-armed, so
    /// whoever clears the slot must re-arm the check.
    fn rearm_gated(&mut self, ctx: &mut EngineContext<'_>) {
        if self.session.mode != ReminderMode::CameraGated
            || self.session.paused
            || self.session.tick.is_some()
        {
            return;
        }
        let at = self.gated_due(ctx.now).max(ctx.now);
        self.arm_tick(ctx, at);
    }

    fn arm_tick(&mut self, ctx: &mut EngineContext<'_>, at: Instant) {
        ctx.timers.cancel_slot(&mut self.session.tick);
        self.session.tick = Some(ctx.timers.schedule(at, TimerKind::ReminderTick));
    }

    /// Show `kind` in the reminder slot. Returns `false` if the provider
    /// failed and the slot is empty.
    fn show(
        &mut self,
        ctx: &mut EngineContext<'_>,
        kind: OverlayKind,
        auto_close: Option<Duration>,
    ) -> bool {
        let popup = &ctx.prefs.popup;
        let message = match kind {
            OverlayKind::Starting => "Starting camera...".to_owned(),
            OverlayKind::Stopped => "Blink reminders stopped".to_owned(),
            OverlayKind::Editor => "Drag to position, then save".to_owned(),
            OverlayKind::Blink | OverlayKind::Exercise => popup.message.clone(),
        };
        let request =
            OverlayRequest::popup(kind, popup, ctx.overlays.work_area(), message, auto_close);
        self.session.overlay = ctx
            .overlays
            .show_or_warn(&request, ctx.timers, ctx.now)
            .map(|token| (token, kind));
        self.session.overlay.is_some()
    }

    fn close_overlay(&mut self, ctx: &mut EngineContext<'_>) {
        if let Some((token, _)) = self.session.overlay.take() {
            ctx.overlays.close_token(token, ctx.timers);
        }
    }

    fn publish_state(&self, ctx: &EngineContext<'_>) {
        ctx.notifier.emit(Notification::TrackingState {
            mode: self.session.mode,
            active: self.is_active(),
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::{DetectorConfig, ReminderConfig};
    use crate::detector::{WorkerEvent, WorkerPhase};
    use crate::test_utils::{FakeLauncher, RecordingSurfaceProvider};
    use tokio::sync::mpsc;

    struct Harness {
        engine: ReminderEngine,
        detector: DetectorSupervisor,
        overlays: OverlayManager,
        timers: TimerQueue,
        notifier: Notifier,
        prefs: Preferences,
        surfaces: RecordingSurfaceProvider,
        launcher: FakeLauncher,
        t0: Instant,
    }

    impl Harness {
        fn new() -> Self {
            let surfaces = RecordingSurfaceProvider::new();
            let launcher = FakeLauncher::new();
            let (tx, _rx) = mpsc::unbounded_channel();
            let (notifier, _) = Notifier::new(64);
            Self {
                engine: ReminderEngine::new(Duration::from_millis(5_000)),
                detector: DetectorSupervisor::new(
                    Box::new(launcher.clone()),
                    tx,
                    &DetectorConfig::default(),
                    &ReminderConfig::default(),
                ),
                overlays: OverlayManager::new(Box::new(surfaces.clone())),
                timers: TimerQueue::new(),
                notifier,
                prefs: Preferences::default(),
                surfaces,
                launcher,
                t0: Instant::now(),
            }
        }

        fn at(ms: u64) -> Duration {
            Duration::from_millis(ms)
        }

        fn with<R>(&mut self, ms: u64, f: impl FnOnce(&mut ReminderEngine, &mut EngineContext<'_>) -> R) -> R {
            let mut ctx = EngineContext {
                detector: &mut self.detector,
                overlays: &mut self.overlays,
                timers: &mut self.timers,
                notifier: &self.notifier,
                prefs: &self.prefs,
                now: self.t0 + Self::at(ms),
            };
            f(&mut self.engine, &mut ctx)
        }

        /// Fire every timer due at or before `ms`, each at its own deadline.
        fn advance(&mut self, ms: u64) {
            let until = self.t0 + Self::at(ms);
            while let Some(at) = self.timers.next_deadline().filter(|at| *at <= until) {
                let Some((handle, kind)) = self.timers.pop_due(at) else {
                    break;
                };
                let offset = (at - self.t0).as_millis() as u64;
                match kind {
                    TimerKind::ReminderTick => self.with(offset, |e, ctx| e.on_tick(ctx, handle)),
                    TimerKind::OverlayAutoClose { token } => {
                        if let Some(closed) = self.overlays.on_auto_close(token) {
                            self.with(offset, |e, ctx| e.on_overlay_closed(ctx, token, closed.kind));
                        }
                    }
                    _ => {}
                }
            }
        }

        fn worker_line(&mut self, ms: u64, text: &str) {
            let event = WorkerEvent::Line {
                generation: self.detector.generation(),
                line: text.to_owned(),
            };
            let signal = self.detector.handle_event(event, &mut self.timers);
            match signal {
                Some(crate::detector::DetectorSignal::Ready) => {
                    self.with(ms, |e, ctx| e.on_detector_ready(ctx));
                }
                Some(crate::detector::DetectorSignal::CameraActive) => {
                    self.with(ms, |e, ctx| e.on_camera_active(ctx));
                }
                Some(crate::detector::DetectorSignal::Blink) => {
                    self.with(ms, |e, ctx| e.on_blink(ctx));
                }
                Some(crate::detector::DetectorSignal::Fault(fault)) => {
                    self.with(ms, |e, ctx| e.on_detector_fault(ctx, &fault));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn mode_selection() {
        assert_eq!(ReminderMode::select(false, true), ReminderMode::TimedPopup);
        assert_eq!(ReminderMode::select(true, false), ReminderMode::CameraGated);
        assert_eq!(ReminderMode::select(true, true), ReminderMode::CameraMgd);
        assert!(!ReminderMode::Off.is_active());
        assert!(!ReminderMode::TimedPopup.uses_camera());
    }

    #[test]
    fn timed_popup_shows_blink_then_rearms_after_fade() {
        let mut h = Harness::new();
        h.with(0, |e, ctx| e.start(ctx, Duration::from_millis(5_000), false, false));
        assert_eq!(h.engine.mode(), ReminderMode::TimedPopup);
        assert_eq!(h.launcher.launches(), 0);

        h.advance(5_000);
        assert_eq!(h.surfaces.shown_count(OverlayKind::Blink), 1);
        let next = h.timers.deadline(h.engine.pending_tick().unwrap()).unwrap();
        assert_eq!(next, h.t0 + Duration::from_millis(5_000 + 2_500 + 5_000));

        h.advance(7_500);
        assert_eq!(h.surfaces.open_count(), 0);
        h.advance(12_500);
        assert_eq!(h.surfaces.shown_count(OverlayKind::Blink), 2);
    }

    #[test]
    fn stop_is_idempotent_and_shows_stopped_once() {
        let mut h = Harness::new();
        h.with(0, |e, ctx| e.start(ctx, Duration::from_millis(5_000), false, false));
        h.with(100, |e, ctx| e.stop(ctx));
        h.with(200, |e, ctx| e.stop(ctx));

        assert_eq!(h.engine.mode(), ReminderMode::Off);
        assert_eq!(h.surfaces.shown_count(OverlayKind::Stopped), 1);
        assert_eq!(h.timers.count_kind(TimerKind::ReminderTick), 0);
        h.advance(60_000);
        assert_eq!(h.surfaces.shown_count(OverlayKind::Blink), 0);
    }

    #[test]
    fn stale_tick_handle_is_discarded() {
        let mut h = Harness::new();
        h.with(0, |e, ctx| e.start(ctx, Duration::from_millis(5_000), false, false));
        let old = h.engine.pending_tick().unwrap();
        h.with(1_000, |e, ctx| e.set_interval(ctx, Duration::from_millis(8_000)));
        h.with(5_000, |e, ctx| e.on_tick(ctx, old));
        assert_eq!(h.surfaces.shown_count(OverlayKind::Blink), 0);
        assert!(h.engine.pending_tick().is_some());
    }

    #[test]
    fn camera_start_requests_worker_and_camera_after_ready() {
        let mut h = Harness::new();
        h.with(0, |e, ctx| e.start(ctx, Duration::from_millis(5_000), true, false));
        assert_eq!(h.engine.mode(), ReminderMode::CameraGated);
        assert_eq!(h.launcher.launches(), 1);
        assert_eq!(h.overlay_kind_shown(), vec![OverlayKind::Starting]);
        assert_eq!(h.launcher.sent_count("start_camera"), 0);

        h.worker_line(500, r#"{"status":"Models ready"}"#);
        assert_eq!(h.launcher.sent_count("start_camera"), 1);
        h.worker_line(800, r#"{"status":"Camera opened successfully"}"#);
        assert_eq!(h.detector.phase(), WorkerPhase::CameraActive);
        assert_eq!(h.surfaces.open_count(), 0);
    }

    #[test]
    fn mgd_blink_closes_overlay_without_changing_cadence() {
        let mut h = Harness::new();
        h.with(0, |e, ctx| e.start(ctx, Duration::from_millis(5_000), true, true));
        h.worker_line(0, r#"{"status":"Models ready"}"#);
        h.worker_line(0, r#"{"status":"Camera opened successfully"}"#);

        h.advance(5_000);
        assert_eq!(h.engine.overlay_kind(), Some(OverlayKind::Blink));
        let tick = h.engine.pending_tick().unwrap();
        h.worker_line(5_400, r#"{"blink":true,"ear":0.18}"#);
        assert_eq!(h.engine.overlay_kind(), None);
        assert_eq!(h.surfaces.open_count(), 0);
        assert_eq!(h.engine.pending_tick(), Some(tick));
    }

    #[test]
    fn blink_in_timed_mode_is_ignored() {
        let mut h = Harness::new();
        h.with(0, |e, ctx| e.start(ctx, Duration::from_millis(5_000), false, false));
        h.with(100, |e, ctx| e.on_blink(ctx));
        assert_eq!(h.engine.last_blink_at(), None);
    }

    #[test]
    fn restart_while_active_is_silent() {
        let mut h = Harness::new();
        h.with(0, |e, ctx| e.start(ctx, Duration::from_millis(5_000), false, false));
        h.with(100, |e, ctx| e.start(ctx, Duration::from_millis(5_000), false, false));
        assert_eq!(h.surfaces.shown_count(OverlayKind::Stopped), 0);
        assert_eq!(h.timers.count_kind(TimerKind::ReminderTick), 1);
    }

    #[test]
    fn pause_and_resume_rearm_cadence() {
        let mut h = Harness::new();
        h.with(0, |e, ctx| e.start(ctx, Duration::from_millis(5_000), false, false));
        assert!(h.with(1_000, |e, ctx| e.pause(ctx)));
        assert!(!h.with(1_100, |e, ctx| e.pause(ctx)));
        h.advance(20_000);
        assert_eq!(h.surfaces.shown_count(OverlayKind::Blink), 0);

        h.with(20_000, |e, ctx| e.resume(ctx, false));
        assert!(!h.engine.is_paused());
        h.advance(25_000);
        assert_eq!(h.surfaces.shown_count(OverlayKind::Blink), 1);
    }

    impl Harness {
        fn overlay_kind_shown(&self) -> Vec<OverlayKind> {
            self.surfaces.shown_kinds()
        }
    }
}
