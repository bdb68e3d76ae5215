//! The orchestration runtime.
//!
//! One task owns every component plus the timer queue and preferences, and
//! applies one transition per event. [`Runtime::run`] selects between host
//! events, worker output and the earliest timer deadline; each dispatch runs
//! to completion before the next event is looked at.
//!
//! The synchronous entry points ([`Runtime::apply_command`],
//! [`Runtime::handle_worker_event`], [`Runtime::advance_to`]) take the
//! dispatch instant explicitly so scenarios can be replayed on a virtual
//! clock.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{PopupColors, PopupPosition, clamp_ear_threshold};
use crate::detector::{
    DetectorError, DetectorFault, DetectorSignal, DetectorSupervisor, WorkerEvent,
    WorkerEventSender, WorkerLauncher,
};
use crate::engine::{EngineContext, ReminderEngine};
use crate::exercise::ExerciseScheduler;
use crate::notify::{Notification, Notifier};
use crate::overlay::{OverlayManager, OverlaySlot, SurfaceProvider, WorkArea};
use crate::power::{PowerEventBridge, PowerSignal};
use crate::prefs::PreferencesStore;
use crate::shutdown::{ClosePolicy, DrainOutcome, ExitTrigger, ShutdownCoordinator};
use crate::timers::{TimerHandle, TimerKind, TimerQueue};

/// A settings-UI command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartTracking,
    StopTracking,
    SetInterval { ms: u64 },
    SetCameraEnabled(bool),
    SetMgdMode(bool),
    /// EAR threshold; forwarded to the worker after a quiet period.
    SetSensitivity(f32),
    SetFrameSkip(u32),
    SetPopupPosition(PopupPosition),
    SetPopupSize { width: u32, height: u32 },
    SetPopupColors(PopupColors),
    SetPopupMessage(String),
    ShowPopupEditor,
    /// Position (and optionally size) chosen in the popup editor.
    PopupEditorSaved {
        x: i32,
        y: i32,
        width: Option<u32>,
        height: Option<u32>,
    },
    SetExercisesEnabled(bool),
    SetExerciseInterval { minutes: u32 },
    SkipExercise,
    SnoozeExercise,
    ShowCameraPreview,
    CloseCameraPreview,
    SetDarkMode(bool),
    SetKeyboardShortcut(Option<String>),
    SetWorkArea(WorkArea),
    ResetPreferences,
    RequestPreferences,
}

/// Everything that can arrive on the runtime's event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    Command(Command),
    Power(PowerSignal),
    /// The host's main window closed.
    WindowClosed { last_window: bool },
    Shutdown(ExitTrigger),
}

/// Whether the run loop continues after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Collaborators handed to [`Runtime::new`].
pub struct RuntimeParts {
    pub prefs: PreferencesStore,
    pub surfaces: Box<dyn SurfaceProvider>,
    pub launcher: Box<dyn WorkerLauncher>,
    pub notifier: Notifier,
    pub shutdown: ShutdownCoordinator,
    pub close_policy: ClosePolicy,
}

/// Owner of every orchestration component.
pub struct Runtime {
    prefs: PreferencesStore,
    engine: ReminderEngine,
    detector: DetectorSupervisor,
    overlays: OverlayManager,
    exercise: ExerciseScheduler,
    power: PowerEventBridge,
    timers: TimerQueue,
    notifier: Notifier,
    shutdown: ShutdownCoordinator,
    close_policy: ClosePolicy,
    sensitivity_timer: Option<TimerHandle>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("engine", &self.engine)
            .field("detector", &self.detector)
            .field("overlays", &self.overlays)
            .field("exercise", &self.exercise)
            .field("pending_timers", &self.timers.len())
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Build the runtime, publish the loaded preferences and arm exercise
    /// prompts if enabled.
    pub fn new(parts: RuntimeParts, worker_events: WorkerEventSender, now: Instant) -> Self {
        let loaded = parts.prefs.get().clone();
        let mut runtime = Self {
            engine: ReminderEngine::new(loaded.reminder.interval()),
            detector: DetectorSupervisor::new(
                parts.launcher,
                worker_events,
                &loaded.detector,
                &loaded.reminder,
            ),
            overlays: OverlayManager::new(parts.surfaces),
            exercise: ExerciseScheduler::new(&loaded.exercise, now),
            power: PowerEventBridge::new(),
            timers: TimerQueue::new(),
            notifier: parts.notifier,
            shutdown: parts.shutdown,
            close_policy: parts.close_policy,
            sensitivity_timer: None,
            prefs: parts.prefs,
        };
        runtime.prefs.publish();
        if loaded.exercise.enabled {
            let (_, exercise, _, mut ctx) = runtime.split(now);
            exercise.set_enabled(&mut ctx.exercise(), true);
        }
        runtime
    }

    #[must_use]
    pub fn engine(&self) -> &ReminderEngine {
        &self.engine
    }

    #[must_use]
    pub fn detector(&self) -> &DetectorSupervisor {
        &self.detector
    }

    #[must_use]
    pub fn overlays(&self) -> &OverlayManager {
        &self.overlays
    }

    #[must_use]
    pub fn exercise(&self) -> &ExerciseScheduler {
        &self.exercise
    }

    #[must_use]
    pub fn prefs(&self) -> &PreferencesStore {
        &self.prefs
    }

    #[must_use]
    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    #[must_use]
    pub fn power(&self) -> &PowerEventBridge {
        &self.power
    }

    #[must_use]
    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    fn split(
        &mut self,
        now: Instant,
    ) -> (
        &mut ReminderEngine,
        &mut ExerciseScheduler,
        &mut PowerEventBridge,
        EngineContext<'_>,
    ) {
        let ctx = EngineContext {
            detector: &mut self.detector,
            overlays: &mut self.overlays,
            timers: &mut self.timers,
            notifier: &self.notifier,
            prefs: self.prefs.get(),
            now,
        };
        (&mut self.engine, &mut self.exercise, &mut self.power, ctx)
    }

    /// Dispatch one queued event.
    pub async fn handle(&mut self, event: CoreEvent, now: Instant) -> Flow {
        if !self.shutdown.is_running() {
            debug!(?event, "event after shutdown ignored");
            return Flow::Exit;
        }
        match event {
            CoreEvent::Command(command) => self.apply_command(command, now),
            CoreEvent::Power(signal) => self.handle_power(signal, now),
            CoreEvent::WindowClosed { last_window } => {
                if self.close_policy.should_quit(last_window) {
                    self.shutdown(ExitTrigger::WindowClosed).await;
                    return Flow::Exit;
                }
                info!(last_window, "window closed, staying resident");
            }
            CoreEvent::Shutdown(trigger) => {
                self.shutdown(trigger).await;
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// Apply a settings command.
    pub fn apply_command(&mut self, command: Command, now: Instant) {
        debug!(?command, "command");
        match command {
            Command::StartTracking => {
                let reminder = self.prefs.get().reminder.clone();
                let (engine, _, _, mut ctx) = self.split(now);
                engine.start(
                    &mut ctx,
                    reminder.interval(),
                    reminder.camera_enabled,
                    reminder.mgd_mode,
                );
            }
            Command::StopTracking => {
                let (engine, _, _, mut ctx) = self.split(now);
                engine.stop(&mut ctx);
            }
            Command::SetInterval { ms } => {
                self.prefs.update(|p| p.reminder.interval_ms = ms.max(1));
                let interval = self.prefs.get().reminder.interval();
                let (engine, _, _, mut ctx) = self.split(now);
                engine.set_interval(&mut ctx, interval);
            }
            Command::SetCameraEnabled(enabled) => {
                if self.prefs.update(|p| p.reminder.camera_enabled = enabled) {
                    self.restart_if_active(now);
                }
            }
            Command::SetMgdMode(enabled) => {
                if self.prefs.update(|p| p.reminder.mgd_mode = enabled) {
                    self.restart_if_active(now);
                }
            }
            Command::SetSensitivity(threshold) => {
                self.prefs
                    .update(|p| p.reminder.ear_threshold = clamp_ear_threshold(threshold));
                self.schedule_sensitivity_push(now);
            }
            Command::SetFrameSkip(frames) => {
                self.prefs.update(|p| p.reminder.frame_skip = frames.max(1));
                self.schedule_sensitivity_push(now);
            }
            Command::SetPopupPosition(position) => {
                self.prefs.update(|p| p.popup.position = position);
            }
            Command::SetPopupSize { width, height } => {
                self.prefs.update(|p| {
                    p.popup.width = width.max(1);
                    p.popup.height = height.max(1);
                });
            }
            Command::SetPopupColors(mut colors) => {
                colors.opacity = colors.opacity.clamp(0.0, 1.0);
                self.prefs.update(|p| p.popup.colors = colors);
            }
            Command::SetPopupMessage(message) => {
                self.prefs.update(|p| p.popup.message = message);
            }
            Command::ShowPopupEditor => {
                let (engine, _, _, mut ctx) = self.split(now);
                engine.show_editor(&mut ctx);
            }
            Command::PopupEditorSaved {
                x,
                y,
                width,
                height,
            } => {
                self.prefs.update(|p| {
                    p.popup.position = PopupPosition::Custom { x, y };
                    if let Some(width) = width {
                        p.popup.width = width.max(1);
                    }
                    if let Some(height) = height {
                        p.popup.height = height.max(1);
                    }
                });
                let (engine, _, _, mut ctx) = self.split(now);
                engine.close_editor(&mut ctx);
            }
            Command::SetExercisesEnabled(enabled) => {
                self.prefs.update(|p| p.exercise.enabled = enabled);
                let (_, exercise, _, mut ctx) = self.split(now);
                exercise.set_enabled(&mut ctx.exercise(), enabled);
            }
            Command::SetExerciseInterval { minutes } => {
                self.prefs
                    .update(|p| p.exercise.interval_minutes = minutes.max(1));
                let config = self.prefs.get().exercise.clone();
                let (_, exercise, _, mut ctx) = self.split(now);
                exercise.reconfigure(&mut ctx.exercise(), &config);
            }
            Command::SkipExercise => {
                let (_, exercise, _, mut ctx) = self.split(now);
                exercise.skip(&mut ctx.exercise());
            }
            Command::SnoozeExercise => {
                let (_, exercise, _, mut ctx) = self.split(now);
                exercise.snooze(&mut ctx.exercise());
            }
            Command::ShowCameraPreview => self.open_preview(now),
            Command::CloseCameraPreview => self.close_preview(),
            Command::SetDarkMode(enabled) => {
                self.prefs.update(|p| p.ui.dark_mode = enabled);
            }
            Command::SetKeyboardShortcut(shortcut) => {
                self.prefs.update(|p| p.ui.keyboard_shortcut = shortcut);
            }
            Command::SetWorkArea(area) => self.overlays.set_work_area(area),
            Command::ResetPreferences => {
                let before = self.prefs.get().reminder.clone();
                self.prefs.reset();
                self.apply_reset(&before, now);
            }
            Command::RequestPreferences => self.prefs.publish(),
        }
    }

    /// Route one event from a worker reader task.
    pub fn handle_worker_event(&mut self, event: WorkerEvent, now: Instant) {
        if let Some(signal) = self.detector.handle_event(event, &mut self.timers) {
            self.route_signal(signal, now);
        }
    }

    /// Apply a suspend/resume signal.
    pub fn handle_power(&mut self, signal: PowerSignal, now: Instant) {
        let (engine, exercise, power, mut ctx) = self.split(now);
        power.on_signal(signal, engine, exercise, &mut ctx);
    }

    /// Fire every timer due at `now`. Returns how many fired.
    pub fn fire_due(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some((handle, kind)) = self.timers.pop_due(now) {
            fired += 1;
            self.fire(handle, kind, now);
        }
        fired
    }

    /// Fire timers in deadline order up to `until`, each dispatched at its
    /// own deadline.
    pub fn advance_to(&mut self, until: Instant) -> usize {
        let mut fired = 0;
        while let Some(at) = self.timers.next_deadline().filter(|at| *at <= until) {
            fired += self.fire_due(at);
        }
        fired
    }

    fn fire(&mut self, handle: TimerHandle, kind: TimerKind, now: Instant) {
        match kind {
            TimerKind::ReminderTick => {
                let (engine, _, _, mut ctx) = self.split(now);
                engine.on_tick(&mut ctx, handle);
            }
            TimerKind::OverlayAutoClose { token } => {
                let Some(closed) = self.overlays.on_auto_close(token) else {
                    return;
                };
                let (engine, exercise, _, mut ctx) = self.split(now);
                match closed.slot {
                    OverlaySlot::Reminder => engine.on_overlay_closed(&mut ctx, token, closed.kind),
                    OverlaySlot::Exercise => exercise.on_overlay_closed(&mut ctx.exercise(), token),
                }
            }
            TimerKind::DetectorRetry => {
                if let Err(e) = self.detector.on_retry_timer(handle, &mut self.timers, now) {
                    let fault = DetectorFault::SpawnFailed(e.to_string());
                    self.route_signal(DetectorSignal::Fault(fault), now);
                }
            }
            TimerKind::DetectorReadyTimeout => {
                if let Some(signal) = self.detector.on_ready_timeout(handle) {
                    self.route_signal(signal, now);
                }
            }
            TimerKind::SensitivityDebounce => {
                if self.sensitivity_timer == Some(handle) {
                    self.sensitivity_timer = None;
                    self.push_sensitivity();
                }
            }
            TimerKind::ExerciseTick => {
                let (_, exercise, _, mut ctx) = self.split(now);
                exercise.on_tick(&mut ctx.exercise(), handle);
            }
        }
    }

    fn route_signal(&mut self, signal: DetectorSignal, now: Instant) {
        let engine_uses_camera = self.engine.mode().uses_camera() && !self.engine.is_paused();
        match signal {
            DetectorSignal::Preview(payload) => self.overlays.forward_preview(&payload),
            DetectorSignal::Blink => {
                let (engine, _, _, mut ctx) = self.split(now);
                engine.on_blink(&mut ctx);
            }
            DetectorSignal::Ready => {
                if engine_uses_camera {
                    let (engine, _, _, mut ctx) = self.split(now);
                    engine.on_detector_ready(&mut ctx);
                } else if self.overlays.preview_open() {
                    if let Err(e) = self.detector.start_camera() {
                        warn!("failed to start camera for preview: {e}");
                    }
                }
            }
            DetectorSignal::CameraActive => {
                let (engine, _, _, mut ctx) = self.split(now);
                engine.on_camera_active(&mut ctx);
            }
            DetectorSignal::Fault(fault) => {
                if engine_uses_camera {
                    let (engine, _, _, mut ctx) = self.split(now);
                    engine.on_detector_fault(&mut ctx, &fault);
                } else if self.overlays.preview_open() {
                    self.notifier.emit(Notification::CameraError {
                        message: fault.to_string(),
                    });
                } else {
                    debug!(%fault, "detector fault while camera unused");
                }
            }
        }
    }

    fn restart_if_active(&mut self, now: Instant) {
        if !self.engine.is_active() || self.engine.is_paused() {
            return;
        }
        let reminder = self.prefs.get().reminder.clone();
        let (engine, _, _, mut ctx) = self.split(now);
        engine.start(
            &mut ctx,
            reminder.interval(),
            reminder.camera_enabled,
            reminder.mgd_mode,
        );
    }

    fn apply_reset(&mut self, before: &crate::config::ReminderConfig, now: Instant) {
        let prefs = self.prefs.get().clone();
        self.detector.reconfigure(&prefs.detector);
        if before.camera_enabled != prefs.reminder.camera_enabled
            || before.mgd_mode != prefs.reminder.mgd_mode
        {
            self.restart_if_active(now);
        } else {
            let (engine, _, _, mut ctx) = self.split(now);
            engine.set_interval(&mut ctx, prefs.reminder.interval());
        }
        if before.ear_threshold != prefs.reminder.ear_threshold
            || before.frame_skip != prefs.reminder.frame_skip
        {
            self.schedule_sensitivity_push(now);
        }
        let (_, exercise, _, mut ctx) = self.split(now);
        exercise.reconfigure(&mut ctx.exercise(), &prefs.exercise);
    }

    fn schedule_sensitivity_push(&mut self, now: Instant) {
        self.timers.cancel_slot(&mut self.sensitivity_timer);
        let delay = self.prefs.get().reminder.sensitivity_debounce();
        self.sensitivity_timer =
            Some(self.timers.schedule(now + delay, TimerKind::SensitivityDebounce));
    }

    fn push_sensitivity(&mut self) {
        let reminder = &self.prefs.get().reminder;
        self.detector
            .set_detection_params(reminder.ear_threshold, reminder.frame_skip);
        match self.detector.push_config() {
            Ok(()) => debug!("detection parameters forwarded"),
            Err(DetectorError::NotReady { phase }) => {
                debug!(%phase, "detection parameters held until the worker is ready");
            }
            Err(e) => warn!("failed to forward detection parameters: {e}"),
        }
    }

    fn open_preview(&mut self, now: Instant) {
        match self.overlays.open_preview() {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => {
                warn!("camera preview unavailable: {e}");
                return;
            }
        }
        if self.engine.mode().uses_camera() {
            return;
        }
        // Preview without tracking still needs a worker with the camera on.
        if let Err(e) = self.detector.ensure_running(&mut self.timers, now) {
            self.notifier.emit(Notification::CameraError {
                message: e.to_string(),
            });
            return;
        }
        if self.detector.phase().is_ready() {
            if let Err(e) = self.detector.start_camera() {
                warn!("failed to start camera for preview: {e}");
            }
        }
    }

    fn close_preview(&mut self) {
        if !self.overlays.close_preview() {
            return;
        }
        self.notifier.emit(Notification::CameraPreviewClosed);
        if !self.engine.mode().uses_camera() {
            if let Err(e) = self.detector.stop_camera(&mut self.timers) {
                debug!("camera not stopped after preview: {e}");
            }
        }
    }

    /// Drain everything once: timers, overlays, preview, worker.
    pub async fn shutdown(&mut self, trigger: ExitTrigger) -> DrainOutcome {
        let coordinator = self.shutdown.clone();
        coordinator.drain(trigger, self.teardown()).await
    }

    async fn teardown(&mut self) {
        let now = Instant::now();
        {
            let (engine, exercise, _, mut ctx) = self.split(now);
            engine.halt(&mut ctx);
            exercise.cancel(ctx.timers, ctx.overlays);
        }
        self.timers.cancel_slot(&mut self.sensitivity_timer);
        self.overlays.close_all(&mut self.timers);
        if self.overlays.close_preview() {
            self.notifier.emit(Notification::CameraPreviewClosed);
        }

        if let Some(termination) = self.detector.begin_shutdown(&mut self.timers) {
            if let Err(e) = tokio::task::spawn_blocking(move || termination.run()).await {
                warn!("worker termination task failed: {e}");
            }
        }
        let swept = self.detector.sweep();
        let dropped = self.timers.clear();
        info!(swept, dropped_timers = dropped, "teardown finished");
    }

    /// Run until a shutdown trigger arrives or `events` closes.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<CoreEvent>,
        mut worker_events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        info!("runtime started");
        loop {
            let deadline = self.timers.next_deadline();
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => {
                        if self.handle(event, Instant::now()).await == Flow::Exit {
                            break;
                        }
                    }
                    None => {
                        self.shutdown(ExitTrigger::InputClosed).await;
                        break;
                    }
                },
                Some(event) = worker_events.recv() => {
                    self.handle_worker_event(event, Instant::now());
                }
                () = sleep_until(deadline) => {
                    self.fire_due(Instant::now());
                }
            }
        }
        info!("runtime stopped");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending::<()>().await,
    }
}
