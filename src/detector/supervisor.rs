//! Detection worker supervisor.
//!
//! Pure state machine over the worker lifecycle. Side effects are limited to
//! the [`WorkerLauncher`]/[`WorkerHandle`] seam and the shared
//! [`TimerQueue`]; everything the engine needs to react to comes back as a
//! [`DetectorSignal`] or [`RetryDecision`].
//!
//! ```text
//! NotStarted → Launching → ModelsReady → CameraActive
//!                  ↓            ↓             ↓
//!               Erroring ← ─ ─ ─ ─ ─ ─ ─ ─ ─ ─
//!                  ↓
//!               Stopped  (process exited; relaunch via EnsureRunning)
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::error::DetectorError;
use super::process::{
    TerminationTier, WorkerEvent, WorkerEventSender, WorkerHandle, WorkerLauncher,
};
use super::protocol::{WorkerCommand, WorkerMessage, WorkerStatus};
use crate::config::{DetectorConfig, ReminderConfig, clamp_ear_threshold};
use crate::timers::{TimerHandle, TimerKind, TimerQueue};

/// Lifecycle phase of the detection worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// No worker has been launched.
    NotStarted,
    /// Process spawned, models loading.
    Launching,
    /// Models loaded; camera commands accepted.
    ModelsReady,
    /// Camera streaming.
    CameraActive,
    /// Worker reported a failure.
    Erroring,
    /// Worker process is gone.
    Stopped,
}

impl WorkerPhase {
    /// A live worker exists (possibly still loading).
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Launching | Self::ModelsReady | Self::CameraActive)
    }

    /// The worker accepts camera commands.
    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::ModelsReady | Self::CameraActive)
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "not-started",
            Self::Launching => "launching",
            Self::ModelsReady => "models-ready",
            Self::CameraActive => "camera-active",
            Self::Erroring => "erroring",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Why the camera path failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorFault {
    /// Worker reported an error (camera open/read failure).
    Camera(String),
    /// Worker process exited unexpectedly.
    ProcessExited { exit_code: Option<i32> },
    /// Worker did not report readiness in time.
    ReadyTimeout,
    /// Worker could not be launched.
    SpawnFailed(String),
}

impl fmt::Display for DetectorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera(msg) => write!(f, "{msg}"),
            Self::ProcessExited {
                exit_code: Some(code),
            } => write!(f, "detector exited with code {code}"),
            Self::ProcessExited { exit_code: None } => f.write_str("detector exited"),
            Self::ReadyTimeout => f.write_str("detector did not become ready"),
            Self::SpawnFailed(msg) => write!(f, "detector failed to start: {msg}"),
        }
    }
}

/// What the engine should react to after a worker event.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorSignal {
    Blink,
    /// Models loaded; camera commands now accepted.
    Ready,
    /// Camera is streaming.
    CameraActive,
    Fault(DetectorFault),
    /// Preview payload for the camera preview surface.
    Preview(serde_json::Value),
}

/// Outcome of reporting a camera failure to the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// A relaunch is scheduled.
    Retry { attempt: u32, delay: Duration },
    /// The retry budget is spent; tracking should stop.
    GiveUp { attempts: u32 },
    /// Already gave up earlier; nothing to do.
    Exhausted,
}

/// Fixed-delay, capped-attempt retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            delay: config.retry_delay(),
        }
    }
}

/// A worker handed off for termination, e.g. on a blocking thread during
/// shutdown. The handle itself stays private.
pub struct Termination {
    handle: Box<dyn WorkerHandle>,
    grace: Duration,
}

impl fmt::Debug for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Termination")
            .field("pid", &self.handle.pid())
            .field("grace", &self.grace)
            .finish()
    }
}

impl Termination {
    /// Terminate with full escalation. Blocks for at most three grace periods.
    pub fn run(mut self) -> TerminationTier {
        let pid = self.handle.pid();
        let tier = self.handle.terminate(self.grace);
        info!(pid = ?pid, %tier, "detector worker terminated");
        tier
    }

    /// Terminate without blocking the caller: on the tokio blocking pool
    /// when a runtime is available, inline otherwise.
    pub fn run_detached(self) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || self.run());
            }
            Err(_) => {
                self.run();
            }
        }
    }
}

/// Owns the worker process and its lifecycle.
pub struct DetectorSupervisor {
    launcher: Box<dyn WorkerLauncher>,
    events: WorkerEventSender,
    handle: Option<Box<dyn WorkerHandle>>,
    phase: WorkerPhase,
    generation: u64,
    retry_count: u32,
    exhausted: bool,
    retry_timer: Option<TimerHandle>,
    ready_timer: Option<TimerHandle>,
    policy: RetryPolicy,
    ready_timeout: Duration,
    kill_grace: Duration,
    ear_threshold: f32,
    frame_skip: u32,
}

impl fmt::Debug for DetectorSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorSupervisor")
            .field("phase", &self.phase)
            .field("generation", &self.generation)
            .field("retry_count", &self.retry_count)
            .field("exhausted", &self.exhausted)
            .field("has_handle", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl DetectorSupervisor {
    pub fn new(
        launcher: Box<dyn WorkerLauncher>,
        events: WorkerEventSender,
        detector: &DetectorConfig,
        reminder: &ReminderConfig,
    ) -> Self {
        Self {
            launcher,
            events,
            handle: None,
            phase: WorkerPhase::NotStarted,
            generation: 0,
            retry_count: 0,
            exhausted: false,
            retry_timer: None,
            ready_timer: None,
            policy: RetryPolicy::from_config(detector),
            ready_timeout: detector.ready_timeout(),
            kill_grace: detector.kill_grace(),
            ear_threshold: reminder.clamped_ear_threshold(),
            frame_skip: reminder.clamped_frame_skip(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    #[must_use]
    pub fn retry_pending(&self) -> bool {
        self.retry_timer.is_some()
    }

    /// Replace retry and timing settings (takes effect on the next failure).
    pub fn reconfigure(&mut self, detector: &DetectorConfig) {
        self.policy = RetryPolicy::from_config(detector);
        self.ready_timeout = detector.ready_timeout();
        self.kill_grace = detector.kill_grace();
    }

    /// Reset the retry budget. Called when the user (re)starts tracking.
    pub fn arm_retries(&mut self) {
        self.retry_count = 0;
        self.exhausted = false;
    }

    /// Make sure a worker process is running.
    ///
    /// Returns `Ok(true)` if a new worker was spawned and `Ok(false)` if one
    /// was already running. A stale handle is handed off for termination in
    /// the background; its output is already filtered by generation.
    ///
    /// # Errors
    ///
    /// Returns the launcher error if the worker could not be spawned; the
    /// phase is then [`WorkerPhase::Stopped`].
    pub fn ensure_running(
        &mut self,
        timers: &mut TimerQueue,
        now: Instant,
    ) -> Result<bool, DetectorError> {
        if self.phase.is_running() {
            debug!(phase = %self.phase, "detector already running");
            return Ok(false);
        }

        if let Some(stale) = self.handle.take() {
            Termination {
                handle: stale,
                grace: self.kill_grace,
            }
            .run_detached();
        }

        timers.cancel_slot(&mut self.ready_timer);
        self.generation += 1;
        match self.launcher.launch(self.generation, self.events.clone()) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.set_phase(WorkerPhase::Launching);
                self.ready_timer = Some(
                    timers.schedule(now + self.ready_timeout, TimerKind::DetectorReadyTimeout),
                );
                Ok(true)
            }
            Err(e) => {
                warn!(generation = self.generation, "detector launch failed: {e}");
                self.set_phase(WorkerPhase::Stopped);
                Err(e)
            }
        }
    }

    /// Ask the worker to open the camera.
    ///
    /// # Errors
    ///
    /// [`DetectorError::NotReady`] before the worker reports models ready.
    pub fn start_camera(&mut self) -> Result<(), DetectorError> {
        self.require_ready()?;
        self.send(WorkerCommand::StartCamera)
    }

    /// Ask the worker to release the camera. Pending retries are cancelled
    /// either way; the worker itself stays running.
    ///
    /// # Errors
    ///
    /// [`DetectorError::NotReady`] before the worker reports models ready.
    pub fn stop_camera(&mut self, timers: &mut TimerQueue) -> Result<(), DetectorError> {
        self.cancel_retry(timers);
        self.require_ready()?;
        self.send(WorkerCommand::StopCamera)?;
        if self.phase == WorkerPhase::CameraActive {
            self.set_phase(WorkerPhase::ModelsReady);
        }
        Ok(())
    }

    /// Update detection parameters; forwarded on the next [`Self::push_config`].
    pub fn set_detection_params(&mut self, ear_threshold: f32, frame_skip: u32) {
        self.ear_threshold = clamp_ear_threshold(ear_threshold);
        self.frame_skip = frame_skip.max(1);
    }

    /// Send the current EAR threshold and frame skip to the worker.
    ///
    /// # Errors
    ///
    /// [`DetectorError::NotReady`] before the worker reports models ready.
    pub fn push_config(&mut self) -> Result<(), DetectorError> {
        self.require_ready()?;
        self.send(WorkerCommand::EarThreshold(self.ear_threshold))?;
        self.send(WorkerCommand::FrameSkip(self.frame_skip))
    }

    /// Cancel a scheduled relaunch.
    pub fn cancel_retry(&mut self, timers: &mut TimerQueue) {
        if timers.cancel_slot(&mut self.retry_timer) {
            debug!("detector retry cancelled");
        }
    }

    /// Process one event from a worker reader task.
    pub fn handle_event(
        &mut self,
        event: WorkerEvent,
        timers: &mut TimerQueue,
    ) -> Option<DetectorSignal> {
        if event.generation() != self.generation {
            debug!(
                stale = event.generation(),
                current = self.generation,
                "dropping output from superseded worker"
            );
            return None;
        }
        match event {
            WorkerEvent::Line { line, .. } => self.handle_line(&line, timers),
            WorkerEvent::Exited { .. } => self.handle_exit(timers),
        }
    }

    fn handle_line(&mut self, line: &str, timers: &mut TimerQueue) -> Option<DetectorSignal> {
        let message = match WorkerMessage::parse(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("dropping worker line: {e}");
                return None;
            }
        };
        match message {
            WorkerMessage::Blink { ear } => {
                debug!(ear = ?ear, "blink");
                Some(DetectorSignal::Blink)
            }
            WorkerMessage::Status(WorkerStatus::ModelsReady) => {
                timers.cancel_slot(&mut self.ready_timer);
                if self.phase != WorkerPhase::Launching {
                    debug!(phase = %self.phase, "models-ready outside launch ignored");
                    return None;
                }
                self.set_phase(WorkerPhase::ModelsReady);
                if let Err(e) = self.push_config() {
                    warn!("failed to push detector config: {e}");
                }
                Some(DetectorSignal::Ready)
            }
            WorkerMessage::Status(WorkerStatus::CameraOpened) => {
                timers.cancel_slot(&mut self.ready_timer);
                self.set_phase(WorkerPhase::CameraActive);
                self.retry_count = 0;
                Some(DetectorSignal::CameraActive)
            }
            WorkerMessage::Status(WorkerStatus::Other(status)) => {
                info!(status = %status, "detector status");
                None
            }
            WorkerMessage::Error(message) => {
                warn!(error = %message, "detector reported error");
                timers.cancel_slot(&mut self.ready_timer);
                self.set_phase(WorkerPhase::Erroring);
                Some(DetectorSignal::Fault(DetectorFault::Camera(message)))
            }
            WorkerMessage::FaceData(value) | WorkerMessage::VideoStream(value) => {
                Some(DetectorSignal::Preview(value))
            }
        }
    }

    fn handle_exit(&mut self, timers: &mut TimerQueue) -> Option<DetectorSignal> {
        timers.cancel_slot(&mut self.ready_timer);
        let exit_code = self.handle.as_mut().and_then(|h| h.exit_code());
        self.handle = None;
        let already_reported = self.phase == WorkerPhase::Erroring;
        self.set_phase(WorkerPhase::Stopped);
        if already_reported {
            debug!(exit_code = ?exit_code, "detector exited after reporting an error");
            return None;
        }
        warn!(exit_code = ?exit_code, "detector worker exited");
        Some(DetectorSignal::Fault(DetectorFault::ProcessExited { exit_code }))
    }

    /// Record a camera failure and consult the retry policy.
    pub fn on_failure(&mut self, timers: &mut TimerQueue, now: Instant) -> RetryDecision {
        self.cancel_retry(timers);
        if self.exhausted {
            return RetryDecision::Exhausted;
        }
        self.retry_count += 1;
        if self.retry_count >= self.policy.max_attempts {
            self.exhausted = true;
            return RetryDecision::GiveUp {
                attempts: self.retry_count,
            };
        }
        self.retry_timer = Some(timers.schedule(now + self.policy.delay, TimerKind::DetectorRetry));
        RetryDecision::Retry {
            attempt: self.retry_count,
            delay: self.policy.delay,
        }
    }

    /// Handle a fired retry timer: relaunch if needed.
    ///
    /// Returns `Ok(false)` for a stale timer.
    ///
    /// # Errors
    ///
    /// Returns the launch error; callers treat it as another failure.
    pub fn on_retry_timer(
        &mut self,
        handle: TimerHandle,
        timers: &mut TimerQueue,
        now: Instant,
    ) -> Result<bool, DetectorError> {
        if self.retry_timer != Some(handle) {
            return Ok(false);
        }
        self.retry_timer = None;
        info!(attempt = self.retry_count, "retrying detector");
        if self.phase == WorkerPhase::Erroring {
            // The worker may still be alive after reporting a camera error.
            self.set_phase(WorkerPhase::Stopped);
        }
        self.ensure_running(timers, now)?;
        Ok(true)
    }

    /// Handle a fired readiness timer.
    pub fn on_ready_timeout(&mut self, handle: TimerHandle) -> Option<DetectorSignal> {
        if self.ready_timer != Some(handle) {
            return None;
        }
        self.ready_timer = None;
        if self.phase != WorkerPhase::Launching {
            return None;
        }
        warn!(timeout = ?self.ready_timeout, "detector did not report readiness");
        self.set_phase(WorkerPhase::Erroring);
        Some(DetectorSignal::Fault(DetectorFault::ReadyTimeout))
    }

    /// Stop the camera, cancel timers and hand the worker off for
    /// termination. Used only at application exit.
    pub fn begin_shutdown(&mut self, timers: &mut TimerQueue) -> Option<Termination> {
        if self.phase.is_ready() {
            if let Err(e) = self.send(WorkerCommand::StopCamera) {
                debug!("stop_camera not delivered at shutdown: {e}");
            }
        }
        self.cancel_retry(timers);
        timers.cancel_slot(&mut self.ready_timer);
        // Output from the outgoing worker is stale from here on.
        self.generation += 1;
        self.set_phase(WorkerPhase::Stopped);
        self.handle.take().map(|handle| Termination {
            handle,
            grace: self.kill_grace,
        })
    }

    /// Terminate synchronously with full escalation.
    pub fn shutdown(&mut self, timers: &mut TimerQueue) -> Option<TerminationTier> {
        self.begin_shutdown(timers).map(Termination::run)
    }

    /// Kill stray workers by executable name.
    pub fn sweep(&mut self) -> usize {
        self.launcher.sweep()
    }

    fn require_ready(&self) -> Result<(), DetectorError> {
        if self.phase.is_ready() && self.handle.is_some() {
            Ok(())
        } else {
            Err(DetectorError::NotReady { phase: self.phase })
        }
    }

    fn send(&mut self, command: WorkerCommand) -> Result<(), DetectorError> {
        let handle = self
            .handle
            .as_mut()
            .ok_or(DetectorError::NotReady { phase: self.phase })?;
        handle.send_line(command.to_line())
    }

    fn set_phase(&mut self, target: WorkerPhase) {
        if self.phase != target {
            debug!(
                from = %self.phase,
                to = %target,
                generation = self.generation,
                "detector phase transition"
            );
            self.phase = target;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::test_utils::FakeLauncher;
    use tokio::sync::mpsc;

    fn supervisor(launcher: &FakeLauncher) -> (DetectorSupervisor, TimerQueue) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sup = DetectorSupervisor::new(
            Box::new(launcher.clone()),
            tx,
            &DetectorConfig::default(),
            &ReminderConfig::default(),
        );
        (sup, TimerQueue::new())
    }

    fn line(generation: u64, text: &str) -> WorkerEvent {
        WorkerEvent::Line {
            generation,
            line: text.to_owned(),
        }
    }

    fn ready(sup: &mut DetectorSupervisor, timers: &mut TimerQueue) {
        let g = sup.generation();
        assert_eq!(
            sup.handle_event(line(g, r#"{"status":"Models ready"}"#), timers),
            Some(DetectorSignal::Ready)
        );
    }

    #[test]
    fn phase_predicates() {
        assert!(WorkerPhase::Launching.is_running());
        assert!(!WorkerPhase::Launching.is_ready());
        assert!(WorkerPhase::CameraActive.is_ready());
        assert!(!WorkerPhase::Erroring.is_running());
        assert_eq!(WorkerPhase::ModelsReady.to_string(), "models-ready");
    }

    #[test]
    fn ensure_running_spawns_once() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        let now = Instant::now();

        assert!(sup.ensure_running(&mut timers, now).unwrap());
        assert_eq!(sup.phase(), WorkerPhase::Launching);
        assert!(!sup.ensure_running(&mut timers, now).unwrap());
        assert_eq!(launcher.launches(), 1);
        assert_eq!(timers.count_kind(TimerKind::DetectorReadyTimeout), 1);
    }

    #[test]
    fn ensure_running_is_noop_while_camera_active() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        let now = Instant::now();
        sup.ensure_running(&mut timers, now).unwrap();
        ready(&mut sup, &mut timers);
        sup.handle_event(line(1, r#"{"status":"Camera opened successfully"}"#), &mut timers);
        sup.on_failure(&mut timers, now);
        sup.handle_event(line(1, r#"{"status":"Camera opened successfully"}"#), &mut timers);
        let before = sup.retry_count();

        assert!(!sup.ensure_running(&mut timers, now).unwrap());
        assert_eq!(launcher.launches(), 1);
        assert_eq!(sup.retry_count(), before);
        assert_eq!(sup.phase(), WorkerPhase::CameraActive);
    }

    #[test]
    fn camera_commands_rejected_before_ready() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        assert!(matches!(
            sup.start_camera(),
            Err(DetectorError::NotReady {
                phase: WorkerPhase::NotStarted
            })
        ));
        sup.ensure_running(&mut timers, Instant::now()).unwrap();
        assert!(matches!(
            sup.start_camera(),
            Err(DetectorError::NotReady {
                phase: WorkerPhase::Launching
            })
        ));
        assert!(launcher.sent_lines().is_empty());
    }

    #[test]
    fn models_ready_pushes_config_then_accepts_camera() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        sup.ensure_running(&mut timers, Instant::now()).unwrap();
        ready(&mut sup, &mut timers);
        assert_eq!(timers.count_kind(TimerKind::DetectorReadyTimeout), 0);

        sup.start_camera().unwrap();
        let sent = launcher.sent_lines();
        assert!(sent[0].contains("ear_threshold"));
        assert_eq!(sent[1], "{\"frame_skip\":1}\n");
        assert_eq!(sent[2], "{\"start_camera\":true}\n");
    }

    #[test]
    fn camera_opened_resets_retry_count() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        let now = Instant::now();
        sup.ensure_running(&mut timers, now).unwrap();
        assert!(matches!(
            sup.on_failure(&mut timers, now),
            RetryDecision::Retry { attempt: 1, .. }
        ));
        let g = sup.generation();
        assert_eq!(
            sup.handle_event(line(g, r#"{"status":"Camera opened successfully"}"#), &mut timers),
            Some(DetectorSignal::CameraActive)
        );
        assert_eq!(sup.retry_count(), 0);
    }

    #[test]
    fn retries_are_capped_and_latched() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        let now = Instant::now();

        assert_eq!(
            sup.on_failure(&mut timers, now),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );
        assert!(matches!(
            sup.on_failure(&mut timers, now),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        // Only one retry timer pending at a time.
        assert_eq!(timers.count_kind(TimerKind::DetectorRetry), 1);
        assert_eq!(
            sup.on_failure(&mut timers, now),
            RetryDecision::GiveUp { attempts: 3 }
        );
        assert_eq!(sup.on_failure(&mut timers, now), RetryDecision::Exhausted);
        assert!(sup.is_exhausted());
        assert_eq!(timers.count_kind(TimerKind::DetectorRetry), 0);

        sup.arm_retries();
        assert!(!sup.is_exhausted());
        assert_eq!(sup.retry_count(), 0);
    }

    #[test]
    fn retry_timer_relaunches_after_error() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        let now = Instant::now();
        sup.ensure_running(&mut timers, now).unwrap();
        ready(&mut sup, &mut timers);
        assert!(matches!(
            sup.handle_event(line(1, r#"{"error":"Failed to open camera"}"#), &mut timers),
            Some(DetectorSignal::Fault(DetectorFault::Camera(_)))
        ));
        sup.on_failure(&mut timers, now);

        let (handle, kind) = timers.pop_due(now + Duration::from_secs(2)).unwrap();
        assert_eq!(kind, TimerKind::DetectorRetry);
        assert!(sup.on_retry_timer(handle, &mut timers, now).unwrap());
        assert_eq!(launcher.launches(), 2);
        assert_eq!(launcher.terminations(), 1);
        assert_eq!(sup.generation(), 2);
        assert_eq!(sup.phase(), WorkerPhase::Launching);
    }

    #[test]
    fn stale_generation_output_is_dropped() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        let now = Instant::now();
        sup.ensure_running(&mut timers, now).unwrap();
        sup.handle_event(WorkerEvent::Exited { generation: 1 }, &mut timers);
        sup.ensure_running(&mut timers, now).unwrap();

        assert_eq!(
            sup.handle_event(line(1, r#"{"blink":true}"#), &mut timers),
            None
        );
        assert_eq!(
            sup.handle_event(WorkerEvent::Exited { generation: 1 }, &mut timers),
            None
        );
        assert_eq!(sup.phase(), WorkerPhase::Launching);
        assert_eq!(
            sup.handle_event(line(2, r#"{"blink":true}"#), &mut timers),
            Some(DetectorSignal::Blink)
        );
    }

    #[test]
    fn exit_after_error_is_reported_once() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        sup.ensure_running(&mut timers, Instant::now()).unwrap();
        assert!(
            sup.handle_event(line(1, r#"{"error":"Failed to read frame"}"#), &mut timers)
                .is_some()
        );
        assert_eq!(
            sup.handle_event(WorkerEvent::Exited { generation: 1 }, &mut timers),
            None
        );
        assert_eq!(sup.phase(), WorkerPhase::Stopped);
    }

    #[test]
    fn unexpected_exit_is_a_fault() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        sup.ensure_running(&mut timers, Instant::now()).unwrap();
        ready(&mut sup, &mut timers);
        assert_eq!(
            sup.handle_event(WorkerEvent::Exited { generation: 1 }, &mut timers),
            Some(DetectorSignal::Fault(DetectorFault::ProcessExited {
                exit_code: None
            }))
        );
        assert_eq!(sup.phase(), WorkerPhase::Stopped);
    }

    #[test]
    fn garbage_lines_are_dropped() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        sup.ensure_running(&mut timers, Instant::now()).unwrap();
        assert_eq!(sup.handle_event(line(1, "{{{"), &mut timers), None);
        assert_eq!(sup.handle_event(line(1, r#"{"x":1}"#), &mut timers), None);
        assert_eq!(sup.phase(), WorkerPhase::Launching);
    }

    #[test]
    fn ready_timeout_faults_only_while_launching() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        let now = Instant::now();
        sup.ensure_running(&mut timers, now).unwrap();
        let (handle, kind) = timers.pop_due(now + Duration::from_secs(30)).unwrap();
        assert_eq!(kind, TimerKind::DetectorReadyTimeout);
        assert_eq!(
            sup.on_ready_timeout(handle),
            Some(DetectorSignal::Fault(DetectorFault::ReadyTimeout))
        );
        assert_eq!(sup.phase(), WorkerPhase::Erroring);
        assert_eq!(sup.on_ready_timeout(handle), None);
    }

    #[tokio::test]
    async fn stale_worker_is_terminated_off_the_calling_thread() {
        let launcher = FakeLauncher::new();
        launcher.slow_terminate(Duration::from_millis(500));
        let (mut sup, mut timers) = supervisor(&launcher);
        let now = Instant::now();
        sup.ensure_running(&mut timers, now).unwrap();
        let (handle, _) = timers.pop_due(now + Duration::from_secs(30)).unwrap();
        sup.on_ready_timeout(handle);

        let started = std::time::Instant::now();
        assert!(sup.ensure_running(&mut timers, now).unwrap());
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(launcher.launches(), 2);
        assert_eq!(sup.phase(), WorkerPhase::Launching);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while launcher.terminations() == 0 && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(launcher.terminations(), 1);
    }

    #[test]
    fn stale_worker_without_runtime_is_terminated_inline() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        let now = Instant::now();
        sup.ensure_running(&mut timers, now).unwrap();
        let (handle, _) = timers.pop_due(now + Duration::from_secs(30)).unwrap();
        sup.on_ready_timeout(handle);
        sup.ensure_running(&mut timers, now).unwrap();
        assert_eq!(launcher.terminations(), 1);
    }

    #[test]
    fn stop_camera_keeps_worker_and_cancels_retry() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        let now = Instant::now();
        sup.ensure_running(&mut timers, now).unwrap();
        ready(&mut sup, &mut timers);
        sup.handle_event(line(1, r#"{"status":"Camera opened successfully"}"#), &mut timers);
        sup.on_failure(&mut timers, now);
        assert!(sup.retry_pending());

        sup.stop_camera(&mut timers).unwrap();
        assert!(!sup.retry_pending());
        assert_eq!(sup.phase(), WorkerPhase::ModelsReady);
        assert_eq!(launcher.terminations(), 0);
        assert!(launcher.sent_lines().last().unwrap().contains("stop_camera"));
    }

    #[test]
    fn shutdown_terminates_and_bumps_generation() {
        let launcher = FakeLauncher::new();
        let (mut sup, mut timers) = supervisor(&launcher);
        sup.ensure_running(&mut timers, Instant::now()).unwrap();
        assert!(sup.shutdown(&mut timers).is_some());
        assert_eq!(launcher.terminations(), 1);
        assert_eq!(sup.phase(), WorkerPhase::Stopped);
        assert!(timers.is_empty());
        assert_eq!(
            sup.handle_event(line(1, r#"{"blink":true}"#), &mut timers),
            None
        );
        assert!(sup.shutdown(&mut timers).is_none());
    }

    #[test]
    fn failed_launch_leaves_phase_stopped() {
        let launcher = FakeLauncher::new();
        launcher.fail_launches(true);
        let (mut sup, mut timers) = supervisor(&launcher);
        assert!(sup.ensure_running(&mut timers, Instant::now()).is_err());
        assert_eq!(sup.phase(), WorkerPhase::Stopped);
        assert!(timers.is_empty());
    }
}
