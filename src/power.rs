//! System sleep/resume handling.
//!
//! [`PowerEventBridge`] turns suspend/resume notifications into engine,
//! supervisor and exercise transitions. Hosts that forward OS power events
//! send `power.suspend` / `power.resume`; otherwise [`SleepWatcher`] infers a
//! sleep from the wall clock jumping ahead of the monotonic clock.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dryeye::power::SleepWatcher;
//! let watcher = SleepWatcher::new(event_tx.clone(), cancel.child_token());
//! tokio::spawn(watcher.run());
//! ```

use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::{EngineContext, ReminderEngine};
use crate::exercise::ExerciseScheduler;
use crate::runtime::CoreEvent;

/// Poll interval of the sleep watcher.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Wall-clock gain over monotonic time that counts as a sleep.
const SLEEP_THRESHOLD: Duration = Duration::from_secs(15);

/// OS power transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSignal {
    Suspend,
    Resume,
}

/// What was running when the system went to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendSnapshot {
    pub tracking_active: bool,
    pub camera_active: bool,
}

/// Drives component transitions across a suspend/resume pair.
#[derive(Debug, Default)]
pub struct PowerEventBridge {
    suspended: Option<SuspendSnapshot>,
}

impl PowerEventBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    /// Apply one power signal. Duplicate suspends and unmatched resumes are
    /// ignored.
    pub fn on_signal(
        &mut self,
        signal: PowerSignal,
        engine: &mut ReminderEngine,
        exercise: &mut ExerciseScheduler,
        ctx: &mut EngineContext<'_>,
    ) {
        match signal {
            PowerSignal::Suspend => {
                if self.suspended.is_some() {
                    debug!("duplicate suspend ignored");
                    return;
                }
                let snapshot = SuspendSnapshot {
                    tracking_active: engine.is_active() && !engine.is_paused(),
                    camera_active: engine.mode().uses_camera(),
                };
                engine.pause(ctx);
                if !snapshot.tracking_active {
                    // Tracking was off; release a warm camera and its retries.
                    if let Err(e) = ctx.detector.stop_camera(ctx.timers) {
                        debug!("camera not stopped on suspend: {e}");
                    }
                }
                exercise.pause(&mut ctx.exercise());
                info!(
                    tracking = snapshot.tracking_active,
                    camera = snapshot.camera_active,
                    "system suspending"
                );
                self.suspended = Some(snapshot);
            }
            PowerSignal::Resume => {
                let Some(snapshot) = self.suspended.take() else {
                    debug!("resume without suspend ignored");
                    return;
                };
                info!("system resumed");
                exercise.resume(&mut ctx.exercise());
                if snapshot.tracking_active {
                    engine.resume(ctx, snapshot.camera_active);
                }
            }
        }
    }
}

/// `true` when the wall clock advanced at least `threshold` more than the
/// monotonic clock over the same poll.
#[must_use]
pub fn detect_sleep(wall_elapsed: Duration, mono_elapsed: Duration, threshold: Duration) -> bool {
    wall_elapsed.saturating_sub(mono_elapsed) >= threshold
}

/// Infers system sleep by comparing wall-clock and monotonic progress.
pub struct SleepWatcher {
    tx: mpsc::UnboundedSender<CoreEvent>,
    cancel: CancellationToken,
    poll_interval: Duration,
    threshold: Duration,
}

impl SleepWatcher {
    /// Create a watcher that reports on `tx` until `cancel` is cancelled.
    pub fn new(tx: mpsc::UnboundedSender<CoreEvent>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            cancel,
            poll_interval: POLL_INTERVAL,
            threshold: SLEEP_THRESHOLD,
        }
    }

    /// Override the poll interval (useful for testing).
    #[cfg(test)]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until cancelled or the event channel closes.
    pub async fn run(self) {
        let mut last_wall = SystemTime::now();
        let mut last_mono = Instant::now();
        debug!("sleep watcher started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("sleep watcher stopped");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    let wall = SystemTime::now();
                    let mono = Instant::now();
                    let wall_elapsed = wall.duration_since(last_wall).unwrap_or_default();
                    let mono_elapsed = mono.duration_since(last_mono);
                    if detect_sleep(wall_elapsed, mono_elapsed, self.threshold) {
                        info!(
                            slept_secs = wall_elapsed.saturating_sub(mono_elapsed).as_secs(),
                            "wall clock jumped, treating as sleep/resume"
                        );
                        let delivered = self.tx.send(CoreEvent::Power(PowerSignal::Suspend)).is_ok()
                            && self.tx.send(CoreEvent::Power(PowerSignal::Resume)).is_ok();
                        if !delivered {
                            break;
                        }
                    }
                    last_wall = wall;
                    last_mono = mono;
                }
            }
        }
    }
}
