//! Eye-exercise scheduler.
//!
//! Independent of the reminder engine: its own cadence timer and its own
//! overlay slot, so an exercise prompt and a blink popup may be visible at
//! the same time.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{ExerciseConfig, Preferences};
use crate::overlay::{OverlayManager, OverlayRequest, OverlaySlot, OverlayToken};
use crate::timers::{TimerHandle, TimerKind, TimerQueue};

/// Built-in prompts, shown in rotation.
pub const EXERCISES: &[&str] = &[
    "20-20-20: look at something 20 feet away for 20 seconds",
    "Roll your eyes slowly in a full circle, five times each way",
    "Focus on your fingertip, then on the far wall. Repeat ten times",
    "Squeeze your eyes shut for three seconds, then open wide. Repeat five times",
];

/// Collaborators borrowed for one scheduler transition.
pub struct ExerciseContext<'a> {
    pub overlays: &'a mut OverlayManager,
    pub timers: &'a mut TimerQueue,
    pub prefs: &'a Preferences,
    pub now: Instant,
}

/// Schedule state.
#[derive(Debug, Clone)]
pub struct ExerciseSchedule {
    pub interval: Duration,
    pub last_exercise_at: Instant,
    pub snooze_until: Option<Instant>,
    /// A prompt is on screen; further ticks must not stack another.
    pub showing: bool,
}

impl ExerciseSchedule {
    /// Earliest instant the next prompt may appear.
    #[must_use]
    pub fn next_due(&self) -> Instant {
        let due = self.last_exercise_at + self.interval;
        match self.snooze_until {
            Some(snooze) => due.max(snooze),
            None => due,
        }
    }
}

/// Periodic exercise prompts with skip, snooze and rotation.
#[derive(Debug)]
pub struct ExerciseScheduler {
    schedule: ExerciseSchedule,
    enabled: bool,
    paused: bool,
    display: Duration,
    snooze: Duration,
    rotation: usize,
    tick: Option<TimerHandle>,
    overlay: Option<OverlayToken>,
}

impl ExerciseScheduler {
    #[must_use]
    pub fn new(config: &ExerciseConfig, now: Instant) -> Self {
        Self {
            schedule: ExerciseSchedule {
                interval: config.interval(),
                last_exercise_at: now,
                snooze_until: None,
                showing: false,
            },
            enabled: false,
            paused: false,
            display: config.display(),
            snooze: config.snooze(),
            rotation: 0,
            tick: None,
            overlay: None,
        }
    }

    #[must_use]
    pub fn schedule(&self) -> &ExerciseSchedule {
        &self.schedule
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn is_showing(&self) -> bool {
        self.schedule.showing
    }

    /// Prompt that will be shown next.
    #[must_use]
    pub fn next_prompt(&self) -> &'static str {
        EXERCISES[self.rotation % EXERCISES.len()]
    }

    /// Enable or disable prompts. Enabling starts a fresh interval.
    pub fn set_enabled(&mut self, ctx: &mut ExerciseContext<'_>, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            self.schedule.last_exercise_at = ctx.now;
            self.schedule.snooze_until = None;
            self.arm(ctx);
            info!(
                interval_secs = self.schedule.interval.as_secs(),
                "exercise prompts enabled"
            );
        } else {
            self.cancel(ctx.timers, ctx.overlays);
            info!("exercise prompts disabled");
        }
    }

    /// Apply changed exercise preferences.
    pub fn reconfigure(&mut self, ctx: &mut ExerciseContext<'_>, config: &ExerciseConfig) {
        self.display = config.display();
        self.snooze = config.snooze();
        if self.schedule.interval != config.interval() {
            self.schedule.interval = config.interval();
            if self.enabled && !self.schedule.showing {
                self.arm(ctx);
            }
        }
        self.set_enabled(ctx, config.enabled);
    }

    /// A cadence tick fired.
    pub fn on_tick(&mut self, ctx: &mut ExerciseContext<'_>, handle: TimerHandle) {
        if self.tick != Some(handle) {
            debug!(%handle, "stale exercise tick discarded");
            return;
        }
        self.tick = None;
        if !self.enabled || self.paused || self.schedule.showing {
            return;
        }
        if ctx.now < self.schedule.next_due() {
            self.arm(ctx);
            return;
        }

        let prompt = self.next_prompt();
        let request = OverlayRequest::exercise(
            &ctx.prefs.popup,
            ctx.overlays.work_area(),
            prompt,
            self.display,
        );
        if let Some(token) = ctx.overlays.show_or_warn(&request, ctx.timers, ctx.now) {
            self.overlay = Some(token);
            self.schedule.showing = true;
            self.rotation = self.rotation.wrapping_add(1);
            info!(prompt, "exercise prompt shown");
        } else {
            // Try again after a full interval rather than spinning.
            self.schedule.last_exercise_at = ctx.now;
            self.arm(ctx);
        }
    }

    /// The exercise overlay finished its display time.
    pub fn on_overlay_closed(&mut self, ctx: &mut ExerciseContext<'_>, token: OverlayToken) {
        if self.overlay != Some(token) {
            return;
        }
        self.overlay = None;
        self.complete(ctx);
    }

    /// Dismiss the current prompt (or the upcoming one) and restart the interval.
    pub fn skip(&mut self, ctx: &mut ExerciseContext<'_>) {
        self.close_overlay(ctx);
        info!("exercise skipped");
        self.complete(ctx);
    }

    /// Defer prompts by the snooze duration.
    pub fn snooze(&mut self, ctx: &mut ExerciseContext<'_>) {
        if !self.enabled {
            return;
        }
        self.close_overlay(ctx);
        self.schedule.showing = false;
        self.schedule.snooze_until = Some(ctx.now + self.snooze);
        info!(snooze_secs = self.snooze.as_secs(), "exercise snoozed");
        if !self.paused {
            self.arm(ctx);
        }
    }

    /// Stop the cadence (system sleep).
    pub fn pause(&mut self, ctx: &mut ExerciseContext<'_>) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.cancel(ctx.timers, ctx.overlays);
    }

    /// Re-arm after [`Self::pause`]. The interval restarts from `now`.
    pub fn resume(&mut self, ctx: &mut ExerciseContext<'_>) {
        if !self.paused {
            return;
        }
        self.paused = false;
        if self.enabled {
            self.schedule.last_exercise_at = ctx.now;
            self.schedule.snooze_until = None;
            self.arm(ctx);
        }
    }

    /// Cancel the tick and close any prompt.
    pub fn cancel(&mut self, timers: &mut TimerQueue, overlays: &mut OverlayManager) {
        timers.cancel_slot(&mut self.tick);
        if let Some(token) = self.overlay.take() {
            overlays.close_token(token, timers);
        }
        self.schedule.showing = false;
    }

    fn complete(&mut self, ctx: &mut ExerciseContext<'_>) {
        self.schedule.showing = false;
        self.schedule.last_exercise_at = ctx.now;
        self.schedule.snooze_until = None;
        if self.enabled && !self.paused {
            self.arm(ctx);
        }
    }

    fn close_overlay(&mut self, ctx: &mut ExerciseContext<'_>) {
        if let Some(token) = self.overlay.take() {
            ctx.overlays.close_token(token, ctx.timers);
        } else if ctx.overlays.current(OverlaySlot::Exercise).is_some() {
            ctx.overlays.close_slot(OverlaySlot::Exercise, ctx.timers);
        }
    }

    fn arm(&mut self, ctx: &mut ExerciseContext<'_>) {
        ctx.timers.cancel_slot(&mut self.tick);
        let at = self.schedule.next_due().max(ctx.now);
        self.tick = Some(ctx.timers.schedule(at, TimerKind::ExerciseTick));
    }
}
