//! Deadline-ordered timer queue driven by the runtime loop.
//!
//! Timers are plain data: the runtime sleeps until [`TimerQueue::next_deadline`]
//! and pops due entries with [`TimerQueue::pop_due`]. Cancellation removes the
//! entry synchronously, so a cancelled timer can never be dequeued.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::overlay::OverlayToken;

/// Opaque handle identifying one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl std::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// What a timer means when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Reminder engine cadence check.
    ReminderTick,
    /// Auto-close for the overlay identified by `token`.
    OverlayAutoClose { token: OverlayToken },
    /// Detector relaunch after a camera failure.
    DetectorRetry,
    /// Freshly launched worker failed to report readiness in time.
    DetectorReadyTimeout,
    /// Forward debounced sensitivity settings to the worker.
    SensitivityDebounce,
    /// Exercise scheduler cadence check.
    ExerciseTick,
}

/// Single-threaded timer queue.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    entries: BTreeMap<(Instant, u64), TimerKind>,
    deadlines: HashMap<u64, Instant>,
}

impl TimerQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` to fire at `at`.
    pub fn schedule(&mut self, at: Instant, kind: TimerKind) -> TimerHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert((at, id), kind);
        self.deadlines.insert(id, at);
        TimerHandle(id)
    }

    /// Remove a pending timer. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.deadlines.remove(&handle.0) {
            Some(at) => self.entries.remove(&(at, handle.0)).is_some(),
            None => false,
        }
    }

    /// Cancel the timer stored in `slot`, if any, leaving the slot empty.
    pub fn cancel_slot(&mut self, slot: &mut Option<TimerHandle>) -> bool {
        slot.take().is_some_and(|handle| self.cancel(handle))
    }

    #[must_use]
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.deadlines.contains_key(&handle.0)
    }

    /// Deadline of a pending timer.
    #[must_use]
    pub fn deadline(&self, handle: TimerHandle) -> Option<Instant> {
        self.deadlines.get(&handle.0).copied()
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(at, _)| *at)
    }

    /// Pop the earliest timer whose deadline is at or before `now`.
    ///
    /// Timers sharing a deadline fire in scheduling order.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerHandle, TimerKind)> {
        let (&(at, id), _) = self.entries.iter().next()?;
        if at > now {
            return None;
        }
        let kind = self.entries.remove(&(at, id))?;
        self.deadlines.remove(&id);
        Some((TimerHandle(id), kind))
    }

    /// Drop every pending timer, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.deadlines.clear();
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count pending timers of a given kind.
    #[must_use]
    pub fn count_kind(&self, kind: TimerKind) -> usize {
        self.entries.values().filter(|k| **k == kind).count()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn pops_in_deadline_order() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        let late = q.schedule(t0 + ms(200), TimerKind::ExerciseTick);
        let early = q.schedule(t0 + ms(100), TimerKind::ReminderTick);

        assert_eq!(q.next_deadline(), Some(t0 + ms(100)));
        assert!(q.pop_due(t0 + ms(50)).is_none());
        assert_eq!(
            q.pop_due(t0 + ms(300)),
            Some((early, TimerKind::ReminderTick))
        );
        assert_eq!(
            q.pop_due(t0 + ms(300)),
            Some((late, TimerKind::ExerciseTick))
        );
        assert!(q.is_empty());
    }

    #[test]
    fn same_deadline_fires_in_schedule_order() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        let a = q.schedule(t0, TimerKind::DetectorRetry);
        let b = q.schedule(t0, TimerKind::SensitivityDebounce);
        assert_eq!(q.pop_due(t0).map(|(h, _)| h), Some(a));
        assert_eq!(q.pop_due(t0).map(|(h, _)| h), Some(b));
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        let h = q.schedule(t0 + ms(10), TimerKind::ReminderTick);
        assert!(q.cancel(h));
        assert!(!q.cancel(h));
        assert!(!q.is_pending(h));
        assert!(q.pop_due(t0 + ms(1_000)).is_none());
    }

    #[test]
    fn cancel_slot_empties_slot() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        let mut slot = Some(q.schedule(t0, TimerKind::ReminderTick));
        assert!(q.cancel_slot(&mut slot));
        assert!(slot.is_none());
        assert!(!q.cancel_slot(&mut slot));
    }

    #[test]
    fn clear_removes_everything() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        q.schedule(t0, TimerKind::ReminderTick);
        q.schedule(t0 + ms(5), TimerKind::ExerciseTick);
        assert_eq!(q.clear(), 2);
        assert_eq!(q.next_deadline(), None);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn count_kind_tracks_pending_entries() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        q.schedule(t0, TimerKind::ReminderTick);
        let h = q.schedule(t0, TimerKind::ReminderTick);
        assert_eq!(q.count_kind(TimerKind::ReminderTick), 2);
        q.cancel(h);
        assert_eq!(q.count_kind(TimerKind::ReminderTick), 1);
    }
}
