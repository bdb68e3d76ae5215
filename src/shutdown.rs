//! Shutdown coordination.
//!
//! Every exit path (quit request, window close, termination signal, stdin
//! EOF, panic) funnels into [`ShutdownCoordinator::drain`]. The coordinator
//! guarantees the teardown runs at most once across all threads and never
//! outlives the drain timeout; past the timeout the hard-exit hook runs.
//!
//! ```text
//! Running → Draining → Terminating → Done
//!               └─ timeout ─▶ hard exit
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tracing::{error, info, warn};

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    Running = 0,
    Draining = 1,
    Terminating = 2,
    Done = 3,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            2 => Self::Terminating,
            _ => Self::Done,
        }
    }
}

impl std::fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminating => "terminating",
            Self::Done => "done",
        })
    }
}

/// Why the application is exiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitTrigger {
    /// Explicit quit from the user or host.
    QuitRequested,
    /// The main window closed and the platform policy says quit.
    WindowClosed,
    /// OS termination signal, e.g. `SIGTERM`.
    Signal(String),
    /// Host input stream ended.
    InputClosed,
    /// Uncaught fault (panic).
    Fault(String),
}

impl std::fmt::Display for ExitTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuitRequested => f.write_str("quit requested"),
            Self::WindowClosed => f.write_str("window closed"),
            Self::Signal(name) => write!(f, "signal {name}"),
            Self::InputClosed => f.write_str("host input closed"),
            Self::Fault(msg) => write!(f, "fault: {msg}"),
        }
    }
}

/// What closing the main window means on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePolicy {
    /// Quit once the last window is gone.
    QuitOnLastWindow,
    /// Keep running in the background; only an explicit quit exits.
    KeepRunning,
}

impl ClosePolicy {
    /// macOS keeps apps alive without windows; elsewhere closing quits.
    #[must_use]
    pub fn for_current_platform() -> Self {
        if cfg!(target_os = "macos") {
            Self::KeepRunning
        } else {
            Self::QuitOnLastWindow
        }
    }

    #[must_use]
    pub fn should_quit(self, last_window: bool) -> bool {
        match self {
            Self::QuitOnLastWindow => last_window,
            Self::KeepRunning => false,
        }
    }
}

/// Result of a [`ShutdownCoordinator::drain`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// This call ran the teardown to completion.
    Completed,
    /// Another caller already owns the drain.
    AlreadyDraining,
    /// The teardown overran the timeout and the hard-exit hook ran.
    TimedOut,
}

type HardExit = Box<dyn Fn(i32) + Send + Sync>;

struct Inner {
    state: AtomicU8,
    timeout: Duration,
    hard_exit: HardExit,
}

/// Single-entry, time-bounded shutdown guard. Cheap to clone.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl ShutdownCoordinator {
    /// Coordinator whose hard-exit hook is `std::process::exit`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_hard_exit(timeout, |code| std::process::exit(code))
    }

    /// Coordinator with a custom hard-exit hook.
    pub fn with_hard_exit(timeout: Duration, hard_exit: impl Fn(i32) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(ShutdownState::Running as u8),
                timeout,
                hard_exit: Box::new(hard_exit),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Claim the drain. Exactly one caller ever gets `true`.
    pub fn try_begin(&self, trigger: &ExitTrigger) -> bool {
        let claimed = self
            .inner
            .state
            .compare_exchange(
                ShutdownState::Running as u8,
                ShutdownState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if claimed {
            info!(%trigger, "shutdown started");
        } else {
            info!(%trigger, state = %self.state(), "shutdown already in progress");
        }
        claimed
    }

    fn advance(&self, state: ShutdownState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// Run `teardown` once, bounded by the timeout.
    pub async fn drain<F>(&self, trigger: ExitTrigger, teardown: F) -> DrainOutcome
    where
        F: Future<Output = ()>,
    {
        if !self.try_begin(&trigger) {
            return DrainOutcome::AlreadyDraining;
        }
        match tokio::time::timeout(self.inner.timeout, teardown).await {
            Ok(()) => {
                self.advance(ShutdownState::Terminating);
                self.advance(ShutdownState::Done);
                info!(%trigger, "shutdown complete");
                DrainOutcome::Completed
            }
            Err(_) => {
                self.advance(ShutdownState::Terminating);
                error!(
                    %trigger,
                    timeout_ms = self.inner.timeout.as_millis() as u64,
                    "shutdown drain timed out, forcing exit"
                );
                (self.inner.hard_exit)(1);
                self.advance(ShutdownState::Done);
                DrainOutcome::TimedOut
            }
        }
    }

    /// Synchronous last-resort path for contexts without a runtime (panic
    /// hook): claim the drain and run `teardown` inline.
    pub fn drain_blocking(&self, trigger: ExitTrigger, teardown: impl FnOnce()) -> bool {
        if !self.try_begin(&trigger) {
            return false;
        }
        warn!(%trigger, "running emergency teardown");
        teardown();
        self.advance(ShutdownState::Done);
        true
    }
}
