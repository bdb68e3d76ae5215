//! DryEye: blink reminders and eye-exercise prompts.
//!
//! The crate is the orchestration core behind a settings UI. It decides when
//! reminder overlays appear, supervises an external blink-detection worker
//! process, and shuts everything down cleanly on every exit path.
//!
//! # Architecture
//!
//! A single [`runtime::Runtime`] owns every component and applies one
//! transition per event:
//! - **Engine**: reminder modes (timed popup, camera-gated, MGD) and cadence
//! - **Detector**: worker spawn, JSON line protocol, retries, escalating kill
//! - **Overlay**: single-flight surfaces behind a [`overlay::SurfaceProvider`]
//! - **Exercise**: periodic eye-exercise prompts with skip and snooze
//! - **Power**: suspend/resume handling
//! - **Shutdown**: once-only, time-bounded teardown
//!
//! Timers live in one [`timers::TimerQueue`] so cancellation is synchronous
//! and late ticks are recognised by handle.

pub mod app_dirs;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod exercise;
pub mod host;
pub mod logging;
pub mod notify;
pub mod overlay;
pub mod power;
pub mod prefs;
pub mod runtime;
pub mod shutdown;
pub mod timers;

#[doc(hidden)]
pub mod test_utils;

pub use config::Preferences;
pub use engine::{ReminderEngine, ReminderMode};
pub use error::{CoreError, Result};
pub use runtime::{Command, CoreEvent, Runtime, RuntimeParts};
pub use shutdown::{ExitTrigger, ShutdownCoordinator};
