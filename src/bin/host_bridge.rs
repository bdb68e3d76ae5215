//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! This binary reads `CommandEnvelope` messages as newline-delimited JSON
//! from stdin, drives the reminder runtime, and writes `ResponseEnvelope`
//! and `EventEnvelope` messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr and the rolling log file so
//! that stdout remains a clean JSON protocol channel.

use std::time::Duration;

use dryeye::app_dirs;
use dryeye::detector::{ProcessLauncher, WorkerLauncher};
use dryeye::host::{BridgeSetup, run_stdio_bridge};
use dryeye::logging;
use dryeye::notify::Notifier;
use dryeye::overlay::WorkArea;
use dryeye::prefs::{PreferencesStore, TomlPersistence};
use dryeye::shutdown::{ClosePolicy, ExitTrigger, ShutdownCoordinator};

/// Notification fan-out capacity.
const NOTIFY_CAPACITY: usize = 64;

/// Grace for blocking tasks at exit. A stdin read still parked on the
/// blocking pool after `app.quit` would otherwise keep the process alive.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

async fn run() -> anyhow::Result<()> {
    let _log_guard = match logging::init_logging(&app_dirs::logs_dir()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_stderr_logging();
            tracing::warn!("file logging unavailable, using stderr only: {e}");
            None
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dryeye-host starting");

    let (notifier, _) = Notifier::new(NOTIFY_CAPACITY);
    let persistence = TomlPersistence::at_default_path();
    tracing::info!(path = %persistence.path().display(), "loading preferences");
    let prefs = PreferencesStore::load(Box::new(persistence), notifier.clone());

    let shutdown = ShutdownCoordinator::new(prefs.get().shutdown.drain_timeout());
    let launcher = ProcessLauncher::new(prefs.get().detector.clone());
    install_panic_hook(shutdown.clone(), launcher.clone());

    let setup = BridgeSetup {
        prefs,
        notifier,
        launcher: Box::new(launcher),
        shutdown,
        close_policy: ClosePolicy::for_current_platform(),
        work_area: WorkArea::default(),
        watch_sleep: true,
        handle_signals: true,
    };

    run_stdio_bridge(setup).await.map_err(|e| {
        tracing::error!(error = %e, "dryeye-host exited with error");
        anyhow::anyhow!("dryeye-host failed: {e}")
    })?;

    tracing::info!("dryeye-host shut down cleanly");
    Ok(())
}

/// On panic, claim the shutdown guard and kill any worker by name before the
/// default hook runs. The live handle is unreachable from here.
fn install_panic_hook(shutdown: ShutdownCoordinator, launcher: ProcessLauncher) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = info.to_string();
        shutdown.drain_blocking(ExitTrigger::Fault(message), || {
            let mut launcher = launcher.clone();
            launcher.sweep();
        });
        previous(info);
    }));
}
