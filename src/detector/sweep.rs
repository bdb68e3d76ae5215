//! Name-based worker sweep, the last termination tier.
//!
//! Only used after handle-based termination failed, or at exit to catch
//! workers orphaned by an earlier crash.

use std::process::{Command, Stdio};

use tracing::{debug, info};

/// Executable names of the blink detection worker.
pub const WORKER_BINARY_NAMES: &[&str] = &["blink_detector", "blink_detector.exe"];

/// Default worker names to sweep, plus `extra` (e.g. a configured binary).
#[must_use]
pub fn sweep_names(extra: Option<&str>) -> Vec<String> {
    let mut names: Vec<String> = WORKER_BINARY_NAMES.iter().map(|s| (*s).to_owned()).collect();
    if let Some(name) = extra.filter(|name| !names.iter().any(|n| n == name)) {
        names.push(name.to_owned());
    }
    names
}

/// Force-kill every process whose executable name matches one of `names`.
///
/// Returns how many names matched at least one process.
pub fn sweep_worker_processes(names: &[String]) -> usize {
    let mut matched = 0;
    for name in names {
        if kill_by_name(name) {
            info!(name = %name, "swept leftover detector worker");
            matched += 1;
        }
    }
    matched
}

#[cfg(unix)]
fn kill_by_name(name: &str) -> bool {
    // pkill matches at most 15 characters of the process name on Linux.
    if name.ends_with(".exe") {
        return false;
    }
    let status = Command::new("pkill")
        .args(["-KILL", "-x", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        // pkill exits 0 when at least one process matched.
        Ok(status) => status.success(),
        Err(e) => {
            debug!(name, "pkill unavailable: {e}");
            false
        }
    }
}

#[cfg(windows)]
fn kill_by_name(name: &str) -> bool {
    let image = if name.ends_with(".exe") {
        name.to_owned()
    } else {
        format!("{name}.exe")
    };
    let status = Command::new("taskkill")
        .args(["/F", "/T", "/IM", &image])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) => status.success(),
        Err(e) => {
            debug!(name, "taskkill unavailable: {e}");
            false
        }
    }
}
