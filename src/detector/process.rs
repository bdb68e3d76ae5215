//! Worker process launching and termination.
//!
//! [`WorkerLauncher`] and [`WorkerHandle`] are the seam between the
//! supervisor's state machine and real OS processes. [`ProcessLauncher`]
//! spawns the worker with piped stdio: a reader task turns stdout into
//! [`WorkerEvent`]s tagged with the launch generation, and a writer task
//! drains an unbounded queue into stdin.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::DetectorError;
use super::protocol::LineBuffer;
use super::sweep::{WORKER_BINARY_NAMES, sweep_names, sweep_worker_processes};
use crate::config::DetectorConfig;

/// Output from a worker process, tagged with its launch generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// One complete stdout line.
    Line { generation: u64, line: String },
    /// Stdout closed; the process is gone or going.
    Exited { generation: u64 },
}

impl WorkerEvent {
    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::Line { generation, .. } | Self::Exited { generation } => *generation,
        }
    }
}

/// Sender half used by reader tasks.
pub type WorkerEventSender = mpsc::UnboundedSender<WorkerEvent>;

/// How far termination had to escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationTier {
    /// Nothing to do.
    AlreadyExited,
    /// SIGTERM (unix) or stdin close (windows) was enough.
    Graceful,
    /// Process-group / process-tree kill was needed.
    ProcessTree,
    /// Fell through to the name-based sweep.
    NameSweep,
}

impl std::fmt::Display for TerminationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::AlreadyExited => "already-exited",
            Self::Graceful => "graceful",
            Self::ProcessTree => "process-tree",
            Self::NameSweep => "name-sweep",
        })
    }
}

/// Spawns worker processes.
pub trait WorkerLauncher: Send {
    /// Launch a worker whose output is reported on `events` with `generation`.
    fn launch(
        &mut self,
        generation: u64,
        events: WorkerEventSender,
    ) -> Result<Box<dyn WorkerHandle>, DetectorError>;

    /// Kill stray workers by executable name. Returns the number of names
    /// that matched a process.
    fn sweep(&mut self) -> usize;
}

/// A live worker. Owned only by the supervisor.
pub trait WorkerHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Queue one protocol line for the worker's stdin.
    fn send_line(&mut self, line: String) -> Result<(), DetectorError>;

    fn is_alive(&mut self) -> bool;

    /// Exit code, if the process has exited.
    fn exit_code(&mut self) -> Option<i32>;

    /// Terminate with escalation, waiting up to `grace` per tier. Blocks.
    fn terminate(&mut self, grace: Duration) -> TerminationTier;
}

/// Locate the worker executable.
///
/// Search order: configured path, next to the current executable (and the
/// macOS bundle `Resources` directory), then `PATH`.
///
/// # Errors
///
/// Returns [`DetectorError::WorkerNotFound`] listing every location tried.
pub fn locate_worker(config: &DetectorConfig) -> Result<PathBuf, DetectorError> {
    let mut searched = Vec::new();

    if let Some(path) = &config.worker_path {
        if path.is_file() {
            return Ok(path.clone());
        }
        searched.push(path.display().to_string());
    }

    let binary = worker_binary_name();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        for candidate in [
            exe_dir.join(binary),
            exe_dir.join("..").join("Resources").join(binary),
        ] {
            if candidate.is_file() {
                return Ok(candidate);
            }
            searched.push(candidate.display().to_string());
        }
    }

    match which::which(binary) {
        Ok(path) => Ok(path),
        Err(_) => {
            searched.push(format!("PATH/{binary}"));
            Err(DetectorError::WorkerNotFound {
                searched: searched.join(", "),
            })
        }
    }
}

fn worker_binary_name() -> &'static str {
    if cfg!(windows) {
        WORKER_BINARY_NAMES[1]
    } else {
        WORKER_BINARY_NAMES[0]
    }
}

/// Launches the real worker executable.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: DetectorConfig,
    sweep_names: Vec<String>,
}

impl ProcessLauncher {
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        let extra = config
            .worker_path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .map(str::to_owned);
        Self {
            sweep_names: sweep_names(extra.as_deref()),
            config,
        }
    }

    /// Spawn `program` directly, bypassing worker lookup.
    fn spawn(
        &self,
        program: &Path,
        generation: u64,
        events: WorkerEventSender,
    ) -> Result<ProcessHandle, DetectorError> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(&self.config.worker_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(DetectorError::SpawnFailed)?;
        let pid = child.id();

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                while let Some(line) = stdin_rx.recv().await {
                    if let Err(e) = stdin.write_all(line.as_bytes()).await {
                        warn!(generation, "detector stdin write failed: {e}");
                        break;
                    }
                    if let Err(e) = stdin.flush().await {
                        warn!(generation, "detector stdin flush failed: {e}");
                        break;
                    }
                }
            });
        }

        if let Some(mut stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = LineBuffer::new();
                let mut chunk = vec![0u8; 8192];
                loop {
                    match stdout.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            for line in lines.push(&chunk[..n]) {
                                if events.send(WorkerEvent::Line { generation, line }).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(generation, "detector stdout read failed: {e}");
                            break;
                        }
                    }
                }
                if let Some(line) = lines.finish() {
                    let _ = events.send(WorkerEvent::Line { generation, line });
                }
                let _ = events.send(WorkerEvent::Exited { generation });
            });
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    debug!(target: "dryeye::worker", generation, "{line}");
                }
            });
        }

        info!(generation, pid = ?pid, program = %program.display(), "spawned detector worker");
        Ok(ProcessHandle {
            child,
            pid,
            stdin: Some(stdin_tx),
            sweep_names: self.sweep_names.clone(),
        })
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &mut self,
        generation: u64,
        events: WorkerEventSender,
    ) -> Result<Box<dyn WorkerHandle>, DetectorError> {
        let program = locate_worker(&self.config)?;
        let handle = self.spawn(&program, generation, events)?;
        Ok(Box::new(handle))
    }

    fn sweep(&mut self) -> usize {
        sweep_worker_processes(&self.sweep_names)
    }
}

/// Handle to a spawned worker process.
///
/// The child is killed when this value is dropped.
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    stdin: Option<mpsc::UnboundedSender<String>>,
    sweep_names: Vec<String>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("stdin_open", &self.stdin.is_some())
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// Poll until the child exits or `grace` elapses.
    fn wait_exit(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            if !self.is_alive() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[cfg(unix)]
    fn signal_graceful(&mut self) {
        if let Some(pid) = self.pid.and_then(|p| i32::try_from(p).ok()) {
            // SAFETY: kill(2) with a pid we spawned and have not reaped.
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }

    #[cfg(windows)]
    fn signal_graceful(&mut self) {
        // Closing stdin (done by the caller) is the cooperative signal.
    }

    #[cfg(unix)]
    fn kill_tree(&mut self) {
        if let Some(pid) = self.pid.and_then(|p| i32::try_from(p).ok()) {
            // SAFETY: the worker leads its own process group (pgid == pid).
            unsafe {
                libc::killpg(pid, libc::SIGKILL);
            }
        }
        let _ = self.child.start_kill();
    }

    #[cfg(windows)]
    fn kill_tree(&mut self) {
        if let Some(pid) = self.pid {
            let _ = std::process::Command::new("taskkill")
                .args(["/T", "/F", "/PID", &pid.to_string()])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        }
        let _ = self.child.start_kill();
    }
}

impl WorkerHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn send_line(&mut self, line: String) -> Result<(), DetectorError> {
        let tx = self.stdin.as_ref().ok_or(DetectorError::ChannelClosed)?;
        tx.send(line).map_err(|_| DetectorError::ChannelClosed)
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn exit_code(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => status.code(),
            _ => None,
        }
    }

    fn terminate(&mut self, grace: Duration) -> TerminationTier {
        if !self.is_alive() {
            self.stdin = None;
            return TerminationTier::AlreadyExited;
        }

        self.stdin = None;
        self.signal_graceful();
        if self.wait_exit(grace) {
            return TerminationTier::Graceful;
        }

        warn!(pid = ?self.pid, "detector worker ignored graceful stop, killing process tree");
        self.kill_tree();
        if self.wait_exit(grace) {
            return TerminationTier::ProcessTree;
        }

        warn!(pid = ?self.pid, "detector worker survived tree kill, sweeping by name");
        sweep_worker_processes(&self.sweep_names);
        let _ = self.wait_exit(grace);
        TerminationTier::NameSweep
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = self.child.start_kill();
            debug!(pid = ?self.pid, "killed detector worker on drop");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn script_config(script: &str) -> DetectorConfig {
        DetectorConfig {
            worker_path: Some(PathBuf::from("/bin/sh")),
            worker_args: vec!["-c".to_owned(), script.to_owned()],
            ..DetectorConfig::default()
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> WorkerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("worker event within timeout")
            .expect("channel open")
    }

    #[tokio::test]
    async fn reader_tags_lines_with_generation() {
        let mut launcher = ProcessLauncher::new(script_config(
            r#"printf '{"status":"Models ready"}\n{"blink":true}\n'"#,
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = launcher.launch(7, tx).unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            WorkerEvent::Line {
                generation: 7,
                line: r#"{"status":"Models ready"}"#.into()
            }
        );
        assert_eq!(next_event(&mut rx).await.generation(), 7);
        assert_eq!(next_event(&mut rx).await, WorkerEvent::Exited { generation: 7 });
    }

    #[tokio::test]
    async fn writer_delivers_commands_to_stdin() {
        // Echo the first stdin line back on stdout.
        let mut launcher = ProcessLauncher::new(script_config("IFS= read -r line; echo \"$line\""));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = launcher.launch(1, tx).unwrap();
        handle
            .send_line(super::super::protocol::WorkerCommand::StartCamera.to_line())
            .unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            WorkerEvent::Line {
                generation: 1,
                line: r#"{"start_camera":true}"#.into()
            }
        );
    }

    #[tokio::test]
    async fn graceful_terminate_stops_cooperative_worker() {
        let mut launcher = ProcessLauncher::new(script_config("sleep 60"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut handle = launcher.launch(1, tx).unwrap();
        assert!(handle.is_alive());

        let tier = tokio::task::spawn_blocking(move || {
            let tier = handle.terminate(Duration::from_secs(2));
            (tier, handle.is_alive())
        })
        .await
        .unwrap();
        assert_eq!(tier, (TerminationTier::Graceful, false));
    }

    #[tokio::test]
    async fn stubborn_worker_escalates_to_tree_kill() {
        let mut launcher = ProcessLauncher::new(script_config("trap '' TERM; while :; do sleep 1; done"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut handle = launcher.launch(1, tx).unwrap();
        // Let the shell install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let tier = tokio::task::spawn_blocking(move || handle.terminate(Duration::from_millis(300)))
            .await
            .unwrap();
        assert_eq!(tier, TerminationTier::ProcessTree);
    }

    #[tokio::test]
    async fn terminate_after_exit_is_noop() {
        let mut launcher = ProcessLauncher::new(script_config("exit 3"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = launcher.launch(2, tx).unwrap();
        assert_eq!(next_event(&mut rx).await, WorkerEvent::Exited { generation: 2 });
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(handle.exit_code(), Some(3));
        assert_eq!(
            handle.terminate(Duration::from_millis(100)),
            TerminationTier::AlreadyExited
        );
    }

    #[test]
    fn missing_worker_reports_search_path() {
        let config = DetectorConfig {
            worker_path: Some(PathBuf::from("/nonexistent/blink_detector")),
            ..DetectorConfig::default()
        };
        // Only fails when blink_detector is not installed on this machine.
        if which::which("blink_detector").is_err() {
            let err = locate_worker(&config).unwrap_err();
            assert!(err.to_string().contains("/nonexistent/blink_detector"));
        }
    }
}
