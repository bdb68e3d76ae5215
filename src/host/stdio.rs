//! Stdin/stdout JSON bridge for the host command channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from the input,
//! translates them into core events for the [`Runtime`], and writes
//! `ResponseEnvelope` and `EventEnvelope` messages as newline-delimited JSON
//! to the output.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr or the log file.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::detector::WorkerLauncher;
use crate::error::CoreError;
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::host::surface::HostSurfaceProvider;
use crate::notify::{Notification, Notifier};
use crate::overlay::WorkArea;
use crate::power::SleepWatcher;
use crate::prefs::PreferencesStore;
use crate::runtime::{CoreEvent, Runtime, RuntimeParts};
use crate::shutdown::{ClosePolicy, ExitTrigger, ShutdownCoordinator};

/// Outbound event broadcast capacity.
const EVENT_CAPACITY: usize = 128;

/// How long the forwarders get to flush after the runtime stops.
const FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Everything the bridge needs to build a [`Runtime`].
pub struct BridgeSetup {
    pub prefs: PreferencesStore,
    pub notifier: Notifier,
    pub launcher: Box<dyn WorkerLauncher>,
    pub shutdown: ShutdownCoordinator,
    pub close_policy: ClosePolicy,
    pub work_area: WorkArea,
    /// Infer sleep/resume from clock jumps when the host cannot forward
    /// power events.
    pub watch_sleep: bool,
    /// Forward OS termination signals as shutdown triggers.
    pub handle_signals: bool,
}

/// Run the bridge on the process's stdin and stdout.
pub async fn run_stdio_bridge(setup: BridgeSetup) -> crate::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_bridge(stdin, tokio::io::stdout(), setup).await
}

/// Run the bridge until the runtime shuts down.
///
/// Four concurrent tasks operate alongside the runtime loop:
///
/// 1. **Reader**: parses command envelopes, answers each with a response
///    envelope and queues the translated core event.
/// 2. **Event forwarder**: writes overlay events from the surface provider.
/// 3. **Notification forwarder**: writes core notifications.
/// 4. **Signal listener**: turns `SIGINT`/`SIGTERM` into a shutdown trigger.
///
/// Stdin EOF is a shutdown trigger as well.
pub async fn run_bridge<R, W>(input: R, output: W, setup: BridgeSetup) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer: SharedWriter<W> = Arc::new(Mutex::new(BufWriter::new(output)));
    let (event_tx, event_rx) = broadcast::channel::<EventEnvelope>(EVENT_CAPACITY);
    let notification_rx = setup.notifier.subscribe();

    let event_handle = tokio::spawn(forward(event_rx, Arc::clone(&writer), |e: &EventEnvelope| {
        e.clone()
    }));
    let notification_handle = tokio::spawn(forward(
        notification_rx,
        Arc::clone(&writer),
        |n: &Notification| EventEnvelope::from_notification(n),
    ));

    let (core_tx, core_rx) = mpsc::unbounded_channel::<CoreEvent>();
    let (worker_tx, worker_rx) = mpsc::unbounded_channel();
    let runtime = Runtime::new(
        RuntimeParts {
            prefs: setup.prefs,
            surfaces: Box::new(HostSurfaceProvider::new(event_tx.clone(), setup.work_area)),
            launcher: setup.launcher,
            notifier: setup.notifier,
            shutdown: setup.shutdown,
            close_policy: setup.close_policy,
        },
        worker_tx,
        Instant::now(),
    );

    let cancel = CancellationToken::new();
    if setup.watch_sleep {
        let watcher = SleepWatcher::new(core_tx.clone(), cancel.child_token());
        tokio::spawn(watcher.run());
    }
    let signal_handle = setup
        .handle_signals
        .then(|| tokio::spawn(forward_signals(core_tx.clone(), cancel.child_token())));
    let reader_handle = tokio::spawn(run_reader(input, core_tx, Arc::clone(&writer)));

    runtime.run(core_rx, worker_rx).await;

    cancel.cancel();
    reader_handle.abort();
    if let Some(handle) = signal_handle {
        let _ = handle.await;
    }
    let reader_result = match reader_handle.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(CoreError::Channel(format!("reader task failed: {e}"))),
    };

    // The runtime dropped its senders; close ours so both forwarders drain.
    drop(event_tx);
    let flushed = tokio::time::timeout(FLUSH_TIMEOUT, async {
        let _ = event_handle.await;
        let _ = notification_handle.await;
    })
    .await;
    if flushed.is_err() {
        tracing::warn!("event forwarders did not drain before exit");
    }

    reader_result
}

/// Read input line-by-line, queue core events and write responses.
async fn run_reader<R, W>(
    mut input: R,
    core_tx: mpsc::UnboundedSender<CoreEvent>,
    writer: SharedWriter<W>,
) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = input
            .read_line(&mut line)
            .await
            .map_err(|e| CoreError::Channel(format!("failed to read from stdin: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); requesting shutdown");
            let _ = core_tx.send(CoreEvent::Shutdown(ExitTrigger::InputClosed));
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<CommandEnvelope>(trimmed) {
            Ok(envelope) => dispatch(&envelope, &core_tx),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse command envelope from stdin"
                );
                ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                )
            }
        };

        let json = serde_json::to_string(&response).map_err(|e| {
            CoreError::Channel(format!("failed to serialize response envelope: {e}"))
        })?;
        let mut w = writer.lock().await;
        write_line(&mut w, &json).await?;
    }

    Ok(())
}

fn dispatch(
    envelope: &CommandEnvelope,
    core_tx: &mpsc::UnboundedSender<CoreEvent>,
) -> ResponseEnvelope {
    if let Err(e) = envelope.validate() {
        return ResponseEnvelope::error(&envelope.request_id, e.to_string());
    }
    match envelope.command {
        CommandName::HostPing => {
            return ResponseEnvelope::ok(&envelope.request_id, serde_json::json!({"pong": true}));
        }
        CommandName::HostVersion => {
            return ResponseEnvelope::ok(
                &envelope.request_id,
                serde_json::json!({
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                    "contract": crate::host::contract::EVENT_VERSION,
                }),
            );
        }
        _ => {}
    }

    let event = match envelope.to_core_event() {
        Ok(Some(event)) => event,
        Ok(None) => return ResponseEnvelope::ok(&envelope.request_id, serde_json::Value::Null),
        Err(e) => return ResponseEnvelope::error(&envelope.request_id, e.to_string()),
    };
    match core_tx.send(event) {
        Ok(()) => ResponseEnvelope::ok(
            &envelope.request_id,
            serde_json::json!({ "accepted": envelope.command.as_str() }),
        ),
        Err(_) => ResponseEnvelope::error(&envelope.request_id, "runtime is shutting down"),
    }
}

/// Write every message from `rx` until all senders are gone.
async fn forward<T, W>(
    mut rx: broadcast::Receiver<T>,
    writer: SharedWriter<W>,
    to_envelope: impl Fn(&T) -> EventEnvelope,
) where
    T: Clone,
    W: AsyncWrite + Unpin,
{
    loop {
        match rx.recv().await {
            Ok(item) => match serde_json::to_string(&to_envelope(&item)) {
                Ok(json) => {
                    let mut w = writer.lock().await;
                    if let Err(e) = write_line(&mut w, &json).await {
                        tracing::warn!(
                            error = %e,
                            "failed to write event envelope; stopping forwarder"
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                }
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Forward `SIGINT`/`SIGTERM` (Ctrl-C elsewhere) as shutdown triggers.
async fn forward_signals(core_tx: mpsc::UnboundedSender<CoreEvent>, cancel: CancellationToken) {
    let name = tokio::select! {
        _ = cancel.cancelled() => return,
        name = wait_for_signal() => name,
    };
    tracing::info!(signal = name, "termination signal received");
    let _ = core_tx.send(CoreEvent::Shutdown(ExitTrigger::Signal(name.to_owned())));
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        },
        Err(e) => {
            tracing::warn!("failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "CTRL_C"
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> crate::Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| CoreError::Channel(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| CoreError::Channel(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| CoreError::Channel(format!("failed to flush stdout: {e}")))?;
    Ok(())
}
