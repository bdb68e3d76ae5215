//! In-memory collaborators shared by unit and integration tests.
//!
//! [`RecordingSurfaceProvider`] stands in for the UI toolkit and
//! [`FakeLauncher`] for the detection worker. Both are cheap to clone and
//! clones share state, so a test keeps one copy for inspection after handing
//! the other to the runtime.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::detector::{
    DetectorError, TerminationTier, WorkerEventSender, WorkerHandle, WorkerLauncher,
};
use crate::overlay::{OverlayError, OverlayKind, OverlayRequest, SurfaceId, SurfaceProvider, WorkArea};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Default)]
struct SurfaceLog {
    next_id: u64,
    work_area: WorkArea,
    open: BTreeMap<u64, OverlayRequest>,
    shown: Vec<OverlayRequest>,
    closes: usize,
    preview: Option<u64>,
    preview_frames: usize,
    fail_next_show: bool,
}

/// Surface provider that records every request.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurfaceProvider {
    inner: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurfaceProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_work_area(area: WorkArea) -> Self {
        let this = Self::default();
        lock(&this.inner).work_area = area;
        this
    }

    /// Overlay surfaces currently open (the preview is not counted).
    #[must_use]
    pub fn open_count(&self) -> usize {
        lock(&self.inner).open.len()
    }

    #[must_use]
    pub fn open_kinds(&self) -> Vec<OverlayKind> {
        lock(&self.inner).open.values().map(|r| r.kind).collect()
    }

    /// Every overlay request that was shown, oldest first.
    #[must_use]
    pub fn shown(&self) -> Vec<OverlayRequest> {
        lock(&self.inner).shown.clone()
    }

    #[must_use]
    pub fn shown_kinds(&self) -> Vec<OverlayKind> {
        lock(&self.inner).shown.iter().map(|r| r.kind).collect()
    }

    /// Number of times a surface of `kind` was shown.
    #[must_use]
    pub fn shown_count(&self, kind: OverlayKind) -> usize {
        lock(&self.inner)
            .shown
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    /// Total close calls, including the preview.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        lock(&self.inner).closes
    }

    #[must_use]
    pub fn preview_open(&self) -> bool {
        lock(&self.inner).preview.is_some()
    }

    #[must_use]
    pub fn preview_frames(&self) -> usize {
        lock(&self.inner).preview_frames
    }

    /// Make the next `show` call fail.
    pub fn fail_next_show(&self) {
        lock(&self.inner).fail_next_show = true;
    }
}

impl SurfaceProvider for RecordingSurfaceProvider {
    fn work_area(&self) -> WorkArea {
        lock(&self.inner).work_area
    }

    fn create(&mut self, request: &OverlayRequest) -> Result<SurfaceId, OverlayError> {
        let mut log = lock(&self.inner);
        log.next_id += 1;
        let id = log.next_id;
        log.open.insert(id, request.clone());
        Ok(SurfaceId(id))
    }

    fn show(&mut self, id: SurfaceId) -> Result<(), OverlayError> {
        let mut log = lock(&self.inner);
        if log.fail_next_show {
            log.fail_next_show = false;
            return Err(OverlayError::ShowFailed {
                id,
                reason: "injected failure".into(),
            });
        }
        if let Some(request) = log.open.get(&id.0).cloned() {
            log.shown.push(request);
        }
        Ok(())
    }

    fn close(&mut self, id: SurfaceId) {
        let mut log = lock(&self.inner);
        log.closes += 1;
        if log.preview == Some(id.0) {
            log.preview = None;
        } else {
            log.open.remove(&id.0);
        }
    }

    fn open_preview(&mut self) -> Result<SurfaceId, OverlayError> {
        let mut log = lock(&self.inner);
        log.next_id += 1;
        let id = log.next_id;
        log.preview = Some(id);
        Ok(SurfaceId(id))
    }

    fn forward_preview(&mut self, id: SurfaceId, _payload: &serde_json::Value) {
        let mut log = lock(&self.inner);
        if log.preview == Some(id.0) {
            log.preview_frames += 1;
        }
    }
}

#[derive(Debug, Default)]
struct WorkerLog {
    launches: u32,
    terminations: u32,
    sweeps: u32,
    sent: Vec<(u64, String)>,
    fail_launches: bool,
    terminate_delay: Duration,
}

/// Worker launcher that records launches and stdin lines instead of
/// spawning processes. Worker output is injected as
/// [`crate::detector::WorkerEvent`]s by the test.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    inner: Arc<Mutex<WorkerLog>>,
}

impl FakeLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every launch fail (or succeed again).
    pub fn fail_launches(&self, fail: bool) {
        lock(&self.inner).fail_launches = fail;
    }

    /// Make every termination block the calling thread for `delay`, like a
    /// worker that ignores the cooperative signal.
    pub fn slow_terminate(&self, delay: Duration) {
        lock(&self.inner).terminate_delay = delay;
    }

    #[must_use]
    pub fn launches(&self) -> u32 {
        lock(&self.inner).launches
    }

    /// Handles terminated while still alive.
    #[must_use]
    pub fn terminations(&self) -> u32 {
        lock(&self.inner).terminations
    }

    #[must_use]
    pub fn sweeps(&self) -> u32 {
        lock(&self.inner).sweeps
    }

    /// Every line written to any worker, oldest first.
    #[must_use]
    pub fn sent_lines(&self) -> Vec<String> {
        lock(&self.inner)
            .sent
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Lines written to the worker of one generation.
    #[must_use]
    pub fn sent_to(&self, generation: u64) -> Vec<String> {
        lock(&self.inner)
            .sent
            .iter()
            .filter(|(g, _)| *g == generation)
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// How many lines containing `needle` were sent.
    #[must_use]
    pub fn sent_count(&self, needle: &str) -> usize {
        lock(&self.inner)
            .sent
            .iter()
            .filter(|(_, line)| line.contains(needle))
            .count()
    }
}

impl WorkerLauncher for FakeLauncher {
    fn launch(
        &mut self,
        generation: u64,
        _events: WorkerEventSender,
    ) -> Result<Box<dyn WorkerHandle>, DetectorError> {
        let mut log = lock(&self.inner);
        if log.fail_launches {
            return Err(DetectorError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "blink_detector not installed",
            )));
        }
        log.launches += 1;
        Ok(Box::new(FakeWorker {
            generation,
            alive: true,
            log: Arc::clone(&self.inner),
        }))
    }

    fn sweep(&mut self) -> usize {
        lock(&self.inner).sweeps += 1;
        0
    }
}

struct FakeWorker {
    generation: u64,
    alive: bool,
    log: Arc<Mutex<WorkerLog>>,
}

impl WorkerHandle for FakeWorker {
    fn pid(&self) -> Option<u32> {
        u32::try_from(self.generation).ok().map(|g| 40_000 + g)
    }

    fn send_line(&mut self, line: String) -> Result<(), DetectorError> {
        if !self.alive {
            return Err(DetectorError::ChannelClosed);
        }
        lock(&self.log).sent.push((self.generation, line));
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }

    fn exit_code(&mut self) -> Option<i32> {
        None
    }

    fn terminate(&mut self, _grace: Duration) -> TerminationTier {
        if !self.alive {
            return TerminationTier::AlreadyExited;
        }
        self.alive = false;
        let delay = lock(&self.log).terminate_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        lock(&self.log).terminations += 1;
        TerminationTier::Graceful
    }
}
