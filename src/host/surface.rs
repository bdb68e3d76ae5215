//! Surface provider that delegates rendering to the host shell.
//!
//! Every create/show/close becomes an `overlay.*` event on the outbound
//! stream; the shell owns the actual windows.

use serde_json::json;
use tokio::sync::broadcast;

use crate::host::contract::EventEnvelope;
use crate::overlay::{OverlayError, OverlayRequest, SurfaceId, SurfaceProvider, WorkArea};

/// Forwards overlay lifecycle to the host as events.
pub struct HostSurfaceProvider {
    events: broadcast::Sender<EventEnvelope>,
    work_area: WorkArea,
    next_id: u64,
    pending: Vec<(SurfaceId, OverlayRequest)>,
}

impl HostSurfaceProvider {
    #[must_use]
    pub fn new(events: broadcast::Sender<EventEnvelope>, work_area: WorkArea) -> Self {
        Self {
            events,
            work_area,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    fn allocate(&mut self) -> SurfaceId {
        self.next_id += 1;
        SurfaceId(self.next_id)
    }

    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<(), String> {
        self.events
            .send(EventEnvelope::fresh(event, payload))
            .map(|_| ())
            .map_err(|_| "no host listening".to_owned())
    }
}

impl SurfaceProvider for HostSurfaceProvider {
    fn work_area(&self) -> WorkArea {
        self.work_area
    }

    fn create(&mut self, request: &OverlayRequest) -> Result<SurfaceId, OverlayError> {
        let id = self.allocate();
        self.pending.push((id, request.clone()));
        Ok(id)
    }

    fn show(&mut self, id: SurfaceId) -> Result<(), OverlayError> {
        let Some(index) = self.pending.iter().position(|(pending, _)| *pending == id) else {
            return Err(OverlayError::ShowFailed {
                id,
                reason: "surface was never created".to_owned(),
            });
        };
        let (_, request) = self.pending.swap_remove(index);
        self.emit("overlay.show", json!({ "surface": id, "request": request }))
            .map_err(|reason| OverlayError::ShowFailed { id, reason })
    }

    fn close(&mut self, id: SurfaceId) {
        self.pending.retain(|(pending, _)| *pending != id);
        let _ = self.emit("overlay.close", json!({ "surface": id }));
    }

    fn open_preview(&mut self) -> Result<SurfaceId, OverlayError> {
        let id = self.allocate();
        self.emit("preview.open", json!({ "surface": id }))
            .map_err(|reason| OverlayError::CreateFailed { reason })?;
        Ok(id)
    }

    fn forward_preview(&mut self, id: SurfaceId, payload: &serde_json::Value) {
        let _ = self.emit("preview.frame", json!({ "surface": id, "data": payload }));
    }
}
