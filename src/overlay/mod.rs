//! Overlay surface manager.
//!
//! Single-flight per [`OverlaySlot`]: showing a new overlay in a slot first
//! closes the slot's current surface. Auto-close timers carry the
//! [`OverlayToken`] they were armed for, and a timer whose token is no longer
//! current is ignored.

mod error;
mod request;
mod surface;

pub use error::OverlayError;
pub use request::{
    EXERCISE_SIZE, Geometry, OverlayKind, OverlayRequest, OverlaySlot, POPUP_MARGIN, WorkArea,
};
pub use surface::{SurfaceId, SurfaceProvider};

use std::time::Instant;

use tracing::{debug, warn};

use crate::timers::{TimerHandle, TimerKind, TimerQueue};

/// Identifies one shown overlay for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayToken(u64);

impl std::fmt::Display for OverlayToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "overlay#{}", self.0)
    }
}

#[derive(Debug)]
struct LiveOverlay {
    token: OverlayToken,
    kind: OverlayKind,
    surface: SurfaceId,
    auto_close: Option<TimerHandle>,
}

/// Result of an auto-close timer that closed a current overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedOverlay {
    pub token: OverlayToken,
    pub kind: OverlayKind,
    pub slot: OverlaySlot,
}

/// Owns every overlay surface and the camera preview surface.
pub struct OverlayManager {
    provider: Box<dyn SurfaceProvider>,
    work_area: WorkArea,
    next_token: u64,
    reminder: Option<LiveOverlay>,
    exercise: Option<LiveOverlay>,
    preview: Option<SurfaceId>,
}

impl std::fmt::Debug for OverlayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayManager")
            .field("work_area", &self.work_area)
            .field("reminder", &self.reminder)
            .field("exercise", &self.exercise)
            .field("preview", &self.preview)
            .finish_non_exhaustive()
    }
}

impl OverlayManager {
    pub fn new(provider: Box<dyn SurfaceProvider>) -> Self {
        let work_area = provider.work_area();
        Self {
            provider,
            work_area,
            next_token: 0,
            reminder: None,
            exercise: None,
            preview: None,
        }
    }

    #[must_use]
    pub fn work_area(&self) -> WorkArea {
        self.work_area
    }

    /// Replace the work area used for subsequent requests.
    pub fn set_work_area(&mut self, area: WorkArea) {
        debug!(width = area.width, height = area.height, "work area updated");
        self.work_area = area;
    }

    /// Show `request` in its slot, retiring whatever the slot held.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the surface could not be created or
    /// shown. The slot is left empty in that case.
    pub fn show(
        &mut self,
        request: &OverlayRequest,
        timers: &mut TimerQueue,
        now: Instant,
    ) -> Result<OverlayToken, OverlayError> {
        let slot = request.kind.slot();
        self.close_slot(slot, timers);

        let surface = self.provider.create(request)?;
        if let Err(e) = self.provider.show(surface) {
            self.provider.close(surface);
            return Err(e);
        }

        self.next_token += 1;
        let token = OverlayToken(self.next_token);
        let auto_close = request
            .auto_close
            .map(|after| timers.schedule(now + after, TimerKind::OverlayAutoClose { token }));
        debug!(%token, kind = %request.kind, %surface, "overlay shown");
        *self.slot_mut(slot) = Some(LiveOverlay {
            token,
            kind: request.kind,
            surface,
            auto_close,
        });
        Ok(token)
    }

    /// Close whatever the slot holds. Returns the retired token.
    pub fn close_slot(&mut self, slot: OverlaySlot, timers: &mut TimerQueue) -> Option<OverlayToken> {
        let mut live = self.slot_mut(slot).take()?;
        timers.cancel_slot(&mut live.auto_close);
        self.provider.close(live.surface);
        debug!(token = %live.token, kind = %live.kind, "overlay closed");
        Some(live.token)
    }

    /// Close the overlay identified by `token` if it is still current.
    pub fn close_token(&mut self, token: OverlayToken, timers: &mut TimerQueue) -> bool {
        match self.slot_of(token) {
            Some(slot) => self.close_slot(slot, timers).is_some(),
            None => false,
        }
    }

    /// Handle a fired auto-close timer.
    ///
    /// The timer has already left the queue. Returns `None` when the token
    /// is stale (the overlay was replaced or closed meanwhile).
    pub fn on_auto_close(&mut self, token: OverlayToken) -> Option<ClosedOverlay> {
        let Some(slot) = self.slot_of(token) else {
            debug!(%token, "stale auto-close ignored");
            return None;
        };
        let live = self.slot_mut(slot).take()?;
        self.provider.close(live.surface);
        debug!(%token, kind = %live.kind, "overlay auto-closed");
        Some(ClosedOverlay {
            token,
            kind: live.kind,
            slot,
        })
    }

    /// Close every overlay in every slot.
    pub fn close_all(&mut self, timers: &mut TimerQueue) {
        self.close_slot(OverlaySlot::Reminder, timers);
        self.close_slot(OverlaySlot::Exercise, timers);
    }

    #[must_use]
    pub fn current(&self, slot: OverlaySlot) -> Option<OverlayToken> {
        self.slot_ref(slot).as_ref().map(|l| l.token)
    }

    #[must_use]
    pub fn current_kind(&self, slot: OverlaySlot) -> Option<OverlayKind> {
        self.slot_ref(slot).as_ref().map(|l| l.kind)
    }

    #[must_use]
    pub fn is_current(&self, token: OverlayToken) -> bool {
        self.slot_of(token).is_some()
    }

    /// Open the camera preview. Returns `Ok(false)` if it is already open.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the preview could not be opened.
    pub fn open_preview(&mut self) -> Result<bool, OverlayError> {
        if self.preview.is_some() {
            return Ok(false);
        }
        let id = self.provider.open_preview()?;
        debug!(surface = %id, "camera preview opened");
        self.preview = Some(id);
        Ok(true)
    }

    /// Forward a preview payload if the preview is open.
    pub fn forward_preview(&mut self, payload: &serde_json::Value) {
        if let Some(id) = self.preview {
            self.provider.forward_preview(id, payload);
        }
    }

    /// Close the camera preview. Returns `true` if it was open.
    pub fn close_preview(&mut self) -> bool {
        match self.preview.take() {
            Some(id) => {
                self.provider.close(id);
                debug!(surface = %id, "camera preview closed");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn preview_open(&self) -> bool {
        self.preview.is_some()
    }

    /// Show an overlay, logging instead of propagating provider failures.
    pub fn show_or_warn(
        &mut self,
        request: &OverlayRequest,
        timers: &mut TimerQueue,
        now: Instant,
    ) -> Option<OverlayToken> {
        match self.show(request, timers, now) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(kind = %request.kind, "overlay not shown: {e}");
                None
            }
        }
    }

    fn slot_of(&self, token: OverlayToken) -> Option<OverlaySlot> {
        [OverlaySlot::Reminder, OverlaySlot::Exercise]
            .into_iter()
            .find(|slot| self.current(*slot) == Some(token))
    }

    fn slot_ref(&self, slot: OverlaySlot) -> &Option<LiveOverlay> {
        match slot {
            OverlaySlot::Reminder => &self.reminder,
            OverlaySlot::Exercise => &self.exercise,
        }
    }

    fn slot_mut(&mut self, slot: OverlaySlot) -> &mut Option<LiveOverlay> {
        match slot {
            OverlaySlot::Reminder => &mut self.reminder,
            OverlaySlot::Exercise => &mut self.exercise,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::PopupConfig;
    use crate::test_utils::RecordingSurfaceProvider;
    use std::time::Duration;

    fn request(kind: OverlayKind, auto_close_ms: Option<u64>) -> OverlayRequest {
        OverlayRequest::popup(
            kind,
            &PopupConfig::default(),
            WorkArea::default(),
            "Blink!",
            auto_close_ms.map(Duration::from_millis),
        )
    }

    fn manager() -> (OverlayManager, RecordingSurfaceProvider, TimerQueue) {
        let provider = RecordingSurfaceProvider::new();
        let manager = OverlayManager::new(Box::new(provider.clone()));
        (manager, provider, TimerQueue::new())
    }

    #[test]
    fn show_replaces_slot_occupant() {
        let (mut overlays, provider, mut timers) = manager();
        let now = Instant::now();
        let first = overlays
            .show(&request(OverlayKind::Starting, Some(3_000)), &mut timers, now)
            .unwrap();
        let second = overlays
            .show(&request(OverlayKind::Blink, Some(2_500)), &mut timers, now)
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(provider.open_count(), 1);
        assert_eq!(
            overlays.current_kind(OverlaySlot::Reminder),
            Some(OverlayKind::Blink)
        );
        // First overlay's auto-close was cancelled with it.
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn stale_auto_close_is_ignored() {
        let (mut overlays, provider, mut timers) = manager();
        let now = Instant::now();
        let first = overlays
            .show(&request(OverlayKind::Blink, Some(2_500)), &mut timers, now)
            .unwrap();
        overlays.close_slot(OverlaySlot::Reminder, &mut timers);
        let second = overlays
            .show(&request(OverlayKind::Blink, None), &mut timers, now)
            .unwrap();

        assert!(overlays.on_auto_close(first).is_none());
        assert!(overlays.is_current(second));
        assert_eq!(provider.open_count(), 1);
    }

    #[test]
    fn auto_close_reports_closed_overlay() {
        let (mut overlays, provider, mut timers) = manager();
        let now = Instant::now();
        let token = overlays
            .show(&request(OverlayKind::Blink, Some(2_500)), &mut timers, now)
            .unwrap();
        let (_, kind) = timers.pop_due(now + Duration::from_millis(2_500)).unwrap();
        assert_eq!(kind, TimerKind::OverlayAutoClose { token });

        let closed = overlays.on_auto_close(token).unwrap();
        assert_eq!(closed.kind, OverlayKind::Blink);
        assert_eq!(closed.slot, OverlaySlot::Reminder);
        assert_eq!(provider.open_count(), 0);
    }

    #[test]
    fn slots_coexist() {
        let (mut overlays, provider, mut timers) = manager();
        let now = Instant::now();
        overlays
            .show(&request(OverlayKind::Blink, None), &mut timers, now)
            .unwrap();
        let ex = OverlayRequest::exercise(
            &PopupConfig::default(),
            WorkArea::default(),
            "Roll your eyes",
            Duration::from_secs(30),
        );
        overlays.show(&ex, &mut timers, now).unwrap();
        assert_eq!(provider.open_count(), 2);

        overlays.close_all(&mut timers);
        assert_eq!(provider.open_count(), 0);
        assert!(timers.is_empty());
    }

    #[test]
    fn failed_show_leaves_slot_empty() {
        let (mut overlays, provider, mut timers) = manager();
        provider.fail_next_show();
        let result = overlays.show(&request(OverlayKind::Blink, Some(100)), &mut timers, Instant::now());
        assert!(result.is_err());
        assert!(overlays.current(OverlaySlot::Reminder).is_none());
        assert_eq!(provider.open_count(), 0);
        assert!(timers.is_empty());
    }

    #[test]
    fn close_token_only_closes_current() {
        let (mut overlays, _provider, mut timers) = manager();
        let now = Instant::now();
        let old = overlays
            .show(&request(OverlayKind::Blink, None), &mut timers, now)
            .unwrap();
        let new = overlays
            .show(&request(OverlayKind::Stopped, None), &mut timers, now)
            .unwrap();
        assert!(!overlays.close_token(old, &mut timers));
        assert!(overlays.close_token(new, &mut timers));
    }

    #[test]
    fn preview_open_and_close() {
        let (mut overlays, provider, _timers) = manager();
        assert!(overlays.open_preview().unwrap());
        assert!(!overlays.open_preview().unwrap());
        overlays.forward_preview(&serde_json::json!({"faceData": [1, 2]}));
        assert_eq!(provider.preview_frames(), 1);
        assert!(overlays.close_preview());
        assert!(!overlays.close_preview());
    }
}
