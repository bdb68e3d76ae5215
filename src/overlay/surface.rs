//! Surface provider seam.
//!
//! The core never talks to a UI toolkit directly. A [`SurfaceProvider`]
//! creates borderless, always-on-top, non-focusable regions on request.

use serde::{Deserialize, Serialize};

use super::error::OverlayError;
use super::request::{OverlayRequest, WorkArea};

/// Identifier of a provider-owned surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Creates, shows and closes overlay surfaces.
pub trait SurfaceProvider: Send {
    /// Usable display area for geometry resolution.
    fn work_area(&self) -> WorkArea;

    /// Create (but do not show) a surface for `request`.
    fn create(&mut self, request: &OverlayRequest) -> Result<SurfaceId, OverlayError>;

    fn show(&mut self, id: SurfaceId) -> Result<(), OverlayError>;

    /// Close and release a surface. Closing an unknown id is a no-op.
    fn close(&mut self, id: SurfaceId);

    /// Open the camera preview surface.
    fn open_preview(&mut self) -> Result<SurfaceId, OverlayError> {
        Err(OverlayError::Unsupported("camera preview"))
    }

    /// Forward one preview payload (face landmarks or a video frame).
    fn forward_preview(&mut self, _id: SurfaceId, _payload: &serde_json::Value) {}
}
