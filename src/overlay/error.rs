//! Overlay surface errors.

use super::surface::SurfaceId;

/// Errors reported by a [`super::SurfaceProvider`].
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// The provider could not create a surface.
    #[error("failed to create overlay surface: {reason}")]
    CreateFailed { reason: String },

    /// The provider created the surface but could not show it.
    #[error("failed to show {id}: {reason}")]
    ShowFailed { id: SurfaceId, reason: String },

    /// The provider does not implement this surface type.
    #[error("surface provider does not support {0}")]
    Unsupported(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_failed_names_surface() {
        let err = OverlayError::ShowFailed {
            id: SurfaceId(7),
            reason: "display gone".into(),
        };
        assert_eq!(err.to_string(), "failed to show surface#7: display gone");
    }

    #[test]
    fn unsupported_display() {
        assert_eq!(
            OverlayError::Unsupported("camera preview").to_string(),
            "surface provider does not support camera preview"
        );
    }
}
