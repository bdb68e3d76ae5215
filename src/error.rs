//! Error types for the dryeye core.

use crate::detector::DetectorError;
use crate::overlay::OverlayError;

/// Top-level error type for the reminder core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Preference loading, parsing or persistence error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Detection worker supervision error.
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),

    /// Overlay surface error.
    #[error("overlay error: {0}")]
    Overlay(#[from] OverlayError),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CoreError>;
