//! Error types for detection worker supervision.

use super::supervisor::WorkerPhase;

/// Errors that can occur while supervising the blink detection worker.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// Failed to spawn the worker subprocess.
    #[error("failed to spawn detector worker: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// No worker executable could be located.
    #[error("detector worker not found (searched: {searched})")]
    WorkerNotFound {
        /// Locations that were tried, comma separated.
        searched: String,
    },

    /// Command rejected because the worker has not reported readiness.
    #[error("detector worker not ready (phase: {phase})")]
    NotReady {
        /// Phase the worker was in when the command was rejected.
        phase: WorkerPhase,
    },

    /// Line protocol violation.
    #[error("protocol error: {message}")]
    ProtocolError {
        /// Description of the violation.
        message: String,
    },

    /// Worker process exited.
    #[error("detector worker exited (exit code: {exit_code:?})")]
    ProcessExited {
        /// The exit code, if available.
        exit_code: Option<i32>,
    },

    /// Retry budget used up.
    #[error("camera unavailable after {attempts} attempts")]
    RetriesExhausted {
        /// How many consecutive failures were observed.
        attempts: u32,
    },

    /// The worker's stdin queue is gone.
    #[error("detector worker input channel closed")]
    ChannelClosed,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[source] serde_json::Error),
}

impl From<serde_json::Error> for DetectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn display_spawn_failed() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = DetectorError::SpawnFailed(io_err);
        assert!(err.to_string().contains("failed to spawn detector worker"));
    }

    #[test]
    fn display_not_ready_names_phase() {
        let err = DetectorError::NotReady {
            phase: WorkerPhase::Launching,
        };
        assert_eq!(err.to_string(), "detector worker not ready (phase: launching)");
    }

    #[test]
    fn display_process_exited() {
        let err = DetectorError::ProcessExited { exit_code: Some(1) };
        assert!(err.to_string().contains("Some(1)"));
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DetectorError = json_err.into();
        assert!(matches!(err, DetectorError::Json(_)));
    }

    #[test]
    fn source_chain_preserved_for_spawn() {
        use std::error::Error;
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = DetectorError::SpawnFailed(io_err);
        assert!(err.source().is_some());
    }
}
