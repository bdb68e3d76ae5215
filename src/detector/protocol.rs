//! Worker line protocol.
//!
//! One JSON object per line in both directions.
//!
//! ```text
//! core → worker   {"start_camera":true} {"stop_camera":true}
//!                 {"ear_threshold":0.25} {"frame_skip":2}
//! worker → core   {"blink":true,"ear":0.19,"time":1712.4}
//!                 {"status":"Camera opened successfully"}
//!                 {"error":"Failed to open camera"}
//!                 {"faceData":{...}} {"videoStream":"..."}
//! ```

use serde_json::{Value, json};

use super::error::DetectorError;

/// A command written to the worker's stdin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkerCommand {
    StartCamera,
    StopCamera,
    EarThreshold(f32),
    FrameSkip(u32),
}

impl WorkerCommand {
    /// Serialize to a newline-terminated JSON line.
    #[must_use]
    pub fn to_line(self) -> String {
        let value = match self {
            Self::StartCamera => json!({ "start_camera": true }),
            Self::StopCamera => json!({ "stop_camera": true }),
            Self::EarThreshold(v) => json!({ "ear_threshold": wire_threshold(v) }),
            Self::FrameSkip(n) => json!({ "frame_skip": n }),
        };
        let mut line = value.to_string();
        line.push('\n');
        line
    }
}

/// Widen to `f64` at millesimal precision so `0.3` goes out as `0.3`, not
/// as the nearest `f32` expanded to seventeen digits.
fn wire_threshold(v: f32) -> f64 {
    (f64::from(v) * 1000.0).round() / 1000.0
}

/// Readiness milestones the worker reports as free-form status strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Face models loaded; the worker accepts camera commands.
    ModelsReady,
    /// The camera is streaming frames.
    CameraOpened,
    /// Any other progress message.
    Other(String),
}

impl WorkerStatus {
    /// Classify a status string by its milestone phrase.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower.contains("models ready")
            || lower.contains("model ready")
            || lower.contains("models loaded")
        {
            Self::ModelsReady
        } else if lower.contains("camera opened") {
            Self::CameraOpened
        } else {
            Self::Other(raw.to_owned())
        }
    }
}

/// A parsed line from the worker's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// A blink was detected.
    Blink { ear: Option<f64> },
    Status(WorkerStatus),
    /// Camera or model failure reported by the worker.
    Error(String),
    /// Preview payloads, forwarded verbatim to the preview surface.
    FaceData(Value),
    VideoStream(Value),
}

impl WorkerMessage {
    /// Parse one complete line.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::ProtocolError`] for blank lines, non-object
    /// JSON, and objects carrying none of the known keys, and
    /// [`DetectorError::Json`] for malformed JSON.
    pub fn parse(line: &str) -> Result<Self, DetectorError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(DetectorError::ProtocolError {
                message: "empty line".to_owned(),
            });
        }
        let value: Value = serde_json::from_str(trimmed)?;
        let Value::Object(mut map) = value else {
            return Err(DetectorError::ProtocolError {
                message: format!("expected JSON object, got: {trimmed}"),
            });
        };

        if let Some(err) = map.get("error") {
            return Ok(Self::Error(value_text(err)));
        }
        if map.get("blink").and_then(Value::as_bool) == Some(true) {
            let ear = map.get("ear").and_then(Value::as_f64);
            return Ok(Self::Blink { ear });
        }
        if let Some(status) = map.get("status") {
            return Ok(Self::Status(WorkerStatus::classify(&value_text(status))));
        }
        if let Some(face) = map.remove("faceData") {
            return Ok(Self::FaceData(face));
        }
        if let Some(frame) = map.remove("videoStream") {
            return Ok(Self::VideoStream(frame));
        }
        Err(DetectorError::ProtocolError {
            message: format!("unrecognized worker message: {trimmed}"),
        })
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reassembles newline-delimited lines from arbitrary byte chunks.
///
/// Line length is unbounded; a partial line is held until its newline
/// arrives or [`LineBuffer::finish`] is called at end of stream.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            lines.push(take_line(&mut self.pending));
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// Bytes held waiting for a newline.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush the unterminated remainder at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        Some(take_line(&mut self.pending))
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    line
}
