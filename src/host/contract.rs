//! Versioned host command/event envelopes for native shell integration.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{PopupColors, PopupPosition};
use crate::notify::Notification;
use crate::overlay::WorkArea;
use crate::power::PowerSignal;
use crate::runtime::{Command, CoreEvent};
use crate::shutdown::ExitTrigger;

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Command set accepted from the host shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "tracking.start")]
    TrackingStart,
    #[serde(rename = "tracking.stop")]
    TrackingStop,
    #[serde(rename = "reminder.interval.set")]
    ReminderIntervalSet,
    #[serde(rename = "camera.enabled.set")]
    CameraEnabledSet,
    #[serde(rename = "camera.mgd.set")]
    CameraMgdSet,
    #[serde(rename = "camera.sensitivity.set")]
    CameraSensitivitySet,
    #[serde(rename = "camera.frame_skip.set")]
    CameraFrameSkipSet,
    #[serde(rename = "popup.position.set")]
    PopupPositionSet,
    #[serde(rename = "popup.size.set")]
    PopupSizeSet,
    #[serde(rename = "popup.colors.set")]
    PopupColorsSet,
    #[serde(rename = "popup.message.set")]
    PopupMessageSet,
    #[serde(rename = "popup.editor.show")]
    PopupEditorShow,
    #[serde(rename = "popup.editor.save")]
    PopupEditorSave,
    #[serde(rename = "exercise.enabled.set")]
    ExerciseEnabledSet,
    #[serde(rename = "exercise.interval.set")]
    ExerciseIntervalSet,
    #[serde(rename = "exercise.skip")]
    ExerciseSkip,
    #[serde(rename = "exercise.snooze")]
    ExerciseSnooze,
    #[serde(rename = "preview.show")]
    PreviewShow,
    #[serde(rename = "preview.close")]
    PreviewClose,
    #[serde(rename = "ui.dark_mode.set")]
    UiDarkModeSet,
    #[serde(rename = "ui.shortcut.set")]
    UiShortcutSet,
    #[serde(rename = "display.work_area.set")]
    DisplayWorkAreaSet,
    #[serde(rename = "prefs.get")]
    PrefsGet,
    #[serde(rename = "prefs.reset")]
    PrefsReset,
    #[serde(rename = "power.suspend")]
    PowerSuspend,
    #[serde(rename = "power.resume")]
    PowerResume,
    #[serde(rename = "window.closed")]
    WindowClosed,
    #[serde(rename = "app.quit")]
    AppQuit,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::TrackingStart => "tracking.start",
            Self::TrackingStop => "tracking.stop",
            Self::ReminderIntervalSet => "reminder.interval.set",
            Self::CameraEnabledSet => "camera.enabled.set",
            Self::CameraMgdSet => "camera.mgd.set",
            Self::CameraSensitivitySet => "camera.sensitivity.set",
            Self::CameraFrameSkipSet => "camera.frame_skip.set",
            Self::PopupPositionSet => "popup.position.set",
            Self::PopupSizeSet => "popup.size.set",
            Self::PopupColorsSet => "popup.colors.set",
            Self::PopupMessageSet => "popup.message.set",
            Self::PopupEditorShow => "popup.editor.show",
            Self::PopupEditorSave => "popup.editor.save",
            Self::ExerciseEnabledSet => "exercise.enabled.set",
            Self::ExerciseIntervalSet => "exercise.interval.set",
            Self::ExerciseSkip => "exercise.skip",
            Self::ExerciseSnooze => "exercise.snooze",
            Self::PreviewShow => "preview.show",
            Self::PreviewClose => "preview.close",
            Self::UiDarkModeSet => "ui.dark_mode.set",
            Self::UiShortcutSet => "ui.shortcut.set",
            Self::DisplayWorkAreaSet => "display.work_area.set",
            Self::PrefsGet => "prefs.get",
            Self::PrefsReset => "prefs.reset",
            Self::PowerSuspend => "power.suspend",
            Self::PowerResume => "power.resume",
            Self::WindowClosed => "window.closed",
            Self::AppQuit => "app.quit",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(raw.to_owned())).ok()
    }

    /// `true` for commands answered by the bridge without touching the core.
    #[must_use]
    pub fn is_bridge_local(self) -> bool {
        matches!(self, Self::HostPing | Self::HostVersion)
    }
}

/// A versioned response envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from frontend -> backend host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
struct EnabledPayload {
    enabled: bool,
}

#[derive(Deserialize)]
struct IntervalPayload {
    ms: u64,
}

#[derive(Deserialize)]
struct SensitivityPayload {
    ear_threshold: f32,
}

#[derive(Deserialize)]
struct FrameSkipPayload {
    frames: u32,
}

#[derive(Deserialize)]
struct PositionPayload {
    position: PopupPosition,
}

#[derive(Deserialize)]
struct SizePayload {
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct MessagePayload {
    message: String,
}

#[derive(Deserialize)]
struct EditorSavePayload {
    x: i32,
    y: i32,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Deserialize)]
struct MinutesPayload {
    minutes: u32,
}

#[derive(Deserialize)]
struct ShortcutPayload {
    #[serde(default)]
    shortcut: Option<String>,
}

#[derive(Deserialize)]
struct WindowClosedPayload {
    #[serde(default = "default_last_window")]
    last_window: bool,
}

fn default_last_window() -> bool {
    true
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }

    fn payload<T: DeserializeOwned>(&self) -> Result<T, ContractError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            ContractError::new(
                ContractErrorKind::InvalidPayload,
                format!("invalid payload for {}: {e}", self.command.as_str()),
            )
        })
    }

    /// Translate into a core event. Bridge-local commands yield `None`.
    pub fn to_core_event(&self) -> Result<Option<CoreEvent>, ContractError> {
        let command = match self.command {
            CommandName::HostPing | CommandName::HostVersion => return Ok(None),
            CommandName::PowerSuspend => return Ok(Some(CoreEvent::Power(PowerSignal::Suspend))),
            CommandName::PowerResume => return Ok(Some(CoreEvent::Power(PowerSignal::Resume))),
            CommandName::WindowClosed => {
                let p: WindowClosedPayload = self.payload_or_default()?;
                return Ok(Some(CoreEvent::WindowClosed {
                    last_window: p.last_window,
                }));
            }
            CommandName::AppQuit => {
                return Ok(Some(CoreEvent::Shutdown(ExitTrigger::QuitRequested)));
            }
            CommandName::TrackingStart => Command::StartTracking,
            CommandName::TrackingStop => Command::StopTracking,
            CommandName::ReminderIntervalSet => {
                let p: IntervalPayload = self.payload()?;
                Command::SetInterval { ms: p.ms }
            }
            CommandName::CameraEnabledSet => {
                Command::SetCameraEnabled(self.payload::<EnabledPayload>()?.enabled)
            }
            CommandName::CameraMgdSet => {
                Command::SetMgdMode(self.payload::<EnabledPayload>()?.enabled)
            }
            CommandName::CameraSensitivitySet => {
                Command::SetSensitivity(self.payload::<SensitivityPayload>()?.ear_threshold)
            }
            CommandName::CameraFrameSkipSet => {
                Command::SetFrameSkip(self.payload::<FrameSkipPayload>()?.frames)
            }
            CommandName::PopupPositionSet => {
                Command::SetPopupPosition(self.payload::<PositionPayload>()?.position)
            }
            CommandName::PopupSizeSet => {
                let p: SizePayload = self.payload()?;
                Command::SetPopupSize {
                    width: p.width,
                    height: p.height,
                }
            }
            CommandName::PopupColorsSet => Command::SetPopupColors(self.payload::<PopupColors>()?),
            CommandName::PopupMessageSet => {
                Command::SetPopupMessage(self.payload::<MessagePayload>()?.message)
            }
            CommandName::PopupEditorShow => Command::ShowPopupEditor,
            CommandName::PopupEditorSave => {
                let p: EditorSavePayload = self.payload()?;
                Command::PopupEditorSaved {
                    x: p.x,
                    y: p.y,
                    width: p.width,
                    height: p.height,
                }
            }
            CommandName::ExerciseEnabledSet => {
                Command::SetExercisesEnabled(self.payload::<EnabledPayload>()?.enabled)
            }
            CommandName::ExerciseIntervalSet => {
                let p: MinutesPayload = self.payload()?;
                Command::SetExerciseInterval { minutes: p.minutes }
            }
            CommandName::ExerciseSkip => Command::SkipExercise,
            CommandName::ExerciseSnooze => Command::SnoozeExercise,
            CommandName::PreviewShow => Command::ShowCameraPreview,
            CommandName::PreviewClose => Command::CloseCameraPreview,
            CommandName::UiDarkModeSet => {
                Command::SetDarkMode(self.payload::<EnabledPayload>()?.enabled)
            }
            CommandName::UiShortcutSet => {
                Command::SetKeyboardShortcut(self.payload_or_default::<ShortcutPayload>()?.shortcut)
            }
            CommandName::DisplayWorkAreaSet => Command::SetWorkArea(self.payload::<WorkArea>()?),
            CommandName::PrefsGet => Command::RequestPreferences,
            CommandName::PrefsReset => Command::ResetPreferences,
        };
        Ok(Some(CoreEvent::Command(command)))
    }

    fn payload_or_default<T: DeserializeOwned>(&self) -> Result<T, ContractError> {
        if self.payload.is_null() {
            return serde_json::from_value(serde_json::json!({})).map_err(|e| {
                ContractError::new(ContractErrorKind::InvalidPayload, e.to_string())
            });
        }
        self.payload()
    }
}

/// A versioned event envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub emitted_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            emitted_at: Utc::now(),
            payload,
        }
    }

    /// Build an envelope with a fresh random id.
    #[must_use]
    pub fn fresh(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), event, payload)
    }

    /// Wrap a core notification.
    #[must_use]
    pub fn from_notification(notification: &Notification) -> Self {
        let payload = serde_json::to_value(notification).unwrap_or(serde_json::Value::Null);
        Self::fresh(notification.event_name(), payload)
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
    InvalidPayload,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn envelope(command: CommandName, payload: serde_json::Value) -> CommandEnvelope {
        CommandEnvelope::new("req-1", command, payload)
    }

    #[test]
    fn parses_wire_command_names() {
        let raw = r#"{"v":1,"request_id":"a","command":"camera.sensitivity.set","payload":{"ear_threshold":0.3}}"#;
        let env: CommandEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.command, CommandName::CameraSensitivitySet);
        assert_eq!(
            env.to_core_event().unwrap(),
            Some(CoreEvent::Command(Command::SetSensitivity(0.3)))
        );
    }

    #[test]
    fn command_names_round_trip_through_wire_strings() {
        for name in [
            CommandName::TrackingStart,
            CommandName::PopupEditorSave,
            CommandName::DisplayWorkAreaSet,
            CommandName::AppQuit,
        ] {
            assert_eq!(CommandName::parse(name.as_str()), Some(name));
        }
        assert_eq!(CommandName::parse("tracking.pause"), None);
    }

    #[test]
    fn payload_is_optional_on_the_wire() {
        let raw = r#"{"v":1,"request_id":"a","command":"tracking.start"}"#;
        let env: CommandEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(
            env.to_core_event().unwrap(),
            Some(CoreEvent::Command(Command::StartTracking))
        );
    }

    #[test]
    fn popup_position_accepts_presets_and_custom() {
        let preset = envelope(CommandName::PopupPositionSet, json!({"position": "bottom-left"}));
        assert_eq!(
            preset.to_core_event().unwrap(),
            Some(CoreEvent::Command(Command::SetPopupPosition(
                PopupPosition::BottomLeft
            )))
        );
        let custom = envelope(
            CommandName::PopupPositionSet,
            json!({"position": {"custom": {"x": 10, "y": 20}}}),
        );
        assert_eq!(
            custom.to_core_event().unwrap(),
            Some(CoreEvent::Command(Command::SetPopupPosition(
                PopupPosition::Custom { x: 10, y: 20 }
            )))
        );
    }

    #[test]
    fn bad_payload_is_rejected() {
        let env = envelope(CommandName::ReminderIntervalSet, json!({"seconds": 5}));
        let err = env.to_core_event().unwrap_err();
        assert_eq!(err.kind, ContractErrorKind::InvalidPayload);
        assert!(err.message.contains("reminder.interval.set"));
    }

    #[test]
    fn window_closed_defaults_to_last_window() {
        let env = envelope(CommandName::WindowClosed, serde_json::Value::Null);
        assert_eq!(
            env.to_core_event().unwrap(),
            Some(CoreEvent::WindowClosed { last_window: true })
        );
    }

    #[test]
    fn bridge_local_commands_skip_the_core() {
        assert!(CommandName::HostPing.is_bridge_local());
        assert_eq!(
            envelope(CommandName::HostVersion, json!({})).to_core_event().unwrap(),
            None
        );
    }

    #[test]
    fn validate_rejects_wrong_version_and_blank_id() {
        let mut env = envelope(CommandName::HostPing, json!({}));
        env.v = 2;
        assert_eq!(
            env.validate().unwrap_err().kind,
            ContractErrorKind::UnsupportedVersion
        );
        let env = CommandEnvelope::new("  ", CommandName::HostPing, json!({}));
        assert_eq!(env.validate().unwrap_err().kind, ContractErrorKind::InvalidEnvelope);
    }

    #[test]
    fn notifications_become_named_events() {
        let env = EventEnvelope::from_notification(&Notification::CameraError {
            message: "no camera".into(),
        });
        assert_eq!(env.event, "camera.error");
        assert_eq!(env.payload["message"], "no camera");
        assert_eq!(env.payload["kind"], "camera_error");
    }
}
