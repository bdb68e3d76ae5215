//! Preference types for the reminder core.
//!
//! Every section is `#[serde(default)]` so partially written or older
//! `config.toml` files still load; missing keys take the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lowest EAR threshold the worker accepts.
pub const MIN_EAR_THRESHOLD: f32 = 0.1;
/// Highest EAR threshold the worker accepts.
pub const MAX_EAR_THRESHOLD: f32 = 0.4;

/// Complete user preferences, owned by [`crate::prefs::PreferencesStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Blink reminder cadence and camera settings.
    pub reminder: ReminderConfig,
    /// Popup appearance and placement.
    pub popup: PopupConfig,
    /// Eye-exercise prompts.
    pub exercise: ExerciseConfig,
    /// Detection worker supervision.
    pub detector: DetectorConfig,
    /// Application exit behaviour.
    pub shutdown: ShutdownConfig,
    /// Flags stored for the settings UI; the core does not interpret them.
    pub ui: UiConfig,
}

/// Blink reminder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Reminder interval in milliseconds.
    pub interval_ms: u64,
    /// Gate reminders on camera blink detection.
    pub camera_enabled: bool,
    /// Meibomian-gland-dysfunction mode: remind on a fixed cadence even while
    /// the camera is tracking blinks.
    pub mgd_mode: bool,
    /// Eye-aspect-ratio threshold forwarded to the worker.
    pub ear_threshold: f32,
    /// Process every Nth camera frame.
    pub frame_skip: u32,
    /// Quiet period before a sensitivity change is forwarded to the worker.
    pub sensitivity_debounce_ms: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            camera_enabled: false,
            mgd_mode: false,
            ear_threshold: 0.25,
            frame_skip: 1,
            sensitivity_debounce_ms: 500,
        }
    }
}

impl ReminderConfig {
    /// Reminder interval, never shorter than one millisecond.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// EAR threshold clamped to the range the worker accepts.
    #[must_use]
    pub fn clamped_ear_threshold(&self) -> f32 {
        clamp_ear_threshold(self.ear_threshold)
    }

    /// Frame skip, at least one.
    #[must_use]
    pub fn clamped_frame_skip(&self) -> u32 {
        self.frame_skip.max(1)
    }

    /// Sensitivity debounce window.
    #[must_use]
    pub fn sensitivity_debounce(&self) -> Duration {
        Duration::from_millis(self.sensitivity_debounce_ms)
    }
}

/// Clamp an EAR threshold into `[MIN_EAR_THRESHOLD, MAX_EAR_THRESHOLD]`.
///
/// NaN maps to the default threshold.
#[must_use]
pub fn clamp_ear_threshold(value: f32) -> f32 {
    if value.is_nan() {
        return ReminderConfig::default().ear_threshold;
    }
    value.clamp(MIN_EAR_THRESHOLD, MAX_EAR_THRESHOLD)
}

/// Where the blink popup appears on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PopupPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
    /// Absolute position saved from the popup editor.
    Custom { x: i32, y: i32 },
}

impl PopupPosition {
    /// Parse a preset name as sent by the settings UI.
    #[must_use]
    pub fn parse_preset(raw: &str) -> Option<Self> {
        match raw {
            "top-left" => Some(Self::TopLeft),
            "top-right" => Some(Self::TopRight),
            "bottom-left" => Some(Self::BottomLeft),
            "bottom-right" => Some(Self::BottomRight),
            _ => None,
        }
    }
}

/// Popup colour scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupColors {
    /// Background colour as `#RRGGBB`.
    pub background: String,
    /// Text colour as `#RRGGBB`.
    pub text: String,
    /// Background opacity in `[0.0, 1.0]`.
    pub opacity: f32,
    /// Render with a transparent window background.
    pub transparent: bool,
}

impl Default for PopupColors {
    fn default() -> Self {
        Self {
            background: "#1E1E1E".to_owned(),
            text: "#FFFFFF".to_owned(),
            opacity: 0.5,
            transparent: true,
        }
    }
}

/// Popup appearance configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupConfig {
    pub position: PopupPosition,
    /// Width in logical pixels.
    pub width: u32,
    /// Height in logical pixels.
    pub height: u32,
    pub colors: PopupColors,
    /// Text shown in the blink popup.
    pub message: String,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            position: PopupPosition::default(),
            width: 220,
            height: 80,
            colors: PopupColors::default(),
            message: "Blink!".to_owned(),
        }
    }
}

/// Eye-exercise prompt configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExerciseConfig {
    /// Whether exercise prompts are scheduled at all.
    pub enabled: bool,
    /// Minutes between prompts.
    pub interval_minutes: u32,
    /// Minutes a snoozed prompt is deferred.
    pub snooze_minutes: u32,
    /// Seconds an exercise prompt stays on screen.
    pub display_secs: u32,
}

impl Default for ExerciseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 20,
            snooze_minutes: 5,
            display_secs: 30,
        }
    }
}

impl ExerciseConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes.max(1)) * 60)
    }

    #[must_use]
    pub fn snooze(&self) -> Duration {
        Duration::from_secs(u64::from(self.snooze_minutes.max(1)) * 60)
    }

    #[must_use]
    pub fn display(&self) -> Duration {
        Duration::from_secs(u64::from(self.display_secs.max(1)))
    }
}

/// Detection worker supervision configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Explicit path to the worker executable (None = search).
    pub worker_path: Option<PathBuf>,
    /// Extra arguments passed to the worker.
    pub worker_args: Vec<String>,
    /// Consecutive camera failures tolerated before giving up.
    pub max_retries: u32,
    /// Fixed delay between retries in milliseconds.
    pub retry_delay_ms: u64,
    /// How long a freshly launched worker may take to report readiness.
    pub ready_timeout_secs: u64,
    /// Grace period per termination tier in milliseconds.
    pub kill_grace_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            worker_path: None,
            worker_args: Vec::new(),
            max_retries: 3,
            retry_delay_ms: 2_000,
            ready_timeout_secs: 30,
            kill_grace_ms: 500,
        }
    }
}

impl DetectorConfig {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Application exit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound on the whole drain before the process is force-exited.
    pub drain_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 5_000,
        }
    }
}

impl ShutdownConfig {
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Settings-UI flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub dark_mode: bool,
    /// Global shortcut accelerator string, e.g. `CommandOrControl+Shift+B`.
    pub keyboard_shortcut: Option<String>,
}

impl Preferences {
    /// Load preferences from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }

    /// Save preferences to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialization fails.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default preferences path: `<config_dir>/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn defaults_match_shipping_values() {
        let prefs = Preferences::default();
        assert_eq!(prefs.reminder.interval(), Duration::from_millis(5_000));
        assert!(!prefs.reminder.camera_enabled);
        assert_eq!(prefs.popup.position, PopupPosition::TopRight);
        assert_eq!(prefs.popup.width, 220);
        assert_eq!(prefs.popup.height, 80);
        assert_eq!(prefs.popup.colors.background, "#1E1E1E");
        assert_eq!(prefs.detector.max_retries, 3);
        assert_eq!(prefs.detector.retry_delay(), Duration::from_secs(2));
        assert_eq!(prefs.shutdown.drain_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_interval_clamps_to_one_millisecond() {
        let cfg = ReminderConfig {
            interval_ms: 0,
            ..ReminderConfig::default()
        };
        assert_eq!(cfg.interval(), Duration::from_millis(1));
    }

    #[test]
    fn ear_threshold_is_clamped() {
        assert_eq!(clamp_ear_threshold(0.05), MIN_EAR_THRESHOLD);
        assert_eq!(clamp_ear_threshold(0.9), MAX_EAR_THRESHOLD);
        assert_eq!(clamp_ear_threshold(0.3), 0.3);
        assert_eq!(clamp_ear_threshold(f32::NAN), 0.25);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let prefs: Preferences = toml::from_str(
            r#"
            [reminder]
            interval_ms = 8000
            camera_enabled = true

            [popup]
            position = "bottom-left"
            "#,
        )
        .unwrap();
        assert_eq!(prefs.reminder.interval_ms, 8_000);
        assert!(prefs.reminder.camera_enabled);
        assert_eq!(prefs.reminder.frame_skip, 1);
        assert_eq!(prefs.popup.position, PopupPosition::BottomLeft);
        assert_eq!(prefs.popup.width, 220);
    }

    #[test]
    fn custom_position_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut prefs = Preferences::default();
        prefs.popup.position = PopupPosition::Custom { x: 12, y: -40 };
        prefs.ui.keyboard_shortcut = Some("CommandOrControl+Shift+B".into());

        prefs.save_to_file(&path).unwrap();
        let loaded = Preferences::from_file(&path).unwrap();
        assert_eq!(loaded, prefs);
    }

    #[test]
    fn from_file_invalid_toml_returns_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        let err = Preferences::from_file(&path).unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Config(_)));
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = Preferences::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = Preferences::default_config_path();
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn preset_names_parse() {
        assert_eq!(
            PopupPosition::parse_preset("top-left"),
            Some(PopupPosition::TopLeft)
        );
        assert_eq!(PopupPosition::parse_preset("middle"), None);
    }
}
