//! Overlay render intents and geometry resolution.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{PopupColors, PopupConfig, PopupPosition};

/// Distance between a preset popup and the work-area edge, in logical pixels.
pub const POPUP_MARGIN: i32 = 40;

/// Size of the exercise prompt surface.
pub const EXERCISE_SIZE: (u32, u32) = (360, 160);

/// What an overlay shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    /// Camera is warming up.
    Starting,
    /// Blink reminder.
    Blink,
    /// Tracking was stopped.
    Stopped,
    /// Eye-exercise prompt.
    Exercise,
    /// Draggable popup used to pick a custom position.
    Editor,
}

impl OverlayKind {
    /// Slot this kind occupies. Reminder kinds share one slot.
    #[must_use]
    pub fn slot(self) -> OverlaySlot {
        match self {
            Self::Exercise => OverlaySlot::Exercise,
            Self::Starting | Self::Blink | Self::Stopped | Self::Editor => OverlaySlot::Reminder,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Blink => "blink",
            Self::Stopped => "stopped",
            Self::Exercise => "exercise",
            Self::Editor => "editor",
        }
    }
}

impl std::fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independent overlay slots. Each holds at most one live surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlaySlot {
    Reminder,
    Exercise,
}

/// Usable display area reported by the surface provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkArea {
    pub width: u32,
    pub height: u32,
}

impl Default for WorkArea {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Absolute placement of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    /// Resolve a popup position against the work area.
    #[must_use]
    pub fn resolve(position: PopupPosition, width: u32, height: u32, area: WorkArea) -> Self {
        let right = to_i32(area.width) - to_i32(width) - POPUP_MARGIN;
        let bottom = to_i32(area.height) - to_i32(height) - POPUP_MARGIN;
        let (x, y) = match position {
            PopupPosition::TopLeft => (POPUP_MARGIN, POPUP_MARGIN),
            PopupPosition::TopRight => (right, POPUP_MARGIN),
            PopupPosition::BottomLeft => (POPUP_MARGIN, bottom),
            PopupPosition::BottomRight => (right, bottom),
            PopupPosition::Custom { x, y } => (x, y),
        };
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center a surface of the given size in the work area.
    #[must_use]
    pub fn centered(width: u32, height: u32, area: WorkArea) -> Self {
        Self {
            x: (to_i32(area.width) - to_i32(width)) / 2,
            y: (to_i32(area.height) - to_i32(height)) / 2,
            width,
            height,
        }
    }
}

fn to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// A render intent. Built from current preferences on every show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayRequest {
    pub kind: OverlayKind,
    pub geometry: Geometry,
    pub colors: PopupColors,
    pub message: String,
    /// Close automatically after this long. `None` leaves the lifetime to
    /// an explicit close.
    #[serde(skip)]
    pub auto_close: Option<Duration>,
}

impl OverlayRequest {
    /// Request a popup-styled overlay placed per the popup preferences.
    #[must_use]
    pub fn popup(
        kind: OverlayKind,
        popup: &PopupConfig,
        area: WorkArea,
        message: impl Into<String>,
        auto_close: Option<Duration>,
    ) -> Self {
        Self {
            kind,
            geometry: Geometry::resolve(popup.position, popup.width, popup.height, area),
            colors: popup.colors.clone(),
            message: message.into(),
            auto_close,
        }
    }

    /// Request a centered exercise prompt.
    #[must_use]
    pub fn exercise(
        popup: &PopupConfig,
        area: WorkArea,
        message: impl Into<String>,
        display: Duration,
    ) -> Self {
        let (width, height) = EXERCISE_SIZE;
        Self {
            kind: OverlayKind::Exercise,
            geometry: Geometry::centered(width, height, area),
            colors: popup.colors.clone(),
            message: message.into(),
            auto_close: Some(display),
        }
    }
}
