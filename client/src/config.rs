use serde::{Deserialize, Serialize};

use crate::engine::ScreenRect;

pub const DEFAULT_DWELL_MS: f64 = 100.0;
pub const DEFAULT_LEAVE_GRACE_MS: f64 = 45.0;
pub const DEFAULT_PREVIEW_TRAILING_MS: f64 = 120.0;
pub const DEFAULT_ECHO_WINDOW_MS: f64 = 1500.0;
pub const DEFAULT_REFRESH_FRAME_MS: f64 = 16.0;

// Both dominance thresholds are product tunables, not derived values.
pub const DEFAULT_SELECTION_PLURALITY: f64 = 0.5;
pub const DEFAULT_VIEWPORT_DOMINANCE: f64 = 0.45;

/// Below this zoom primary-cell geometry is not drawn.
pub const DEFAULT_PRIMARY_MIN_ZOOM: f64 = 8.0;
pub const DEFAULT_CANVAS_WIDTH: f64 = 1200.0;
pub const DEFAULT_CANVAS_HEIGHT: f64 = 800.0;

/// Timing and threshold knobs for the interaction core. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub dwell_ms: f64,
    pub leave_grace_ms: f64,
    pub preview_trailing_ms: f64,
    pub echo_window_ms: f64,
    pub refresh_frame_ms: f64,
    pub selection_plurality: f64,
    pub viewport_dominance: f64,
    pub primary_min_zoom: f64,
    pub fly_to_selection: bool,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            dwell_ms: DEFAULT_DWELL_MS,
            leave_grace_ms: DEFAULT_LEAVE_GRACE_MS,
            preview_trailing_ms: DEFAULT_PREVIEW_TRAILING_MS,
            echo_window_ms: DEFAULT_ECHO_WINDOW_MS,
            refresh_frame_ms: DEFAULT_REFRESH_FRAME_MS,
            selection_plurality: DEFAULT_SELECTION_PLURALITY,
            viewport_dominance: DEFAULT_VIEWPORT_DOMINANCE,
            primary_min_zoom: DEFAULT_PRIMARY_MIN_ZOOM,
            fly_to_selection: false,
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
        }
    }
}

fn non_negative_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

fn ratio_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        value
    } else {
        fallback
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

impl InteractionConfig {
    /// Replace out-of-range values with defaults instead of rejecting the whole config.
    pub fn sanitized(self) -> Self {
        Self {
            dwell_ms: non_negative_or(self.dwell_ms, DEFAULT_DWELL_MS),
            leave_grace_ms: non_negative_or(self.leave_grace_ms, DEFAULT_LEAVE_GRACE_MS),
            preview_trailing_ms: non_negative_or(
                self.preview_trailing_ms,
                DEFAULT_PREVIEW_TRAILING_MS,
            ),
            echo_window_ms: non_negative_or(self.echo_window_ms, DEFAULT_ECHO_WINDOW_MS),
            refresh_frame_ms: non_negative_or(self.refresh_frame_ms, DEFAULT_REFRESH_FRAME_MS),
            selection_plurality: ratio_or(self.selection_plurality, DEFAULT_SELECTION_PLURALITY),
            viewport_dominance: ratio_or(self.viewport_dominance, DEFAULT_VIEWPORT_DOMINANCE),
            primary_min_zoom: non_negative_or(self.primary_min_zoom, DEFAULT_PRIMARY_MIN_ZOOM),
            fly_to_selection: self.fly_to_selection,
            canvas_width: positive_or(self.canvas_width, DEFAULT_CANVAS_WIDTH),
            canvas_height: positive_or(self.canvas_height, DEFAULT_CANVAS_HEIGHT),
        }
    }

    /// The full canvas, used for rendered-feature queries.
    pub fn canvas_rect(&self) -> ScreenRect {
        ScreenRect {
            x: 0.0,
            y: 0.0,
            width: self.canvas_width,
            height: self.canvas_height,
        }
    }
}
