//! Display geometry and coordinate normalization.
//!
//! UI surfaces report pointer positions in logical pixels; the OS automation
//! layer consumes physical (device) pixels. [`normalize`] maps between the
//! two given a snapshot of the connected displays, so it stays a pure
//! function that is testable without any rendering surface.

use display_info::DisplayInfo;
use tracing::{debug, warn};

/// One display's logical bounding rectangle plus its pixel-density scale
/// (physical-pixel density divided by logical-pixel density).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

impl DisplayBounds {
    /// Whether the logical point falls inside this display's rectangle.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x + self.width as i32
            && y < self.y + self.height as i32
    }
}

/// Snapshot the currently connected displays.
///
/// An empty snapshot is valid: [`normalize`] falls back to a scale of 1.0
/// when no display contains the point.
pub fn query_displays() -> Vec<DisplayBounds> {
    match DisplayInfo::all() {
        Ok(displays) if !displays.is_empty() => {
            let bounds: Vec<DisplayBounds> = displays
                .into_iter()
                .map(|d| DisplayBounds {
                    x: d.x,
                    y: d.y,
                    width: d.width,
                    height: d.height,
                    scale_factor: f64::from(d.scale_factor),
                })
                .collect();
            debug!(target: "cyclerun::display", displays = bounds.len(), "Display snapshot taken");
            bounds
        }
        _ => {
            warn!(
                target: "cyclerun::display",
                "No display metadata available; coordinates will pass through unscaled"
            );
            Vec::new()
        }
    }
}

/// Map a logical point to physical pixels against a display snapshot.
///
/// The first display whose rectangle contains the point decides the scale;
/// a point outside every display (e.g. a just-disconnected monitor) falls
/// back to 1.0. Each axis is rounded independently and clamped to zero to
/// keep normalized coordinates non-negative.
pub fn normalize(logical_x: i32, logical_y: i32, displays: &[DisplayBounds]) -> (i32, i32) {
    let scale = displays
        .iter()
        .find(|d| d.contains(logical_x, logical_y))
        .map_or(1.0, |d| d.scale_factor);
    (scale_axis(logical_x, scale), scale_axis(logical_y, scale))
}

fn scale_axis(value: i32, scale: f64) -> i32 {
    ((f64::from(value) * scale).round() as i32).max(0)
}
