//! Monitor geometry: containment and absolute/relative conversion.

use serde::{Deserialize, Serialize};

/// A display rectangle in virtual-desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub is_primary: bool,
}

impl Monitor {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.x <= x && x < self.x + self.width && self.y <= y && y < self.y + self.height
    }

    pub fn to_relative(&self, x: i32, y: i32) -> (i32, i32) {
        to_relative(x, y, self)
    }

    pub fn to_absolute(&self, rx: i32, ry: i32) -> (i32, i32) {
        to_absolute(rx, ry, self)
    }
}

/// First monitor containing `(x, y)`, if any.
pub fn monitor_at(monitors: &[Monitor], x: i32, y: i32) -> Option<Monitor> {
    monitors.iter().copied().find(|m| m.contains(x, y))
}

pub fn to_relative(x: i32, y: i32, m: &Monitor) -> (i32, i32) {
    (x - m.x, y - m.y)
}

pub fn to_absolute(rx: i32, ry: i32, m: &Monitor) -> (i32, i32) {
    (rx + m.x, ry + m.y)
}

/// Read-only view of the desktop: display topology and the cursor.
///
/// Topology is re-read on every call because monitors can be attached or
/// rearranged at any time.
pub trait Desktop: Send + Sync {
    fn monitors(&self) -> Vec<Monitor>;

    fn cursor_position(&self) -> Option<(i32, i32)>;

    fn monitor_at(&self, x: i32, y: i32) -> Option<Monitor> {
        monitor_at(&self.monitors(), x, y)
    }
}
