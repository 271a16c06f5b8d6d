//! Redraw rate control for notification streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often a host wants to be told to redraw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum UpdateRate {
    /// Every redraw the dispatcher emits
    Native,

    /// At most this many redraws per second.
    /// If the requested rate reaches the capture rate, Native is used
    Max(u32),
}

impl UpdateRate {
    /// Normalize rate against the capture frame rate
    pub fn normalize(self, source_fps: f64) -> Self {
        match self {
            UpdateRate::Native => UpdateRate::Native,
            UpdateRate::Max(0) => UpdateRate::Native,
            UpdateRate::Max(hz) if hz as f64 >= source_fps => UpdateRate::Native,
            UpdateRate::Max(hz) => UpdateRate::Max(hz),
        }
    }

    /// Coalescing window, if any
    pub fn interval(self, source_fps: f64) -> Option<Duration> {
        match self.normalize(source_fps) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
