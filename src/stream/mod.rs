//! Stream utilities for host-side event consumption

mod throttle;

pub use throttle::{CoalesceRedraws, CoalesceRedrawsExt};
