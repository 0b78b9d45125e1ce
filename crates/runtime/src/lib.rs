//! Timing primitives shared by the viewport listener and week playback.

pub mod throttle;
pub mod ticker;

pub use throttle::*;
pub use ticker::*;
