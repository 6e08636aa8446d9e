//! Frame timing.
//!
//! - one `FrameClock` per render loop; `tick()` once per presented frame
//! - `FrameStats` turns per-stage `FrameTimings` into periodic reports

mod frame_clock;
mod stats;

pub use frame_clock::{FrameClock, FrameTime};
pub use stats::{FrameStats, FrameTimings, StatsReport};
