//! styleframe engine crate.
//!
//! Draws GPU-resident inference output onto a display surface without a host
//! round trip. One wgpu context per surface is shared between the compute
//! backend that produces the frame and the pipeline that paints it.

pub mod compute;
pub mod device;
pub mod error;
pub mod frame;
pub mod logging;
pub mod render;
pub mod sync;
pub mod time;
