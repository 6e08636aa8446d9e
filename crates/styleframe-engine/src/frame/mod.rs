//! Per-frame orchestration.
//!
//! `FrameDriver::run_frame` takes either a host frame, which it uploads into
//! a reusable texture, or a device texture already on the surface's context.

mod driver;
mod input;
mod upload;

pub use driver::{DriverConfig, FrameDriver, FrameOutcome};
pub use input::{FrameInput, HostFrame};
pub use upload::{HostUpload, UPLOAD_FORMAT};
