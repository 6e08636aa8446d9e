//! Graphics contexts and display surfaces.
//!
//! This module is responsible for:
//! - negotiating the API version and creating the wgpu Instance/Adapter/Device/Queue
//! - binding exactly one context to each surface (window swapchain or headless texture)
//! - reporting context loss to listeners installed on the surface
//! - reading rendered pixels back from headless surfaces

mod attributes;
mod context;
mod readback;
mod registry;
mod surface;

pub use attributes::{ApiVersion, ContextAttributes};
pub use context::{ContextEvent, ContextEvents, ContextId, GraphicsContext};
pub use registry::ContextRegistry;
pub use surface::{
    HEADLESS_FORMAT, Surface, SurfaceErrorAction, SurfaceFrame, SurfaceId, SurfaceKey,
};

pub(crate) use readback::read_buffer;

/// Creates a headless context, or `None` when the machine has no adapter.
#[cfg(test)]
pub(crate) fn test_context(
    width: u32,
    height: u32,
) -> Option<(Surface, std::sync::Arc<GraphicsContext>)> {
    let mut surface = Surface::headless(width, height);
    match pollster::block_on(GraphicsContext::create(
        &mut surface,
        &ContextAttributes::default(),
        ApiVersion::V1,
    )) {
        Ok(ctx) => Some((surface, ctx)),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

/// Runs `future` on a current-thread tokio runtime with the timer enabled.
#[cfg(test)]
pub(crate) fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("test runtime")
        .block_on(future)
}
