//! styleframe studio.
//!
//! Opens a window, registers the compute backend on the window's context and
//! draws a synthetic camera feed that is processed entirely on the GPU.
//! Click the window to pause or resume the feed.

mod app;
mod camera;
mod config;

use anyhow::{Context, Result};
use winit::event_loop::EventLoop;

use styleframe_engine::logging::{LoggingConfig, init_logging};

use crate::app::Studio;
use crate::config::StudioConfig;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = StudioConfig::from_env()?;
    log::info!(
        "starting studio at {}x{}",
        config.frame_width,
        config.frame_height
    );

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::new(config);
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;

    studio.into_result()
}
