use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::device::{GraphicsContext, Surface, SurfaceErrorAction};
use crate::error::DrawError;
use crate::logging::TAG_FRAME;
use crate::render::Renderer;
use crate::sync::{FrameSync, SyncConfig};
use crate::time::{FrameClock, FrameStats, FrameTimings, StatsReport};

use super::input::FrameInput;
use super::upload::HostUpload;

/// Frame loop settings.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Telemetry is logged every `log_every` drawn frames.
    pub log_every: u64,
    /// Wait for the GPU after each draw and report the wait.
    pub measure_sync: bool,
    /// Delay before the next attempt while paused.
    pub pause_retry: Duration,
    pub sync: SyncConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            log_every: 10,
            measure_sync: true,
            pause_retry: Duration::from_millis(100),
            sync: SyncConfig::default(),
        }
    }
}

/// Result of one `run_frame` call.
#[derive(Debug, Copy, Clone)]
pub enum FrameOutcome {
    Drawn(FrameTimings),
    /// Nothing was presented; the next frame may succeed.
    Skipped,
    /// The source is paused; schedule the next frame after `retry_after`.
    Paused { retry_after: Duration },
}

/// Drives one surface: upload, draw, optional fence timing, telemetry.
pub struct FrameDriver {
    renderer: Renderer,
    /// Fence timing. A failed wait only drops that frame's sample.
    sync: FrameSync,
    clock: FrameClock,
    stats: FrameStats,
    /// Staging texture reused across host frames of the same size.
    upload: HostUpload,
    paused: bool,
    config: DriverConfig,
    /// Most recent periodic report, if one was emitted.
    last_report: Option<StatsReport>,
}

impl FrameDriver {
    pub fn new(renderer: Renderer, config: DriverConfig) -> Self {
        Self {
            renderer,
            sync: FrameSync::new(config.sync.clone()),
            clock: FrameClock::new(),
            stats: FrameStats::new(config.log_every),
            upload: HostUpload::new(),
            paused: false,
            config,
            last_report: None,
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        if !self.paused {
            log::info!(target: TAG_FRAME, "paused");
        }
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if self.paused {
            log::info!(target: TAG_FRAME, "resumed");
            // Time spent paused is not a frame interval.
            self.clock.reset();
        }
        self.paused = false;
    }

    /// Flips the pause state and returns the new one.
    pub fn toggle_pause(&mut self) -> bool {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
        self.paused
    }

    /// Most recent telemetry window.
    pub fn last_report(&self) -> Option<&StatsReport> {
        self.last_report.as_ref()
    }

    /// Produces one frame on `surface`.
    ///
    /// Invalid input shapes and recoverable surface errors skip the frame.
    /// `inference` is the caller's model time for this frame, if any.
    pub async fn run_frame(
        &mut self,
        context: &Arc<GraphicsContext>,
        surface: &mut Surface,
        input: FrameInput<'_>,
        inference: Option<Duration>,
    ) -> Result<FrameOutcome, DrawError> {
        if self.paused {
            return Ok(FrameOutcome::Paused {
                retry_after: self.config.pause_retry,
            });
        }

        let start = Instant::now();
        let mut upload = Duration::ZERO;

        let drawn = match input {
            FrameInput::Host(frame) => match frame.validate() {
                Ok(shape) => match self.upload.upload(context, &frame, shape) {
                    Ok(handle) => {
                        upload = start.elapsed();
                        self.renderer.draw(context, surface, handle, &shape.dims())
                    }
                    Err(e) => Err(e.into()),
                },
                Err(e) => Err(e.into()),
            },
            FrameInput::Device { texture, shape } => {
                self.renderer.draw(context, surface, texture, shape)
            }
        };
        let draw = start.elapsed().saturating_sub(upload);

        match drawn {
            Ok(()) => {}
            Err(DrawError::Shape(e)) => {
                log::warn!(target: TAG_FRAME, "frame skipped: {e}");
                return Ok(FrameOutcome::Skipped);
            }
            Err(DrawError::Surface(err)) => {
                return match surface.handle_surface_error(context, err.clone()) {
                    SurfaceErrorAction::Fatal => {
                        log::error!(target: TAG_FRAME, "surface error: {err}");
                        Err(DrawError::Surface(err))
                    }
                    action => {
                        log::warn!(target: TAG_FRAME, "frame skipped ({action:?}): {err}");
                        Ok(FrameOutcome::Skipped)
                    }
                };
            }
            Err(e) => {
                log::error!(target: TAG_FRAME, "draw failed: {e}");
                return Err(e);
            }
        }

        let sync = if self.config.measure_sync {
            match self.sync.wait_for_completion(context).await {
                Ok(waited) => Some(waited),
                Err(e) => {
                    log::warn!(target: TAG_FRAME, "sync timing unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let timings = FrameTimings {
            upload,
            draw,
            sync,
            inference,
            total: start.elapsed(),
        };

        let ft = self.clock.tick();
        if let Some(report) = self.stats.record(ft.dt, &timings) {
            log::info!(
                target: TAG_FRAME,
                "frame {}: {:.1} fps | upload {:.2} ms | draw {:.2} ms | sync {} | inference {} | total {:.2} ms",
                ft.frame_index,
                report.fps,
                report.upload_ms,
                report.draw_ms,
                optional_ms(report.sync_ms),
                optional_ms(report.inference_ms),
                report.total_ms
            );
            self.last_report = Some(report);
        }

        Ok(FrameOutcome::Drawn(timings))
    }
}

fn optional_ms(ms: Option<f64>) -> String {
    match ms {
        Some(ms) => format!("{ms:.2} ms"),
        None => "n/a".to_string(),
    }
}
