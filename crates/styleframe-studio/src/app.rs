use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::window::{Window, WindowId};

use styleframe_engine::compute::kernels::{AFFINE, APPEND_ALPHA, CLIP_BY_VALUE};
use styleframe_engine::compute::{
    AdapterConfig, ComputeBackendAdapter, ComputeEngine, GpuTensor, KernelAttrs,
};
use styleframe_engine::device::{ContextRegistry, GraphicsContext, Surface};
use styleframe_engine::frame::{FrameDriver, FrameInput, FrameOutcome};
use styleframe_engine::render::{DrawOptions, Renderer, ValueRange};

use crate::camera::SyntheticCamera;
use crate::config::StudioConfig;

/// Everything tied to the open window.
struct Session {
    /// Current-thread runtime the frame futures run on. Fence waits back off
    /// on its timer instead of spinning.
    runtime: Runtime,
    window: Arc<Window>,
    surface: Surface,
    contexts: ContextRegistry,
    engine: ComputeEngine,
    backend: String,
    context: Arc<GraphicsContext>,
    driver: FrameDriver,
    camera: SyntheticCamera,
    resume_at: Option<Instant>,
}

impl Session {
    fn open(event_loop: &ActiveEventLoop, config: &StudioConfig) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.frame_width, config.frame_height));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("failed to build the frame runtime")?;

        let mut surface = Surface::for_window(Arc::clone(&window));
        let mut contexts = ContextRegistry::new();
        let mut engine = ComputeEngine::with_reference_kernels();
        let mut adapter = ComputeBackendAdapter::new(AdapterConfig::default());

        let context = runtime
            .block_on(adapter.register(&mut engine, &mut contexts, &mut surface))
            .context("failed to register the compute backend")?;
        let backend = adapter.config().name.clone();

        let renderer = Renderer::new(DrawOptions {
            value_range: ValueRange::Byte,
        });

        Ok(Self {
            runtime,
            window,
            surface,
            contexts,
            engine,
            backend,
            context,
            driver: FrameDriver::new(renderer, config.driver.clone()),
            camera: SyntheticCamera::new(config.frame_width, config.frame_height),
            resume_at: None,
        })
    }

    /// Runs the camera frame through the kernels and draws the result.
    fn frame(&mut self) -> Result<FrameOutcome> {
        let Session {
            runtime,
            surface,
            engine,
            backend,
            context,
            driver,
            camera,
            ..
        } = self;

        if driver.is_paused() {
            return Ok(FrameOutcome::Paused {
                retry_after: driver.config().pause_retry,
            });
        }

        let started = Instant::now();
        let shape = camera.shape();
        let input = GpuTensor::upload(context, camera.next_frame(), &shape)?;

        let normalized = engine.run(
            AFFINE,
            &[&input],
            &KernelAttrs::new()
                .with("scale", 1.0 / 127.5)
                .with("offset", -1.0),
        )?;
        // Style model stand-in.
        let styled = engine.run(
            AFFINE,
            &[&normalized],
            &KernelAttrs::new().with("scale", -1.0).with("offset", 0.0),
        )?;
        let denormalized = engine.run(
            AFFINE,
            &[&styled],
            &KernelAttrs::new()
                .with("scale", 127.5)
                .with("offset", 127.5),
        )?;
        let clipped = engine.run(
            CLIP_BY_VALUE,
            &[&denormalized],
            &KernelAttrs::new().with("min", 0.0).with("max", 255.0),
        )?;
        let rgba = engine.run(
            APPEND_ALPHA,
            &[&clipped],
            &KernelAttrs::new().with("alpha", 255.0),
        )?;

        let texture = engine
            .find_backend(backend)
            .and_then(|b| b.as_gpu())
            .with_context(|| format!("backend `{backend}` is not a GPU backend"))?
            .tensor_to_texture(&rgba)?;
        let inference = started.elapsed();

        let dims = texture.dims();
        let outcome = runtime.block_on(driver.run_frame(
            context,
            surface,
            FrameInput::Device {
                texture: texture.handle(),
                shape: &dims,
            },
            Some(inference),
        ))?;
        Ok(outcome)
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.surface.resize(&self.context, size);
        self.window.request_redraw();
    }

    fn toggle_pause(&mut self) {
        if !self.driver.toggle_pause() {
            self.resume_at = None;
            self.window.request_redraw();
        }
    }

    fn close(mut self) {
        self.driver.renderer_mut().release(&self.surface);
        self.contexts.release(&mut self.surface);
    }
}

pub struct Studio {
    config: StudioConfig,
    session: Option<Session>,
    error: Option<anyhow::Error>,
}

impl Studio {
    pub fn new(config: StudioConfig) -> Self {
        Self {
            config,
            session: None,
            error: None,
        }
    }

    /// The error that ended the event loop, if any.
    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error = Some(err);
        if let Some(session) = self.session.take() {
            session.close();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() {
            return;
        }

        match Session::open(event_loop, &self.config) {
            Ok(session) => {
                session.window.request_redraw();
                self.session = Some(session);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.resume_at {
            Some(at) if Instant::now() < at => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(at));
            }
            _ => {
                session.resume_at = None;
                event_loop.set_control_flow(ControlFlow::Wait);
                session.window.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Some(session) = self.session.take() {
                    session.close();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => session.resize(size),

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = session.window.inner_size();
                session.resize(size);
            }

            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => session.toggle_pause(),

            WindowEvent::RedrawRequested => match session.frame() {
                Ok(FrameOutcome::Paused { retry_after }) => {
                    session.resume_at = Some(Instant::now() + retry_after);
                }
                Ok(_) => {}
                Err(e) => self.fail(event_loop, e),
            },

            _ => {}
        }
    }
}
