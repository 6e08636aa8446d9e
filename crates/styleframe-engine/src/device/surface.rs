use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::{ContextError, DrawError, ReadbackError};

use super::attributes::ContextAttributes;
use super::context::{ContextEvents, ContextId, GraphicsContext};
use super::readback::read_buffer;

/// Color format of headless surfaces.
pub const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

static NEXT_SURFACE: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a display surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SURFACE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Structural identity of a drawable surface state.
///
/// Anything cached against a surface is valid only while the key is unchanged.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceKey {
    pub surface: SurfaceId,
    pub context: ContextId,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

enum Target {
    Window {
        window: Arc<Window>,
        swapchain: Option<Swapchain>,
    },
    Headless {
        texture: Option<wgpu::Texture>,
    },
}

struct Swapchain {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

/// A drawing surface: a window swapchain or an offscreen color texture.
///
/// A surface carries at most one context for its whole lifetime.
pub struct Surface {
    id: SurfaceId,
    /// Drawable size in physical pixels.
    size: PhysicalSize<u32>,
    /// Window swapchain or offscreen texture.
    target: Target,
    /// Context bound on first acquire. Never rebound.
    bound: Option<ContextId>,
    /// Listeners shared with the bound context's loss callback.
    events: Arc<ContextEvents>,
}

/// One acquired drawable. Dropping it without `present` discards the frame.
pub struct SurfaceFrame {
    view: wgpu::TextureView,
    output: Option<wgpu::SurfaceTexture>,
}

impl SurfaceFrame {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Presents swapchain frames. Headless frames are already in place.
    pub fn present(self) {
        if let Some(output) = self.output {
            output.present();
        }
    }
}

impl Surface {
    /// Wraps a window. The swapchain is created when a context is attached.
    pub fn for_window(window: Arc<Window>) -> Self {
        let size = window.inner_size();
        Self {
            id: SurfaceId::next(),
            size,
            target: Target::Window {
                window,
                swapchain: None,
            },
            bound: None,
            events: Arc::default(),
        }
    }

    /// An offscreen surface whose pixels can be read back.
    pub fn headless(width: u32, height: u32) -> Self {
        Self {
            id: SurfaceId::next(),
            size: PhysicalSize::new(width, height),
            target: Target::Headless { texture: None },
            bound: None,
            events: Arc::default(),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// Current drawable size (physical pixels).
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn bound_context(&self) -> Option<ContextId> {
        self.bound
    }

    /// Listener list for context events on this surface.
    pub fn events(&self) -> Arc<ContextEvents> {
        Arc::clone(&self.events)
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        match &self.target {
            Target::Window { window, .. } => Some(window),
            Target::Headless { .. } => None,
        }
    }

    /// Texture format of the drawable, once a context is attached.
    pub fn format(&self) -> Option<wgpu::TextureFormat> {
        match &self.target {
            Target::Window { swapchain, .. } => swapchain.as_ref().map(|s| s.config.format),
            Target::Headless { texture } => texture.as_ref().map(|_| HEADLESS_FORMAT),
        }
    }

    /// Structural key of the current drawable state, once a context is attached.
    pub fn key(&self) -> Option<SurfaceKey> {
        let context = self.bound?;
        let format = self.format()?;
        Some(SurfaceKey {
            surface: self.id,
            context,
            width: self.size.width,
            height: self.size.height,
            format,
        })
    }

    pub(crate) fn create_wgpu_surface(
        &self,
        instance: &wgpu::Instance,
    ) -> Result<Option<wgpu::Surface<'static>>, ContextError> {
        match &self.target {
            Target::Window { window, .. } => instance
                .create_surface(Arc::clone(window))
                .map(Some)
                .map_err(|e| ContextError::CreateSurface {
                    surface: self.id,
                    reason: e.to_string(),
                }),
            Target::Headless { .. } => Ok(None),
        }
    }

    pub(crate) fn attach(
        &mut self,
        context: ContextId,
        adapter: &wgpu::Adapter,
        device: &wgpu::Device,
        wgpu_surface: Option<wgpu::Surface<'static>>,
        attributes: &ContextAttributes,
    ) -> Result<(), ContextError> {
        let width = self.size.width.max(1);
        let height = self.size.height.max(1);

        match (&mut self.target, wgpu_surface) {
            (Target::Window { swapchain, .. }, Some(surface)) => {
                let caps = surface.get_capabilities(adapter);
                let format = choose_surface_format(&caps, attributes.prefer_srgb)
                    .ok_or(ContextError::NoSurfaceFormat(self.id))?;

                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width,
                    height,
                    present_mode: attributes.present_mode,
                    alpha_mode: choose_alpha_mode(&caps, Some(attributes.alpha_mode())),
                    view_formats: vec![],
                    desired_maximum_frame_latency: attributes.desired_maximum_frame_latency,
                };
                surface.configure(device, &config);
                *swapchain = Some(Swapchain { surface, config });
            }
            (Target::Headless { texture }, _) => {
                *texture = Some(create_headless_texture(device, width, height));
            }
            (Target::Window { .. }, None) => {
                return Err(ContextError::CreateSurface {
                    surface: self.id,
                    reason: "window surface was not created".into(),
                });
            }
        }

        self.bound = Some(context);
        Ok(())
    }

    /// Unbinds the context and drops the drawable resources.
    pub(crate) fn detach(&mut self) {
        match &mut self.target {
            Target::Window { swapchain, .. } => *swapchain = None,
            Target::Headless { texture } => *texture = None,
        }
        self.bound = None;
    }

    /// Acquires the next drawable.
    pub fn acquire(&self) -> Result<SurfaceFrame, DrawError> {
        match &self.target {
            Target::Window { swapchain, .. } => {
                let swapchain = swapchain.as_ref().ok_or(DrawError::Unbound(self.id))?;
                let output = swapchain
                    .surface
                    .get_current_texture()
                    .map_err(DrawError::Surface)?;
                let view = output
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok(SurfaceFrame {
                    view,
                    output: Some(output),
                })
            }
            Target::Headless { texture } => {
                let texture = texture.as_ref().ok_or(DrawError::Unbound(self.id))?;
                Ok(SurfaceFrame {
                    view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    output: None,
                })
            }
        }
    }

    /// Applies a new drawable size.
    ///
    /// wgpu does not support configuring a surface with a 0x0 size; in that
    /// case only the stored size changes and configuration is deferred.
    pub fn resize(&mut self, context: &GraphicsContext, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        match &mut self.target {
            Target::Window {
                swapchain: Some(swapchain),
                ..
            } => {
                swapchain.config.width = new_size.width;
                swapchain.config.height = new_size.height;
                swapchain.surface.configure(context.device(), &swapchain.config);
            }
            Target::Headless {
                texture: Some(texture),
            } => {
                *texture = create_headless_texture(context.device(), new_size.width, new_size.height);
            }
            _ => {}
        }
    }

    /// Converts a `SurfaceError` into a higher-level action.
    pub fn handle_surface_error(
        &mut self,
        context: &GraphicsContext,
        err: wgpu::SurfaceError,
    ) -> SurfaceErrorAction {
        let Target::Window {
            swapchain: Some(swapchain),
            ..
        } = &self.target
        else {
            return SurfaceErrorAction::SkipFrame;
        };

        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                if self.size.width > 0 && self.size.height > 0 {
                    swapchain.surface.configure(context.device(), &swapchain.config);
                }
                SurfaceErrorAction::Reconfigured
            }
            wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
            wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
            wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
        }
    }

    /// Copies the drawable back to the host as tightly packed RGBA8 rows,
    /// top row first. Only headless surfaces are readable.
    pub async fn read_pixels(&self, context: &GraphicsContext) -> Result<Vec<u8>, ReadbackError> {
        let Target::Headless {
            texture: Some(texture),
        } = &self.target
        else {
            return Err(ReadbackError::NotReadable(self.id));
        };
        context
            .check_alive()
            .map_err(|_| ReadbackError::ContextLost(context.id()))?;

        let width = texture.width();
        let height = texture.height();
        let row_bytes = width * 4;
        let padded = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let device = context.device();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("styleframe surface readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("styleframe readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        context.queue().submit(std::iter::once(encoder.finish()));

        let bytes = read_buffer(context, &staging).await?;

        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        for row in bytes.chunks_exact(padded as usize) {
            pixels.extend_from_slice(&row[..row_bytes as usize]);
        }
        Ok(pixels)
    }
}

fn create_headless_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("styleframe headless surface"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: HEADLESS_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    let first = caps.formats.first().copied()?;

    let preferred: &[wgpu::TextureFormat] = if prefer_srgb {
        &[
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ]
    } else {
        &[wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8Unorm]
    };

    preferred
        .iter()
        .copied()
        .find(|f| caps.formats.contains(f))
        .or(Some(first))
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: Vec<wgpu::TextureFormat>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
            ..Default::default()
        }
    }

    // ── format selection ──────────────────────────────────────────────────

    #[test]
    fn linear_format_preferred_by_default() {
        let c = caps(vec![
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Bgra8Unorm,
        ]);
        assert_eq!(
            choose_surface_format(&c, false),
            Some(wgpu::TextureFormat::Bgra8Unorm)
        );
        assert_eq!(
            choose_surface_format(&c, true),
            Some(wgpu::TextureFormat::Bgra8UnormSrgb)
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let c = caps(vec![wgpu::TextureFormat::Rgba16Float]);
        assert_eq!(
            choose_surface_format(&c, false),
            Some(wgpu::TextureFormat::Rgba16Float)
        );
        assert_eq!(choose_surface_format(&caps(vec![]), false), None);
    }

    #[test]
    fn unsupported_alpha_mode_falls_back() {
        let c = caps(vec![wgpu::TextureFormat::Bgra8Unorm]);
        assert_eq!(
            choose_alpha_mode(&c, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
    }

    // ── headless surfaces ─────────────────────────────────────────────────

    #[test]
    fn unbound_surface_has_no_key() {
        let surface = Surface::headless(4, 4);
        assert!(surface.key().is_none());
        assert!(matches!(surface.acquire(), Err(DrawError::Unbound(_))));
    }

    #[test]
    fn resize_changes_key() {
        let Some((mut surface, ctx)) = crate::device::test_context(4, 4) else {
            return;
        };
        let before = surface.key();
        surface.resize(&ctx, PhysicalSize::new(8, 6));
        let after = surface.key();

        assert_ne!(before, after);
        assert_eq!(after.map(|k| (k.width, k.height)), Some((8, 6)));
    }

    #[test]
    fn cleared_surface_reads_back() {
        let Some((surface, ctx)) = crate::device::test_context(3, 2) else {
            return;
        };
        let frame = surface.acquire().unwrap();
        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::RED),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        ctx.queue().submit(std::iter::once(encoder.finish()));
        frame.present();

        let pixels = crate::device::block_on(surface.read_pixels(&ctx)).unwrap();
        assert_eq!(pixels.len(), 3 * 2 * 4);
        assert!(pixels.chunks_exact(4).all(|p| p == [255, 0, 0, 255]));
    }
}
