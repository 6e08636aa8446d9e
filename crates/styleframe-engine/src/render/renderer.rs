use crate::device::{GraphicsContext, Surface};
use crate::error::{DrawError, InputShapeError};
use crate::logging::TAG_RENDER;

use super::cache::PipelineRegistry;
use super::pipeline::RenderPipeline;
use super::texture::{DrawOptions, TextureHandle, TextureShape};

/// Draws GPU textures onto surfaces, one cached pipeline per surface.
pub struct Renderer {
    pipelines: PipelineRegistry<RenderPipeline>,
    options: DrawOptions,
    draw_calls: u64,
}

impl Renderer {
    pub fn new(options: DrawOptions) -> Self {
        Self {
            pipelines: PipelineRegistry::new(),
            options,
            draw_calls: 0,
        }
    }

    pub fn options(&self) -> &DrawOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut DrawOptions {
        &mut self.options
    }

    /// Draws `texture` (shape `[height, width, channels]`) onto `surface`.
    ///
    /// The shape is validated before any GPU work, including that its height
    /// and width match the texture's size. The texture, the surface and
    /// `context` must belong to the same context. Submission is synchronous;
    /// completion is not awaited.
    pub fn draw(
        &mut self,
        context: &GraphicsContext,
        surface: &Surface,
        texture: TextureHandle<'_>,
        shape: &[usize],
    ) -> Result<(), DrawError> {
        let shape = TextureShape::parse(shape)?;
        if texture.size() != (shape.width, shape.height) {
            return Err(InputShapeError::SizeMismatch {
                expected: (shape.width, shape.height),
                actual: texture.size(),
            }
            .into());
        }

        if !context.is_alive() {
            log::error!(target: TAG_RENDER, "{} lost; draw refused", context.id());
            return Err(DrawError::ContextLost(context.id()));
        }
        if texture.context() != context.id() {
            return Err(DrawError::ContextMismatch {
                texture: texture.context(),
                context: context.id(),
            });
        }

        let key = surface.key().ok_or(DrawError::Unbound(surface.id()))?;
        if key.context != context.id() {
            return Err(DrawError::ContextMismatch {
                texture: key.context,
                context: context.id(),
            });
        }

        let pipeline = self
            .pipelines
            .get_or_build(key, |key| RenderPipeline::new(context, *key))
            .inspect_err(|e| log::error!(target: TAG_RENDER, "{e}"))?;

        let frame = surface.acquire()?;

        let mut encoder = context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("styleframe frame encoder"),
            });
        pipeline.encode(
            context,
            &mut encoder,
            &texture,
            shape,
            &self.options,
            frame.view(),
        )?;
        context.queue().submit(std::iter::once(encoder.finish()));
        frame.present();

        self.draw_calls += 1;
        Ok(())
    }

    /// Drops the cached pipeline of a surface.
    pub fn release(&mut self, surface: &Surface) {
        self.pipelines.release(surface.id());
    }

    /// Number of pipelines built since creation.
    pub fn constructions(&self) -> u64 {
        self.pipelines.constructions()
    }

    /// Number of draws submitted.
    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DrawOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ValueRange;

    /// A `w`x`h` Rgba32Float texture holding `texels` (RGBA per pixel).
    fn float_texture(ctx: &GraphicsContext, w: u32, h: u32, texels: &[f32]) -> wgpu::Texture {
        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: None,
            size: wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(w * 16),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
        texture
    }

    fn solid(w: u32, h: u32, rgba: [f32; 4]) -> Vec<f32> {
        (0..w * h).flat_map(|_| rgba).collect()
    }

    #[test]
    fn rgba_passes_alpha_and_rgb_forces_opaque() {
        let Some((surface, ctx)) = crate::device::test_context(4, 4) else {
            return;
        };
        let texture = float_texture(&ctx, 4, 4, &solid(4, 4, [1.0, 0.0, 0.0, 0.3]));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut renderer = Renderer::default();

        renderer
            .draw(&ctx, &surface, TextureHandle::new(&ctx, &view, 4, 4), &[4, 4, 4])
            .unwrap();
        let pixels = crate::device::block_on(surface.read_pixels(&ctx)).unwrap();
        let alpha = pixels[3];
        assert!((76..=77).contains(&alpha), "alpha {alpha}");

        renderer
            .draw(&ctx, &surface, TextureHandle::new(&ctx, &view, 4, 4), &[4, 4, 3])
            .unwrap();
        let pixels = crate::device::block_on(surface.read_pixels(&ctx)).unwrap();
        assert!(pixels.chunks_exact(4).all(|p| p == [255, 0, 0, 255]));

        assert_eq!(renderer.constructions(), 1);
        assert_eq!(renderer.draw_calls(), 2);
    }

    #[test]
    fn byte_range_is_normalized() {
        let Some((surface, ctx)) = crate::device::test_context(2, 2) else {
            return;
        };
        let texture = float_texture(&ctx, 2, 2, &solid(2, 2, [255.0, 0.0, 255.0, 255.0]));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut renderer = Renderer::new(DrawOptions {
            value_range: ValueRange::Byte,
        });

        renderer
            .draw(&ctx, &surface, TextureHandle::new(&ctx, &view, 2, 2), &[2, 2, 3])
            .unwrap();
        let pixels = crate::device::block_on(surface.read_pixels(&ctx)).unwrap();
        assert!(pixels.chunks_exact(4).all(|p| p == [255, 0, 255, 255]));
    }

    #[test]
    fn frame_is_drawn_upright() {
        let Some((surface, ctx)) = crate::device::test_context(2, 2) else {
            return;
        };
        // Top row red, bottom row blue.
        let mut texels = solid(2, 1, [1.0, 0.0, 0.0, 1.0]);
        texels.extend(solid(2, 1, [0.0, 0.0, 1.0, 1.0]));
        let texture = float_texture(&ctx, 2, 2, &texels);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Renderer::default()
            .draw(&ctx, &surface, TextureHandle::new(&ctx, &view, 2, 2), &[2, 2, 4])
            .unwrap();
        let pixels = crate::device::block_on(surface.read_pixels(&ctx)).unwrap();

        assert_eq!(&pixels[0..4], &[255, 0, 0, 255]);
        assert_eq!(&pixels[8..12], &[0, 0, 255, 255]);
    }

    #[test]
    fn bad_shape_issues_no_draw() {
        let Some((surface, ctx)) = crate::device::test_context(2, 2) else {
            return;
        };
        let texture = float_texture(&ctx, 2, 2, &solid(2, 2, [0.0; 4]));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut renderer = Renderer::default();

        let result = renderer.draw(&ctx, &surface, TextureHandle::new(&ctx, &view, 2, 2), &[720, 720, 5]);

        assert!(matches!(result, Err(DrawError::Shape(_))));
        assert_eq!(renderer.draw_calls(), 0);
        assert_eq!(renderer.constructions(), 0);
    }

    #[test]
    fn auto_range_rescales_only_byte_texels() {
        let Some((surface, ctx)) = crate::device::test_context(2, 2) else {
            return;
        };
        // Left column holds 0..255 data, right column 0..1 data.
        let row = [[255.0, 0.0, 0.0, 0.2], [0.5, 0.5, 0.5, 0.5]];
        let texels: Vec<f32> = row.iter().chain(row.iter()).flatten().copied().collect();
        let texture = float_texture(&ctx, 2, 2, &texels);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut renderer = Renderer::new(DrawOptions {
            value_range: ValueRange::Auto,
        });

        renderer
            .draw(&ctx, &surface, TextureHandle::new(&ctx, &view, 2, 2), &[2, 2, 4])
            .unwrap();
        let pixels = crate::device::block_on(surface.read_pixels(&ctx)).unwrap();

        for row in pixels.chunks_exact(8) {
            assert_eq!(&row[0..4], &[255, 0, 0, 255]);
            assert!(row[4..8].iter().all(|v| (127..=128).contains(v)), "{row:?}");
        }
    }

    #[test]
    fn size_mismatch_issues_no_draw() {
        let Some((surface, ctx)) = crate::device::test_context(2, 2) else {
            return;
        };
        let texture = float_texture(&ctx, 2, 2, &solid(2, 2, [0.0; 4]));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut renderer = Renderer::default();

        let result = renderer.draw(&ctx, &surface, TextureHandle::new(&ctx, &view, 2, 2), &[4, 2, 4]);

        assert!(matches!(
            result,
            Err(DrawError::Shape(InputShapeError::SizeMismatch {
                expected: (2, 4),
                actual: (2, 2),
            }))
        ));
        assert_eq!(renderer.draw_calls(), 0);
    }

    #[test]
    fn lost_context_refuses_draws() {
        let Some((surface, ctx)) = crate::device::test_context(2, 2) else {
            return;
        };
        let texture = float_texture(&ctx, 2, 2, &solid(2, 2, [0.0; 4]));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut renderer = Renderer::default();
        ctx.mark_lost();

        let result = renderer.draw(&ctx, &surface, TextureHandle::new(&ctx, &view, 2, 2), &[2, 2, 4]);

        assert!(matches!(result, Err(DrawError::ContextLost(id)) if id == ctx.id()));
        assert_eq!(renderer.constructions(), 0);
    }

    #[test]
    fn foreign_texture_is_rejected() {
        let Some((surface, ctx)) = crate::device::test_context(2, 2) else {
            return;
        };
        let Some((_other_surface, other)) = crate::device::test_context(2, 2) else {
            return;
        };
        let texture = float_texture(&ctx, 2, 2, &solid(2, 2, [0.0; 4]));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let result = Renderer::default().draw(
            &ctx,
            &surface,
            TextureHandle::new(&other, &view, 2, 2),
            &[2, 2, 4],
        );
        assert!(matches!(result, Err(DrawError::ContextMismatch { .. })));
    }

    #[test]
    fn each_surface_gets_its_own_pipeline() {
        let Some((s1, ctx)) = crate::device::test_context(2, 2) else {
            return;
        };
        let texture = float_texture(&ctx, 2, 2, &solid(2, 2, [0.0; 4]));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut renderer = Renderer::default();

        for _ in 0..3 {
            renderer
                .draw(&ctx, &s1, TextureHandle::new(&ctx, &view, 2, 2), &[2, 2, 4])
                .unwrap();
        }
        assert_eq!(renderer.constructions(), 1);

        renderer.release(&s1);
        renderer
            .draw(&ctx, &s1, TextureHandle::new(&ctx, &view, 2, 2), &[2, 2, 4])
            .unwrap();
        assert_eq!(renderer.constructions(), 2);
    }
}
