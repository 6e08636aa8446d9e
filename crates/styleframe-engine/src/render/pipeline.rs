use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::device::{GraphicsContext, SurfaceKey};
use crate::error::{DrawError, ShaderError};

use super::quad::FullscreenQuad;
use super::shader::{ProgramDesc, ShaderProgram};
use super::target::{OFFSCREEN_FORMAT, OffscreenTarget};
use super::texture::{ChannelLayout, DrawOptions, TextureHandle, TextureShape};

// ── draw uniform ──────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct DrawParams {
    rgba: u32,
    range: u32,
    _pad: [u32; 2], // 16-byte alignment
}

impl DrawParams {
    fn new(layout: ChannelLayout, options: &DrawOptions) -> Self {
        Self {
            rgba: u32::from(layout == ChannelLayout::Rgba),
            range: options.value_range.code(),
            _pad: [0; 2],
        }
    }
}

// ── bind group layouts ────────────────────────────────────────────────────

fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, filtering: bool) -> wgpu::BindGroupLayoutEntry {
    let ty = if filtering {
        wgpu::SamplerBindingType::Filtering
    } else {
        wgpu::SamplerBindingType::NonFiltering
    };
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(ty),
        count: None,
    }
}

fn uniform_entry(binding: u32, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

/// Draws a source texture onto one surface.
///
/// Pass 1 samples the source into the offscreen target. Pass 2 copies the
/// offscreen target to the surface with linear filtering. Both passes go
/// through the full-screen quad, which flips rows, so row 0 of the offscreen
/// target lands on the last row of the surface.
pub struct RenderPipeline {
    /// Surface, context, size and format these resources were built for.
    key: SurfaceKey,
    /// Pass 1: source texture to offscreen target.
    draw: ShaderProgram,
    /// Pass 2: offscreen target to surface.
    blit: ShaderProgram,
    target: OffscreenTarget,
    quad: FullscreenQuad,
    /// Nearest sampler; float sources are not filterable everywhere.
    source_sampler: wgpu::Sampler,
    /// Uniform buffer holding `params_value`.
    params: wgpu::Buffer,
    /// Last uniform contents written, to skip redundant writes.
    params_value: DrawParams,
    /// Bound once; the offscreen target only changes with the key.
    blit_bind_group: wgpu::BindGroup,
    surface_load: wgpu::LoadOp<wgpu::Color>,
}

impl RenderPipeline {
    /// Builds every GPU resource for the surface described by `key`.
    pub fn new(context: &GraphicsContext, key: SurfaceKey) -> Result<Self, ShaderError> {
        let device = context.device();
        let layouts = FullscreenQuad::layouts();

        // Float32 sources are not filterable without an optional feature.
        let mut draw = ShaderProgram::link(
            device,
            &ProgramDesc {
                label: "styleframe draw program",
                source: include_str!("shaders/draw.wgsl"),
                bindings: &[
                    texture_entry(0, false),
                    sampler_entry(1, false),
                    uniform_entry(2, std::mem::size_of::<DrawParams>() as u64),
                ],
                vertex_buffers: &layouts,
                target_format: OFFSCREEN_FORMAT,
            },
        )?;
        // Resolve the draw bindings now so a mismatch fails construction.
        for name in ["source_texture", "source_sampler", "params"] {
            draw.location(name)?;
        }

        let mut blit = ShaderProgram::link(
            device,
            &ProgramDesc {
                label: "styleframe blit program",
                source: include_str!("shaders/blit.wgsl"),
                bindings: &[texture_entry(0, true), sampler_entry(1, true)],
                vertex_buffers: &layouts,
                target_format: key.format,
            },
        )?;

        let target = OffscreenTarget::new(device, key.width, key.height);
        let quad = FullscreenQuad::new(device);

        let source_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("styleframe source sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let params_value = DrawParams::new(ChannelLayout::Rgb, &DrawOptions::default());
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("styleframe draw params"),
            contents: bytemuck::bytes_of(&params_value),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let frame_slot = blit.location("frame_texture")?;
        let frame_sampler_slot = blit.location("frame_sampler")?;
        let blit_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("styleframe blit bind group"),
            layout: blit.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: frame_slot,
                    resource: wgpu::BindingResource::TextureView(target.view()),
                },
                wgpu::BindGroupEntry {
                    binding: frame_sampler_slot,
                    resource: wgpu::BindingResource::Sampler(target.sampler()),
                },
            ],
        });

        log::debug!(
            "render pipeline built for {} ({}x{}, {:?})",
            key.surface,
            key.width,
            key.height,
            key.format
        );

        Ok(Self {
            key,
            draw,
            blit,
            target,
            quad,
            source_sampler,
            params,
            params_value,
            blit_bind_group,
            surface_load: context.attributes().surface_load_op(),
        })
    }

    pub fn key(&self) -> &SurfaceKey {
        &self.key
    }

    pub fn offscreen(&self) -> &OffscreenTarget {
        &self.target
    }

    /// Records both passes into `encoder`, ending on `surface_view`.
    pub fn encode(
        &mut self,
        context: &GraphicsContext,
        encoder: &mut wgpu::CommandEncoder,
        source: &TextureHandle<'_>,
        shape: TextureShape,
        options: &DrawOptions,
        surface_view: &wgpu::TextureView,
    ) -> Result<(), DrawError> {
        self.draw_offscreen(context, encoder, source, shape, options)?;
        self.blit(encoder, surface_view);
        Ok(())
    }

    /// Pass 1: source texture → offscreen target.
    pub fn draw_offscreen(
        &mut self,
        context: &GraphicsContext,
        encoder: &mut wgpu::CommandEncoder,
        source: &TextureHandle<'_>,
        shape: TextureShape,
        options: &DrawOptions,
    ) -> Result<(), DrawError> {
        let params = DrawParams::new(shape.layout, options);
        if params != self.params_value {
            context
                .queue()
                .write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
            self.params_value = params;
        }

        let texture_slot = self.draw.location("source_texture")?;
        let sampler_slot = self.draw.location("source_sampler")?;
        let params_slot = self.draw.location("params")?;

        let bind_group = context.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("styleframe draw bind group"),
            layout: self.draw.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: texture_slot,
                    resource: wgpu::BindingResource::TextureView(source.view()),
                },
                wgpu::BindGroupEntry {
                    binding: sampler_slot,
                    resource: wgpu::BindingResource::Sampler(&self.source_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: params_slot,
                    resource: self.params.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("styleframe draw pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.target.view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(self.draw.pipeline());
        pass.set_bind_group(0, &bind_group, &[]);
        self.quad.draw(&mut pass);

        Ok(())
    }

    /// Pass 2: offscreen target → surface, full rect, vertically flipped.
    pub fn blit(&self, encoder: &mut wgpu::CommandEncoder, surface_view: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("styleframe blit pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: surface_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: self.surface_load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(self.blit.pipeline());
        pass.set_bind_group(0, &self.blit_bind_group, &[]);
        self.quad.draw(&mut pass);
    }
}
