use crate::device::{ContextId, GraphicsContext};
use crate::error::InputShapeError;
use crate::render::{ChannelLayout, TextureHandle, TextureShape};

use super::input::HostFrame;

/// Texture format of uploaded host frames.
pub const UPLOAD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

struct Slot {
    context: ContextId,
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Reusable staging texture for host frames.
///
/// Recreated only when the frame size or the context changes.
#[derive(Default)]
pub struct HostUpload {
    slot: Option<Slot>,
    allocations: u64,
    rgba: Vec<f32>,
}

impl HostUpload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of textures allocated so far.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Writes `frame` (already validated as `shape`) and returns a handle to it.
    ///
    /// RGB frames are expanded to RGBA with alpha 1.0. Frames larger than the
    /// device's texture limit are rejected before anything is allocated.
    pub fn upload(
        &mut self,
        context: &GraphicsContext,
        frame: &HostFrame<'_>,
        shape: TextureShape,
    ) -> Result<TextureHandle<'_>, InputShapeError> {
        shape.check_limits(&context.device().limits())?;

        let stale = !self.slot.as_ref().is_some_and(|s| {
            s.context == context.id() && s.width == shape.width && s.height == shape.height
        });
        if stale {
            self.allocations += 1;
            log::debug!(
                "upload texture allocated ({}x{}, #{})",
                shape.width,
                shape.height,
                self.allocations
            );
        }
        let slot = match self.slot.take() {
            Some(slot) if !stale => slot,
            _ => allocate(context, shape.width, shape.height),
        };
        let slot: &Slot = self.slot.insert(slot);

        let texels: &[f32] = match shape.layout {
            ChannelLayout::Rgba => frame.data,
            ChannelLayout::Rgb => {
                self.rgba.clear();
                self.rgba.reserve(frame.data.len() / 3 * 4);
                for px in frame.data.chunks_exact(3) {
                    self.rgba.extend_from_slice(px);
                    self.rgba.push(1.0);
                }
                &self.rgba
            }
        };

        context.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &slot.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(slot.width * 16),
                rows_per_image: Some(slot.height),
            },
            wgpu::Extent3d {
                width: slot.width,
                height: slot.height,
                depth_or_array_layers: 1,
            },
        );

        Ok(TextureHandle::from_parts(
            &slot.view,
            slot.width,
            slot.height,
            slot.context,
        ))
    }
}

fn allocate(context: &GraphicsContext, width: u32, height: u32) -> Slot {
    let texture = context.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("styleframe host upload"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: UPLOAD_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    Slot {
        context: context.id(),
        width,
        height,
        texture,
        view,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_context;

    #[test]
    fn texture_is_reused_while_size_matches() {
        let Some((_surface, ctx)) = test_context(4, 4) else {
            return;
        };
        let mut upload = HostUpload::new();
        let small = vec![0.5; 2 * 2 * 3];
        let large = vec![0.5; 4 * 2 * 4];

        for _ in 0..3 {
            let frame = HostFrame::new(&small, 2, 2, 3);
            let handle = upload.upload(&ctx, &frame, frame.validate().unwrap()).unwrap();
            assert_eq!(handle.size(), (2, 2));
            assert_eq!(handle.context(), ctx.id());
        }
        assert_eq!(upload.allocations(), 1);

        let frame = HostFrame::new(&large, 4, 2, 4);
        let handle = upload.upload(&ctx, &frame, frame.validate().unwrap()).unwrap();
        assert_eq!(handle.size(), (2, 4));
        assert_eq!(upload.allocations(), 2);
    }

    #[test]
    fn oversized_frame_is_rejected_before_allocation() {
        let Some((_surface, ctx)) = test_context(4, 4) else {
            return;
        };
        let max = ctx.device().limits().max_texture_dimension_2d;
        let width = max as usize + 1;
        let data = vec![0.0; width * 4];
        let frame = HostFrame::new(&data, 1, width, 4);
        let mut upload = HostUpload::new();

        let result = upload.upload(&ctx, &frame, frame.validate().unwrap());

        assert!(matches!(
            result,
            Err(InputShapeError::TooLarge { height: 1, .. })
        ));
        assert_eq!(upload.allocations(), 0);
    }
}
