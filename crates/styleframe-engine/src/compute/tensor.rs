use wgpu::util::DeviceExt;

use crate::device::{ContextId, GraphicsContext, read_buffer};
use crate::error::{ComputeError, InputShapeError, ReadbackError};
use crate::render::{TextureHandle, TextureShape};

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// A dense f32 tensor resident in a GPU storage buffer.
pub struct GpuTensor {
    buffer: wgpu::Buffer,
    shape: Vec<usize>,
    context: ContextId,
}

impl GpuTensor {
    /// Uploads host values laid out row-major in `shape`.
    pub fn upload(
        context: &GraphicsContext,
        data: &[f32],
        shape: &[usize],
    ) -> Result<Self, ComputeError> {
        let expected: usize = shape.iter().product();
        if expected == 0 {
            return Err(InputShapeError::Empty(shape.to_vec()).into());
        }
        if expected != data.len() {
            return Err(InputShapeError::BufferLength {
                expected,
                actual: data.len(),
            }
            .into());
        }

        let buffer = context
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("styleframe tensor"),
                contents: bytemuck::cast_slice(data),
                usage: tensor_usage(),
            });

        Ok(Self {
            buffer,
            shape: shape.to_vec(),
            context: context.id(),
        })
    }

    /// An uninitialized tensor, to be filled by a kernel.
    pub(crate) fn allocate(context: &GraphicsContext, shape: Vec<usize>) -> Self {
        let len: usize = shape.iter().product();
        let buffer = context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("styleframe tensor"),
            size: (len.max(1) as u64) * F32_BYTES,
            usage: tensor_usage(),
            mapped_at_creation: false,
        });
        Self {
            buffer,
            shape,
            context: context.id(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Context the tensor lives on.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Downloads the values. Waits for every kernel submitted before the call.
    pub async fn read(&self, context: &GraphicsContext) -> Result<Vec<f32>, ReadbackError> {
        let size = self.len() as u64 * F32_BYTES;
        let staging = context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("styleframe tensor readback"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("styleframe tensor readback encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, size);
        context.queue().submit(std::iter::once(encoder.finish()));

        let bytes = read_buffer(context, &staging).await?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}

fn tensor_usage() -> wgpu::BufferUsages {
    wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST
}

/// A tensor written into an `Rgba32Float` texture, ready to be drawn.
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    shape: TextureShape,
    context: ContextId,
}

impl GpuTexture {
    pub(crate) fn new(
        texture: wgpu::Texture,
        shape: TextureShape,
        context: &GraphicsContext,
    ) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            shape,
            context: context.id(),
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn shape(&self) -> TextureShape {
        self.shape
    }

    /// `[height, width, channels]` of the source tensor.
    pub fn dims(&self) -> [usize; 3] {
        self.shape.dims()
    }

    /// Borrowed handle for drawing on the same context.
    pub fn handle(&self) -> TextureHandle<'_> {
        TextureHandle::from_parts(&self.view, self.shape.width, self.shape.height, self.context)
    }
}
