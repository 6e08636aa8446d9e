use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::device::GraphicsContext;
use crate::error::{ComputeError, ShaderError};
use crate::logging::TAG_ADAPTER;
use crate::render::TextureShape;

use super::tensor::{GpuTensor, GpuTexture};

const WORKGROUP_SIZE: u32 = 64;
const MAX_GROUPS_PER_DIM: u32 = 65_535;
const TEXTURE_TILE: u32 = 8;

/// An execution backend registered with the compute engine.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    /// The graphics context this backend executes on, if any.
    fn context(&self) -> Option<&Arc<GraphicsContext>>;

    /// Cheap liveness query of the backend's context.
    fn is_alive(&self) -> bool {
        self.context().is_some_and(|c| c.is_alive())
    }

    /// Capability query for the wgpu implementation.
    fn as_gpu(&self) -> Option<&GpuBackend> {
        None
    }
}

// ── kernel uniforms ───────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Pod, Zeroable)]
pub(crate) struct ElementwiseParams {
    pub scale: f32,
    pub offset: f32,
    pub lo: f32,
    pub hi: f32,
    pub fill: f32,
    pub len: u32,
    pub stride: u32,
    pub _pad: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct TextureParams {
    width: u32,
    height: u32,
    channels: u32,
    _pad: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum Program {
    Elementwise,
    ToTexture,
}

impl Program {
    fn source(self) -> &'static str {
        match self {
            Program::Elementwise => include_str!("shaders/elementwise.wgsl"),
            Program::ToTexture => include_str!("shaders/to_texture.wgsl"),
        }
    }
}

/// Splits `invocations` into a 2D grid that stays under the per-dimension
/// group limit. Returns `(groups_x, groups_y, invocations_per_row)`.
pub(crate) fn dispatch_grid(invocations: u32) -> (u32, u32, u32) {
    let groups = invocations.div_ceil(WORKGROUP_SIZE).max(1);
    let x = groups.min(MAX_GROUPS_PER_DIM);
    let y = groups.div_ceil(x);
    (x, y, x * WORKGROUP_SIZE)
}

/// Compute backend running WGSL kernels on a shared graphics context.
///
/// Pipelines are built on first use and cached by entry point.
pub struct GpuBackend {
    /// Registration name, for logs.
    name: String,
    /// Context shared with the renderer; tensors live on its device.
    context: Arc<GraphicsContext>,
    /// Compiled pipelines keyed by entry point.
    pipelines: Mutex<HashMap<&'static str, wgpu::ComputePipeline>>,
}

impl GpuBackend {
    pub fn new(name: impl Into<String>, context: Arc<GraphicsContext>) -> Self {
        Self {
            name: name.into(),
            context,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    pub fn gpu_context(&self) -> &Arc<GraphicsContext> {
        &self.context
    }

    fn check_input(&self, tensor: &GpuTensor) -> Result<(), ComputeError> {
        if !self.context.is_alive() {
            return Err(ComputeError::ContextLost(self.context.id()));
        }
        if tensor.context() != self.context.id() {
            return Err(ComputeError::ContextMismatch {
                tensor: tensor.context(),
                context: self.context.id(),
            });
        }
        Ok(())
    }

    fn build_pipeline(
        &self,
        program: Program,
        entry: &'static str,
    ) -> Result<wgpu::ComputePipeline, ShaderError> {
        let device = self.context.device();
        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(entry),
            source: wgpu::ShaderSource::Wgsl(program.source().into()),
        });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            return Err(ShaderError::Compile {
                label: entry.to_string(),
                messages: errors.join("; "),
            });
        }

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry),
            layout: None,
            module: &module,
            entry_point: Some(entry),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(e) = pollster::block_on(scope.pop()) {
            return Err(ShaderError::Link {
                label: entry.to_string(),
                message: e.to_string(),
            });
        }

        log::debug!(target: TAG_ADAPTER, "{}: compiled kernel `{entry}`", self.name);
        Ok(pipeline)
    }

    /// Records one dispatch of `entry` with bindings `(0, 1, 2)` and submits it.
    fn dispatch(
        &self,
        program: Program,
        entry: &'static str,
        resources: [wgpu::BindingResource<'_>; 3],
        groups: (u32, u32),
    ) -> Result<(), ComputeError> {
        let mut pipelines = self.pipelines.lock().unwrap_or_else(|p| p.into_inner());
        let pipeline = match pipelines.entry(entry) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => slot.insert(self.build_pipeline(program, entry)?),
        };

        let device = self.context.device();
        let [r0, r1, r2] = resources;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(entry),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: r0,
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: r1,
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: r2,
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("styleframe kernel encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(entry),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }
        self.context.queue().submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Runs an element-wise kernel over `invocations` work items.
    pub(crate) fn run_elementwise(
        &self,
        entry: &'static str,
        input: &GpuTensor,
        out_shape: Vec<usize>,
        mut params: ElementwiseParams,
        invocations: u32,
    ) -> Result<GpuTensor, ComputeError> {
        self.check_input(input)?;

        let (x, y, stride) = dispatch_grid(invocations);
        params.len = invocations;
        params.stride = stride;

        let uniform = self
            .context
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("styleframe kernel params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let output = GpuTensor::allocate(&self.context, out_shape);

        self.dispatch(
            Program::Elementwise,
            entry,
            [
                uniform.as_entire_binding(),
                input.buffer().as_entire_binding(),
                output.buffer().as_entire_binding(),
            ],
            (x, y),
        )?;
        Ok(output)
    }

    /// Writes an `[H, W, 3|4]` tensor into a drawable `Rgba32Float` texture on
    /// this backend's context. No data leaves the device.
    pub fn tensor_to_texture(&self, tensor: &GpuTensor) -> Result<GpuTexture, ComputeError> {
        self.check_input(tensor)?;
        let shape = TextureShape::parse(tensor.shape())?;

        let device = self.context.device();
        shape.check_limits(&device.limits())?;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("styleframe tensor texture"),
            size: wgpu::Extent3d {
                width: shape.width,
                height: shape.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let params = TextureParams {
            width: shape.width,
            height: shape.height,
            channels: shape.layout.channels() as u32,
            _pad: 0,
        };
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("styleframe texture params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        self.dispatch(
            Program::ToTexture,
            "to_texture",
            [
                uniform.as_entire_binding(),
                tensor.buffer().as_entire_binding(),
                wgpu::BindingResource::TextureView(&view),
            ],
            (
                shape.width.div_ceil(TEXTURE_TILE),
                shape.height.div_ceil(TEXTURE_TILE),
            ),
        )?;

        Ok(GpuTexture::new(texture, shape, &self.context))
    }

    /// Number of compiled kernel pipelines.
    pub fn compiled_kernels(&self) -> usize {
        self.pipelines.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn context(&self) -> Option<&Arc<GraphicsContext>> {
        Some(&self.context)
    }

    fn as_gpu(&self) -> Option<&GpuBackend> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InputShapeError;

    #[test]
    fn small_dispatch_fits_one_row() {
        assert_eq!(dispatch_grid(1), (1, 1, 64));
        assert_eq!(dispatch_grid(64), (1, 1, 64));
        assert_eq!(dispatch_grid(65), (2, 1, 128));
    }

    #[test]
    fn large_dispatch_wraps_rows() {
        // 720x720x3 values.
        let (x, y, stride) = dispatch_grid(1_555_200);
        assert!(x <= MAX_GROUPS_PER_DIM);
        assert_eq!(stride, x * WORKGROUP_SIZE);
        assert!(u64::from(x) * u64::from(y) * 64 >= 1_555_200);
    }

    #[test]
    fn tensor_becomes_texture() {
        let Some((_surface, ctx)) = crate::device::test_context(4, 4) else {
            return;
        };
        let backend = GpuBackend::new("wgpu", Arc::clone(&ctx));
        let data: Vec<f32> = (0..2 * 3 * 3).map(|v| v as f32).collect();
        let tensor = GpuTensor::upload(&ctx, &data, &[2, 3, 3]).unwrap();

        let texture = backend.tensor_to_texture(&tensor).unwrap();
        assert_eq!(texture.dims(), [2, 3, 3]);
        assert_eq!(texture.handle().size(), (3, 2));
        assert_eq!(texture.handle().context(), ctx.id());
        assert_eq!(backend.compiled_kernels(), 1);
    }

    #[test]
    fn tensor_beyond_texture_limit_is_rejected() {
        let Some((_surface, ctx)) = crate::device::test_context(4, 4) else {
            return;
        };
        let backend = GpuBackend::new("wgpu", Arc::clone(&ctx));
        let width = ctx.device().limits().max_texture_dimension_2d as usize + 1;
        let tensor = GpuTensor::upload(&ctx, &vec![0.0; width * 3], &[1, width, 3]).unwrap();

        assert!(matches!(
            backend.tensor_to_texture(&tensor),
            Err(ComputeError::Shape(InputShapeError::TooLarge { .. }))
        ));
        assert_eq!(backend.compiled_kernels(), 0);
    }

    #[test]
    fn undrawable_tensor_is_rejected() {
        let Some((_surface, ctx)) = crate::device::test_context(4, 4) else {
            return;
        };
        let backend = GpuBackend::new("wgpu", Arc::clone(&ctx));
        let tensor = GpuTensor::upload(&ctx, &[0.0; 10], &[1, 2, 5]).unwrap();

        assert!(matches!(
            backend.tensor_to_texture(&tensor),
            Err(ComputeError::Shape(_))
        ));
    }
}
