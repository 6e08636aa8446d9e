use std::collections::HashMap;

use crate::error::ShaderError;
use crate::logging::TAG_RENDER;

/// Everything needed to link one vertex + fragment program.
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub source: &'static str,
    pub bindings: &'a [wgpu::BindGroupLayoutEntry],
    pub vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
    pub target_format: wgpu::TextureFormat,
}

/// A compiled and linked vertex + fragment pair.
///
/// Binding slots are looked up by the name of the WGSL global that declares
/// them. Lookups are resolved from the source on first use and cached for the
/// program's lifetime.
pub struct ShaderProgram {
    label: String,
    source: &'static str,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    locations: HashMap<String, u32>,
}

impl ShaderProgram {
    /// Compiles `desc.source` and links it against the given bindings.
    ///
    /// Entry points are `vs_main` and `fs_main`. A source that does not match
    /// `desc.bindings` or `desc.vertex_buffers` fails with `ShaderError::Link`.
    pub fn link(device: &wgpu::Device, desc: &ProgramDesc<'_>) -> Result<Self, ShaderError> {
        // Validation failures are captured here instead of reaching the
        // device's uncaptured-error handler. Early returns drop the scope.
        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            let err = ShaderError::Compile {
                label: desc.label.to_string(),
                messages: errors.join("; "),
            };
            log::error!(target: TAG_RENDER, "{err}");
            return Err(err);
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.label),
            entries: desc.bindings,
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&layout),

            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: desc.vertex_buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: desc.target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        if let Some(e) = pollster::block_on(scope.pop()) {
            let err = ShaderError::Link {
                label: desc.label.to_string(),
                message: e.to_string(),
            };
            log::error!(target: TAG_RENDER, "{err}");
            return Err(err);
        }

        Ok(Self {
            label: desc.label.to_string(),
            source: desc.source,
            bind_group_layout,
            pipeline,
            locations: HashMap::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Binding slot of the group-0 global `name`.
    ///
    /// Undeclared names are an error, never a silent no-op.
    pub fn location(&mut self, name: &str) -> Result<u32, ShaderError> {
        if let Some(&binding) = self.locations.get(name) {
            return Ok(binding);
        }

        let binding = reflect_binding(self.source, name).ok_or_else(|| {
            ShaderError::UnknownUniform {
                program: self.label.clone(),
                name: name.to_string(),
            }
        })?;
        self.locations.insert(name.to_string(), binding);
        Ok(binding)
    }

    /// Number of names resolved so far.
    pub fn cached_locations(&self) -> usize {
        self.locations.len()
    }
}

/// Finds `@group(0) @binding(N) var<...> name` in WGSL source.
fn reflect_binding(source: &str, name: &str) -> Option<u32> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("//"))
        .find_map(|line| {
            let group = attribute_value(line, "@group(")?;
            if group != 0 {
                return None;
            }
            let binding = attribute_value(line, "@binding(")?;
            (declared_name(line)? == name).then_some(binding)
        })
}

fn attribute_value(line: &str, attr: &str) -> Option<u32> {
    let start = line.find(attr)? + attr.len();
    let rest = &line[start..];
    let end = rest.find(')')?;
    rest[..end].trim().parse().ok()
}

fn declared_name(line: &str) -> Option<&str> {
    let after_var = &line[line.find("var")? + 3..];
    let after_space = match after_var.strip_prefix('<') {
        Some(rest) => &rest[rest.find('>')? + 1..],
        None => after_var,
    };
    let name_end = after_space.find(':')?;
    Some(after_space[..name_end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = include_str!("shaders/draw.wgsl");

    #[test]
    fn reflects_texture_sampler_and_uniform() {
        assert_eq!(reflect_binding(SOURCE, "source_texture"), Some(0));
        assert_eq!(reflect_binding(SOURCE, "source_sampler"), Some(1));
        assert_eq!(reflect_binding(SOURCE, "params"), Some(2));
    }

    #[test]
    fn unknown_and_partial_names_do_not_match() {
        assert_eq!(reflect_binding(SOURCE, "missing"), None);
        assert_eq!(reflect_binding(SOURCE, "source"), None);
        assert_eq!(reflect_binding(SOURCE, "rgba"), None);
    }

    #[test]
    fn other_groups_are_ignored() {
        let src = "@group(1) @binding(0) var other: texture_2d<f32>;\n\
                   @group(0) @binding(3) var<storage, read> data: array<f32>;";
        assert_eq!(reflect_binding(src, "other"), None);
        assert_eq!(reflect_binding(src, "data"), Some(3));
    }

    #[test]
    fn mismatched_bindings_fail_to_link() {
        let Some((_surface, ctx)) = crate::device::test_context(4, 4) else {
            return;
        };
        // The source declares three bindings; none are provided.
        let result = ShaderProgram::link(
            ctx.device(),
            &ProgramDesc {
                label: "unbound draw",
                source: SOURCE,
                bindings: &[],
                vertex_buffers: &crate::render::FullscreenQuad::layouts(),
                target_format: wgpu::TextureFormat::Rgba8Unorm,
            },
        );

        assert!(matches!(result, Err(ShaderError::Link { .. })));
    }

    #[test]
    fn broken_source_fails_to_compile() {
        let Some((_surface, ctx)) = crate::device::test_context(4, 4) else {
            return;
        };

        let result = ShaderProgram::link(
            ctx.device(),
            &ProgramDesc {
                label: "broken",
                source: "fn vs_main( {",
                bindings: &[],
                vertex_buffers: &[],
                target_format: wgpu::TextureFormat::Rgba8Unorm,
            },
        );

        assert!(matches!(result, Err(ShaderError::Compile { .. })));
    }

    #[test]
    fn declared_name_handles_address_space() {
        assert_eq!(
            declared_name("@group(0) @binding(2) var<uniform> params: DrawParams;"),
            Some("params")
        );
        assert_eq!(
            declared_name("@group(0) @binding(0) var tex: texture_2d<f32>;"),
            Some("tex")
        );
    }
}
