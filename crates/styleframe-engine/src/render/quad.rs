use wgpu::util::DeviceExt;

/// Clip-space corners in triangle-strip order.
const POSITIONS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

/// Texture coordinates per corner. NDC bottom maps to v = 0, which flips rows.
const TEX_COORDS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

const VERTEX_COUNT: u32 = 4;

const POSITION_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const TEX_COORD_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];

/// Two static vertex buffers covering the viewport.
pub struct FullscreenQuad {
    positions: wgpu::Buffer,
    tex_coords: wgpu::Buffer,
}

impl FullscreenQuad {
    pub fn new(device: &wgpu::Device) -> Self {
        let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("styleframe quad positions"),
            contents: bytemuck::cast_slice(&POSITIONS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let tex_coords = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("styleframe quad tex coords"),
            contents: bytemuck::cast_slice(&TEX_COORDS),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            positions,
            tex_coords,
        }
    }

    /// Vertex layouts: slot 0 positions, slot 1 texture coordinates.
    pub fn layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
        let stride = std::mem::size_of::<[f32; 2]>() as u64;
        [
            wgpu::VertexBufferLayout {
                array_stride: stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &POSITION_ATTRS,
            },
            wgpu::VertexBufferLayout {
                array_stride: stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &TEX_COORD_ATTRS,
            },
        ]
    }

    /// One 4-vertex triangle strip.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.positions.slice(..));
        pass.set_vertex_buffer(1, self.tex_coords.slice(..));
        pass.draw(0..VERTEX_COUNT, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bottom_edge_samples_first_row() {
        for (pos, uv) in POSITIONS.iter().zip(TEX_COORDS.iter()) {
            // v = 0 at NDC y = -1, v = 1 at NDC y = +1.
            assert_eq!(uv[1], (pos[1] + 1.0) / 2.0);
            assert_eq!(uv[0], (pos[0] + 1.0) / 2.0);
        }
    }

    #[test]
    fn layouts_use_separate_slots() {
        let [pos, uv] = FullscreenQuad::layouts();
        assert_eq!(pos.attributes[0].shader_location, 0);
        assert_eq!(uv.attributes[0].shader_location, 1);
        assert_eq!(pos.array_stride, 8);
    }
}
