//! Texture-to-surface draw pipeline.
//!
//! A source texture is sampled into an offscreen target through a full-screen
//! quad, then the target is copied to the surface with linear filtering. Both
//! passes flip rows, so the frame appears upright.
//!
//! Convention:
//! - source textures are 2D float textures, shaped `[height, width, channels]`
//! - pipelines are cached per surface and rebuilt when the surface key changes

mod cache;
mod pipeline;
mod quad;
mod renderer;
mod shader;
mod target;
mod texture;

pub use cache::PipelineRegistry;
pub use pipeline::RenderPipeline;
pub use quad::FullscreenQuad;
pub use renderer::Renderer;
pub use shader::{ProgramDesc, ShaderProgram};
pub use target::{OFFSCREEN_FORMAT, OffscreenTarget};
pub use texture::{ChannelLayout, DrawOptions, TextureHandle, TextureShape, ValueRange};
