use crate::error::InputShapeError;
use crate::render::{TextureHandle, TextureShape};

/// A CPU-resident frame, row-major `[height, width, channels]`.
#[derive(Debug, Copy, Clone)]
pub struct HostFrame<'a> {
    pub data: &'a [f32],
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl<'a> HostFrame<'a> {
    pub fn new(data: &'a [f32], height: usize, width: usize, channels: usize) -> Self {
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    /// Checks the shape and that `data` holds exactly one value per element.
    pub fn validate(&self) -> Result<TextureShape, InputShapeError> {
        let shape = TextureShape::parse(&self.shape())?;
        if self.data.len() != shape.len() {
            return Err(InputShapeError::BufferLength {
                expected: shape.len(),
                actual: self.data.len(),
            });
        }
        Ok(shape)
    }
}

/// Source of one displayed frame.
#[derive(Debug, Copy, Clone)]
pub enum FrameInput<'a> {
    /// Uploaded by the driver before drawing.
    Host(HostFrame<'a>),
    /// Already resident on the surface's context, typically compute output.
    Device {
        texture: TextureHandle<'a>,
        shape: &'a [usize],
    },
}
