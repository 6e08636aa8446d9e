use crate::device::{ContextId, GraphicsContext};
use crate::error::InputShapeError;

/// Channel layout of a drawable frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Alpha forced to 1.0.
    Rgb,
    /// Source alpha passed through.
    Rgba,
}

impl ChannelLayout {
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgba => 4,
        }
    }
}

/// A validated `[height, width, channels]` frame shape.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureShape {
    pub height: u32,
    pub width: u32,
    pub layout: ChannelLayout,
}

impl TextureShape {
    /// Validates a `[height, width, channels]` shape.
    pub fn parse(shape: &[usize]) -> Result<Self, InputShapeError> {
        let &[height, width, channels] = shape else {
            return Err(InputShapeError::Rank(shape.to_vec()));
        };

        let layout = match channels {
            3 => ChannelLayout::Rgb,
            4 => ChannelLayout::Rgba,
            other => return Err(InputShapeError::Channels(other)),
        };

        if height == 0 || width == 0 {
            return Err(InputShapeError::Empty(shape.to_vec()));
        }

        let (Ok(height), Ok(width)) = (u32::try_from(height), u32::try_from(width)) else {
            return Err(InputShapeError::Rank(shape.to_vec()));
        };

        Ok(Self {
            height,
            width,
            layout,
        })
    }

    /// Number of values a tightly packed buffer of this shape holds.
    pub fn len(&self) -> usize {
        self.height as usize * self.width as usize * self.layout.channels()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rejects extents the device cannot allocate as a 2D texture.
    pub fn check_limits(&self, limits: &wgpu::Limits) -> Result<(), InputShapeError> {
        let max = limits.max_texture_dimension_2d;
        if self.width > max || self.height > max {
            return Err(InputShapeError::TooLarge {
                width: self.width,
                height: self.height,
                max,
            });
        }
        Ok(())
    }

    pub fn dims(&self) -> [usize; 3] {
        [
            self.height as usize,
            self.width as usize,
            self.layout.channels(),
        ]
    }
}

/// How sampled values map to display intensity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ValueRange {
    /// Values are already in 0..1.
    #[default]
    Unit,
    /// Values are in 0..255.
    Byte,
    /// A red channel above 1.0 means 0..255 data; alpha is then forced to 1.0.
    Auto,
}

impl ValueRange {
    pub(crate) fn code(self) -> u32 {
        match self {
            ValueRange::Unit => 0,
            ValueRange::Byte => 1,
            ValueRange::Auto => 2,
        }
    }
}

/// Per-renderer draw settings.
#[derive(Debug, Clone, Default)]
pub struct DrawOptions {
    pub value_range: ValueRange,
}

/// Non-owning handle to a texture created elsewhere on a known context.
///
/// The texture must be a 2D float texture with `TEXTURE_BINDING` usage. The
/// renderer samples it and never frees it.
#[derive(Debug, Copy, Clone)]
pub struct TextureHandle<'a> {
    view: &'a wgpu::TextureView,
    width: u32,
    height: u32,
    context: ContextId,
}

impl<'a> TextureHandle<'a> {
    pub fn new(context: &GraphicsContext, view: &'a wgpu::TextureView, width: u32, height: u32) -> Self {
        Self {
            view,
            width,
            height,
            context: context.id(),
        }
    }

    pub(crate) fn from_parts(
        view: &'a wgpu::TextureView,
        width: u32,
        height: u32,
        context: ContextId,
    ) -> Self {
        Self {
            view,
            width,
            height,
            context,
        }
    }

    pub fn view(&self) -> &'a wgpu::TextureView {
        self.view
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Context the texture was created on.
    pub fn context(&self) -> ContextId {
        self.context
    }
}
