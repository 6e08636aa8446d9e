//! Error types for the engine.
//!
//! Construction-time errors (context, shader, registration) abort pipeline
//! use. Per-frame errors (sync, shape) are contained to the frame that raised
//! them. Context loss is fatal for everything created on that context.

use std::time::Duration;

use thiserror::Error;

use crate::device::{ApiVersion, ContextId, SurfaceId};

/// Errors raised while creating or querying a graphics context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The requested attribute set needs a feature the pipeline does not build.
    #[error("unsupported context attribute: {0}")]
    UnsupportedAttribute(&'static str),

    /// The platform could not create a presentable surface for the window.
    #[error("failed to create surface {surface}: {reason}")]
    CreateSurface { surface: SurfaceId, reason: String },

    /// No adapter matched the surface and power preference.
    #[error("no compatible GPU adapter: {0}")]
    NoAdapter(String),

    /// The adapter refused to open a device.
    #[error("failed to open GPU device: {0}")]
    Device(String),

    /// The negotiated API version is below the required one.
    #[error("unsupported API version: required {required}, negotiated {negotiated}")]
    UnsupportedVersion {
        required: ApiVersion,
        negotiated: ApiVersion,
    },

    /// The surface reports no texture format usable with the adapter.
    #[error("surface {0} reports no supported formats")]
    NoSurfaceFormat(SurfaceId),

    /// The surface already carries a context other than the one offered.
    #[error("surface {surface} is bound to context {bound}")]
    AlreadyBound { surface: SurfaceId, bound: ContextId },

    /// The device behind this context is gone. All GPU resources are invalid.
    #[error("graphics context {0} was lost")]
    Lost(ContextId),
}

/// Errors raised while registering a compute backend.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Context(#[from] ContextError),

    /// A backend with this name exists but its context is unusable.
    #[error("backend `{0}` is registered with an invalid context")]
    InvalidContext(String),

    /// A backend with this name is already registered.
    #[error("backend `{0}` is already registered")]
    DuplicateBackend(String),

    /// The reference backend has nothing to copy.
    #[error("reference backend `{0}` has no registered kernels")]
    NoReferenceKernels(String),

    /// The engine's execution context is not the one just registered.
    #[error("engine context {active:?} does not match registered context {registered}")]
    ContextMismatch {
        registered: ContextId,
        active: Option<ContextId>,
    },
}

/// Errors raised while building or querying shader programs.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader `{label}` failed to compile: {messages}")]
    Compile { label: String, messages: String },

    /// The name is not a binding declared by the program.
    #[error("program `{program}` declares no binding named `{name}`")]
    UnknownUniform { program: String, name: String },

    /// Pipeline creation was rejected by device validation.
    #[error("program `{label}` failed to link: {message}")]
    Link { label: String, message: String },
}

/// Errors raised while waiting on a GPU fence.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fence wait failed: {0}")]
    WaitFailed(String),

    #[error("fence not signaled after {0:?}")]
    Timeout(Duration),
}

/// Errors raised when an input frame has an unusable shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputShapeError {
    /// Shapes must be `[height, width, channels]`.
    #[error("expected a rank-3 shape, got {0:?}")]
    Rank(Vec<usize>),

    /// Only 3 and 4 channels are drawable.
    #[error("unsupported channel count {0}, expected 3 or 4")]
    Channels(usize),

    #[error("frame has zero extent: {0:?}")]
    Empty(Vec<usize>),

    /// Either side exceeds the device's 2D texture limit.
    #[error("frame {width}x{height} exceeds the device texture limit {max}")]
    TooLarge { width: u32, height: u32, max: u32 },

    /// The texture handle does not have the size the shape declares.
    #[error("shape declares {expected:?} (width, height), texture is {actual:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The pixel buffer does not hold `height * width * channels` values.
    #[error("buffer holds {actual} values, shape needs {expected}")]
    BufferLength { expected: usize, actual: usize },
}

/// Errors raised by a draw call.
#[derive(Debug, Error)]
pub enum DrawError {
    #[error(transparent)]
    Shape(#[from] InputShapeError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error("graphics context {0} was lost")]
    ContextLost(ContextId),

    /// Texture, surface and renderer must all live on one context.
    #[error("texture from context {texture} cannot be drawn with context {context}")]
    ContextMismatch {
        texture: ContextId,
        context: ContextId,
    },

    #[error("surface {0} has no context bound")]
    Unbound(SurfaceId),

    #[error("surface error: {0}")]
    Surface(wgpu::SurfaceError),
}

/// Errors raised by the compute engine and its kernels.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error(transparent)]
    Shape(#[from] InputShapeError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error("no backend named `{0}`")]
    UnknownBackend(String),

    #[error("no backend is registered")]
    NoBackend,

    #[error("kernel `{kernel}` is not registered for backend `{backend}`")]
    UnknownKernel { kernel: String, backend: String },

    #[error("backend `{0}` has no GPU context")]
    NotGpuBackend(String),

    #[error("kernel `{kernel}` expects {expected} inputs, got {actual}")]
    Arity {
        kernel: String,
        expected: usize,
        actual: usize,
    },

    #[error("kernel `{kernel}` is missing attribute `{attr}`")]
    MissingAttribute { kernel: String, attr: &'static str },

    #[error("tensor from context {tensor} used on context {context}")]
    ContextMismatch {
        tensor: ContextId,
        context: ContextId,
    },

    #[error("graphics context {0} was lost")]
    ContextLost(ContextId),
}

/// Errors raised while copying GPU data back to the host.
#[derive(Debug, Error)]
pub enum ReadbackError {
    #[error("surface {0} is not readable")]
    NotReadable(SurfaceId),

    #[error("buffer map failed: {0}")]
    Map(String),

    #[error("device poll failed: {0}")]
    Poll(String),

    #[error("graphics context {0} was lost")]
    ContextLost(ContextId),
}
