//! Compute engine and the shared-context GPU backend.
//!
//! Kernels write their results into storage buffers on the same device that
//! paints the surface. [`GpuBackend::tensor_to_texture`] turns a result into a
//! texture the renderer samples directly.

mod adapter;
mod backend;
mod engine;
mod kernel;
pub mod kernels;
mod tensor;

pub use adapter::{AdapterConfig, ComputeBackendAdapter};
pub use backend::{ComputeBackend, GpuBackend};
pub use engine::ComputeEngine;
pub use kernel::{Kernel, KernelAttrs, KernelConfig};
pub use tensor::{GpuTensor, GpuTexture};
