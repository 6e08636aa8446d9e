use std::fmt;
use std::sync::Arc;

use crate::error::ComputeError;

use super::backend::ComputeBackend;
use super::tensor::GpuTensor;

/// Named scalar attributes passed to a kernel.
#[derive(Debug, Clone, Default)]
pub struct KernelAttrs {
    values: Vec<(&'static str, f32)>,
}

impl KernelAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: f32) -> Self {
        self.values.retain(|(n, _)| *n != name);
        self.values.push((name, value));
        self
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    /// Looks up a required attribute of `kernel`.
    pub fn require(&self, kernel: &str, name: &'static str) -> Result<f32, ComputeError> {
        self.get(name).ok_or_else(|| ComputeError::MissingAttribute {
            kernel: kernel.to_string(),
            attr: name,
        })
    }
}

/// An operation a backend can execute.
pub trait Kernel: Send + Sync {
    fn run(
        &self,
        backend: &dyn ComputeBackend,
        inputs: &[&GpuTensor],
        attrs: &KernelAttrs,
    ) -> Result<GpuTensor, ComputeError>;
}

/// Registration of one kernel implementation for one backend.
#[derive(Clone)]
pub struct KernelConfig {
    pub kernel_name: String,
    pub backend_name: String,
    pub kernel: Arc<dyn Kernel>,
}

impl KernelConfig {
    pub fn new(
        kernel_name: impl Into<String>,
        backend_name: impl Into<String>,
        kernel: impl Kernel + 'static,
    ) -> Self {
        Self {
            kernel_name: kernel_name.into(),
            backend_name: backend_name.into(),
            kernel: Arc::new(kernel),
        }
    }

    /// The same implementation registered under another backend.
    pub fn for_backend(&self, backend_name: &str) -> Self {
        Self {
            kernel_name: self.kernel_name.clone(),
            backend_name: backend_name.to_string(),
            kernel: Arc::clone(&self.kernel),
        }
    }
}

impl fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelConfig")
            .field("kernel_name", &self.kernel_name)
            .field("backend_name", &self.backend_name)
            .finish_non_exhaustive()
    }
}

/// Fails unless exactly one input is given.
pub(crate) fn single_input<'t>(
    kernel: &str,
    inputs: &[&'t GpuTensor],
) -> Result<&'t GpuTensor, ComputeError> {
    match inputs {
        [input] => Ok(input),
        _ => Err(ComputeError::Arity {
            kernel: kernel.to_string(),
            expected: 1,
            actual: inputs.len(),
        }),
    }
}
