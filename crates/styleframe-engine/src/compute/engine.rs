use std::collections::HashMap;
use std::sync::Arc;

use crate::device::GraphicsContext;
use crate::error::{ComputeError, RegistrationError};

use super::backend::ComputeBackend;
use super::kernel::{KernelAttrs, KernelConfig};
use super::kernels::reference_kernels;
use super::tensor::GpuTensor;

struct BackendEntry {
    priority: i32,
    backend: Box<dyn ComputeBackend>,
}

/// Registry of compute backends and their kernels.
///
/// Backends are selected explicitly by name or automatically by priority
/// (higher wins). Kernels are registered per (kernel, backend) pair. The
/// engine also holds the execution context shared with the renderer.
#[derive(Default)]
pub struct ComputeEngine {
    backends: HashMap<String, BackendEntry>,
    kernels: HashMap<(String, String), KernelConfig>,
    active: Option<String>,
    context: Option<Arc<GraphicsContext>>,
}

impl ComputeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with the built-in kernels registered for the reference backend.
    pub fn with_reference_kernels() -> Self {
        let mut engine = Self::new();
        for config in reference_kernels() {
            engine.register_kernel(config);
        }
        engine
    }

    // ── backends ──────────────────────────────────────────────────────────

    pub fn register_backend(
        &mut self,
        name: &str,
        priority: i32,
        backend: Box<dyn ComputeBackend>,
    ) -> Result<(), RegistrationError> {
        if self.backends.contains_key(name) {
            return Err(RegistrationError::DuplicateBackend(name.to_string()));
        }
        self.backends
            .insert(name.to_string(), BackendEntry { priority, backend });
        log::debug!("backend `{name}` registered with priority {priority}");
        Ok(())
    }

    /// Removes a backend together with every kernel registered for it.
    pub fn remove_backend(&mut self, name: &str) -> Option<Box<dyn ComputeBackend>> {
        let entry = self.backends.remove(name)?;
        self.kernels.retain(|(_, backend), _| backend != name);
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        Some(entry.backend)
    }

    pub fn find_backend(&self, name: &str) -> Option<&dyn ComputeBackend> {
        self.backends.get(name).map(|e| e.backend.as_ref())
    }

    pub fn backend_priority(&self, name: &str) -> Option<i32> {
        self.backends.get(name).map(|e| e.priority)
    }

    pub fn backend_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Highest-priority backend. Ties resolve to the smaller name.
    pub fn best_backend(&self) -> Option<&str> {
        self.backends
            .iter()
            .max_by(|(a_name, a), (b_name, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b_name.cmp(a_name))
            })
            .map(|(name, _)| name.as_str())
    }

    /// Selects a backend explicitly.
    pub fn set_backend(&mut self, name: &str) -> Result<(), ComputeError> {
        if !self.backends.contains_key(name) {
            return Err(ComputeError::UnknownBackend(name.to_string()));
        }
        self.active = Some(name.to_string());
        Ok(())
    }

    /// Explicitly selected backend, or the best one.
    pub fn active_backend(&self) -> Option<&str> {
        self.active.as_deref().or_else(|| self.best_backend())
    }

    // ── kernels ───────────────────────────────────────────────────────────

    /// Registers a kernel. Returns false when the pair was already registered;
    /// the existing registration is kept.
    pub fn register_kernel(&mut self, config: KernelConfig) -> bool {
        let key = (config.kernel_name.clone(), config.backend_name.clone());
        if self.kernels.contains_key(&key) {
            return false;
        }
        self.kernels.insert(key, config);
        true
    }

    pub fn kernels_for(&self, backend: &str) -> Vec<&KernelConfig> {
        let mut kernels: Vec<&KernelConfig> = self
            .kernels
            .values()
            .filter(|k| k.backend_name == backend)
            .collect();
        kernels.sort_by(|a, b| a.kernel_name.cmp(&b.kernel_name));
        kernels
    }

    pub fn kernel_count(&self, backend: &str) -> usize {
        self.kernels
            .values()
            .filter(|k| k.backend_name == backend)
            .count()
    }

    /// Registers every kernel of `from` under `to`. Returns how many were new.
    pub fn copy_kernels(&mut self, from: &str, to: &str) -> usize {
        let copies: Vec<KernelConfig> = self
            .kernels_for(from)
            .into_iter()
            .map(|k| k.for_backend(to))
            .collect();
        let mut added = 0;
        for config in copies {
            if self.register_kernel(config) {
                added += 1;
            }
        }
        added
    }

    // ── execution context ─────────────────────────────────────────────────

    pub fn context(&self) -> Option<&Arc<GraphicsContext>> {
        self.context.as_ref()
    }

    /// Installs the execution context and returns the previous one.
    pub fn replace_context(
        &mut self,
        context: Option<Arc<GraphicsContext>>,
    ) -> Option<Arc<GraphicsContext>> {
        std::mem::replace(&mut self.context, context)
    }

    // ── execution ─────────────────────────────────────────────────────────

    /// Runs `kernel` on the active backend.
    pub fn run(
        &self,
        kernel: &str,
        inputs: &[&GpuTensor],
        attrs: &KernelAttrs,
    ) -> Result<GpuTensor, ComputeError> {
        let backend = self.active_backend().ok_or(ComputeError::NoBackend)?;
        self.run_on(backend, kernel, inputs, attrs)
    }

    /// Runs `kernel` on a named backend.
    pub fn run_on(
        &self,
        backend: &str,
        kernel: &str,
        inputs: &[&GpuTensor],
        attrs: &KernelAttrs,
    ) -> Result<GpuTensor, ComputeError> {
        let entry = self
            .backends
            .get(backend)
            .ok_or_else(|| ComputeError::UnknownBackend(backend.to_string()))?;
        let config = self
            .kernels
            .get(&(kernel.to_string(), backend.to_string()))
            .ok_or_else(|| ComputeError::UnknownKernel {
                kernel: kernel.to_string(),
                backend: backend.to_string(),
            })?;
        config.kernel.run(entry.backend.as_ref(), inputs, attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::compute::kernels::{AFFINE, REFERENCE_BACKEND};

    /// Backend without a device.
    struct HostBackend(&'static str);

    impl ComputeBackend for HostBackend {
        fn name(&self) -> &str {
            self.0
        }

        fn context(&self) -> Option<&Arc<GraphicsContext>> {
            None
        }
    }

    fn engine_with(backends: &[(&'static str, i32)]) -> ComputeEngine {
        let mut engine = ComputeEngine::with_reference_kernels();
        for &(name, priority) in backends {
            engine
                .register_backend(name, priority, Box::new(HostBackend(name)))
                .unwrap();
        }
        engine
    }

    // ── selection ─────────────────────────────────────────────────────────

    #[test]
    fn highest_priority_wins() {
        let engine = engine_with(&[("cpu", 1), ("styleframe", 999), ("webgl", 2)]);
        assert_eq!(engine.best_backend(), Some("styleframe"));
        assert_eq!(engine.active_backend(), Some("styleframe"));
    }

    #[test]
    fn explicit_selection_overrides_priority() {
        let mut engine = engine_with(&[("cpu", 1), ("styleframe", 999)]);
        engine.set_backend("cpu").unwrap();
        assert_eq!(engine.active_backend(), Some("cpu"));
        assert!(matches!(
            engine.set_backend("missing"),
            Err(ComputeError::UnknownBackend(_))
        ));
    }

    #[test]
    fn duplicate_backend_is_rejected() {
        let mut engine = engine_with(&[("cpu", 1)]);
        let again = engine.register_backend("cpu", 5, Box::new(HostBackend("cpu")));
        assert!(matches!(again, Err(RegistrationError::DuplicateBackend(_))));
        assert_eq!(engine.backend_priority("cpu"), Some(1));
    }

    #[test]
    fn backend_without_context_is_not_alive() {
        let engine = engine_with(&[("cpu", 1)]);
        let backend = engine.find_backend("cpu").unwrap();
        assert!(!backend.is_alive());
        assert!(backend.as_gpu().is_none());
    }

    // ── kernels ───────────────────────────────────────────────────────────

    #[test]
    fn copy_kernels_is_idempotent() {
        let mut engine = engine_with(&[("styleframe", 999)]);
        let reference = engine.kernel_count(REFERENCE_BACKEND);

        assert_eq!(engine.copy_kernels(REFERENCE_BACKEND, "styleframe"), reference);
        assert_eq!(engine.copy_kernels(REFERENCE_BACKEND, "styleframe"), 0);
        assert_eq!(engine.kernel_count("styleframe"), reference);
    }

    #[test]
    fn removing_backend_drops_its_kernels() {
        let mut engine = engine_with(&[("styleframe", 999)]);
        engine.copy_kernels(REFERENCE_BACKEND, "styleframe");
        engine.set_backend("styleframe").unwrap();

        assert!(engine.remove_backend("styleframe").is_some());
        assert_eq!(engine.kernel_count("styleframe"), 0);
        assert!(engine.kernel_count(REFERENCE_BACKEND) > 0);
        assert_eq!(engine.active_backend(), None);
    }

    #[test]
    fn run_without_backend_fails() {
        let engine = ComputeEngine::with_reference_kernels();
        let result = engine.run(AFFINE, &[], &KernelAttrs::new());
        assert!(matches!(result, Err(ComputeError::NoBackend)));
    }

    #[test]
    fn run_reports_missing_kernel() {
        let engine = engine_with(&[("cpu", 1)]);
        let result = engine.run(AFFINE, &[], &KernelAttrs::new());
        assert!(matches!(result, Err(ComputeError::UnknownKernel { .. })));
    }

    #[test]
    fn inputs_are_checked_before_execution() {
        let mut engine = engine_with(&[("cpu", 1)]);
        engine.copy_kernels(REFERENCE_BACKEND, "cpu");
        let result = engine.run(AFFINE, &[], &KernelAttrs::new());
        assert!(matches!(result, Err(ComputeError::Arity { .. })));
    }
}
