use std::collections::HashSet;
use std::sync::Arc;

use crate::device::{
    ApiVersion, ContextAttributes, ContextEvent, ContextRegistry, GraphicsContext, Surface,
    SurfaceId,
};
use crate::error::{ContextError, RegistrationError};
use crate::logging::TAG_ADAPTER;

use super::backend::GpuBackend;
use super::engine::ComputeEngine;
use super::kernels::REFERENCE_BACKEND;

/// Registration settings of the shared-context backend.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub name: String,
    /// Higher wins in automatic backend selection.
    pub priority: i32,
    /// Backend whose kernels are copied at registration.
    pub reference_backend: String,
    pub attributes: ContextAttributes,
    pub required_version: ApiVersion,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: "styleframe".to_string(),
            priority: 999,
            reference_backend: REFERENCE_BACKEND.to_string(),
            attributes: ContextAttributes::default(),
            required_version: ApiVersion::V2,
        }
    }
}

/// Registers a compute backend that executes on the display surface's own
/// context, so compute output is directly drawable on that surface.
pub struct ComputeBackendAdapter {
    config: AdapterConfig,
    extensions: Vec<String>,
    listening: HashSet<SurfaceId>,
}

impl ComputeBackendAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            extensions: Vec::new(),
            listening: HashSet::new(),
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Extensions recorded at the last successful registration.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Registers the backend against the surface's context.
    ///
    /// Returns the existing context unchanged when the backend is already
    /// registered with a live context. A registered backend with a dead
    /// context is an error; it is not replaced. A failure at any step removes
    /// everything registered by this call.
    pub async fn register(
        &mut self,
        engine: &mut ComputeEngine,
        contexts: &mut ContextRegistry,
        surface: &mut Surface,
    ) -> Result<Arc<GraphicsContext>, RegistrationError> {
        let name = self.config.name.clone();

        if let Some(backend) = engine.find_backend(&name) {
            return match backend.context() {
                Some(context) if context.is_alive() => Ok(Arc::clone(context)),
                _ => {
                    log::error!(
                        target: TAG_ADAPTER,
                        "backend `{name}` is registered but its context is unusable"
                    );
                    Err(RegistrationError::InvalidContext(name))
                }
            };
        }

        // 1. create or reuse the surface's context
        let context = contexts
            .acquire(surface, &self.config.attributes, self.config.required_version)
            .await
            .inspect_err(|e| log::error!(target: TAG_ADAPTER, "backend `{name}`: {e}"))?;

        // 2. the context may predate this adapter's requirement
        let negotiated = context.api_version();
        if !negotiated.satisfies(self.config.required_version) {
            let err = ContextError::UnsupportedVersion {
                required: self.config.required_version,
                negotiated,
            };
            log::error!(target: TAG_ADAPTER, "backend `{name}`: {err}");
            return Err(err.into());
        }

        // 3. lifecycle listeners, once per surface
        if self.listening.insert(surface.id()) {
            let listener_name = name.clone();
            surface.events().subscribe(move |event| match event {
                ContextEvent::Lost { context, message } => log::error!(
                    target: TAG_ADAPTER,
                    "backend `{listener_name}`: {context} lost ({message}); GPU resources must be rebuilt"
                ),
                ContextEvent::Restored { context } => {
                    log::info!(target: TAG_ADAPTER, "backend `{listener_name}`: {context} restored")
                }
                ContextEvent::CreationFailed { message } => log::error!(
                    target: TAG_ADAPTER,
                    "backend `{listener_name}`: context creation failed: {message}"
                ),
            });
        }

        // 4. bind the execution context
        let previous = engine.replace_context(Some(Arc::clone(&context)));

        // 5-7
        if let Err(e) = self.install(engine, &context) {
            engine.remove_backend(&name);
            engine.replace_context(previous);
            log::error!(target: TAG_ADAPTER, "backend `{name}`: {e}");
            return Err(e);
        }

        // 8. diagnostics
        self.extensions = context.extensions().to_vec();
        log::info!(
            target: TAG_ADAPTER,
            "backend `{name}` registered on {} (priority {}, extensions: [{}])",
            context.id(),
            self.config.priority,
            self.extensions.join(", ")
        );

        Ok(context)
    }

    fn install(
        &self,
        engine: &mut ComputeEngine,
        context: &Arc<GraphicsContext>,
    ) -> Result<(), RegistrationError> {
        let name = &self.config.name;

        engine.register_backend(
            name,
            self.config.priority,
            Box::new(GpuBackend::new(name.clone(), Arc::clone(context))),
        )?;

        let copied = engine.copy_kernels(&self.config.reference_backend, name);
        if copied == 0 && engine.kernel_count(name) == 0 {
            return Err(RegistrationError::NoReferenceKernels(
                self.config.reference_backend.clone(),
            ));
        }

        let active = engine.context().map(|c| c.id());
        if active != Some(context.id()) {
            return Err(RegistrationError::ContextMismatch {
                registered: context.id(),
                active,
            });
        }

        Ok(())
    }
}

impl Default for ComputeBackendAdapter {
    fn default() -> Self {
        Self::new(AdapterConfig::default())
    }
}
