use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ContextError;
use crate::logging::TAG_CONTEXT;

use super::attributes::{ApiVersion, ContextAttributes};
use super::context::{ContextEvent, GraphicsContext};
use super::surface::{Surface, SurfaceId};

/// Contexts keyed by surface identity, owned by the caller.
///
/// At most one context per surface. Re-acquiring for a surface returns the
/// existing context while it is alive.
#[derive(Default)]
pub struct ContextRegistry {
    contexts: HashMap<SurfaceId, Arc<GraphicsContext>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the surface's context, creating and binding it on first use.
    ///
    /// A lost context is reported, never silently replaced. Creation failures
    /// are logged and delivered to the surface's listeners.
    pub async fn acquire(
        &mut self,
        surface: &mut Surface,
        attributes: &ContextAttributes,
        required: ApiVersion,
    ) -> Result<Arc<GraphicsContext>, ContextError> {
        if let Some(existing) = self.contexts.get(&surface.id()) {
            if let Err(e) = existing.check_alive() {
                log::error!(target: TAG_CONTEXT, "{}: {e}", surface.id());
                return Err(e);
            }
            return Ok(Arc::clone(existing));
        }

        match GraphicsContext::create(surface, attributes, required).await {
            Ok(context) => {
                self.contexts.insert(surface.id(), Arc::clone(&context));
                Ok(context)
            }
            Err(e) => {
                log::error!(
                    target: TAG_CONTEXT,
                    "context creation failed for {}: {e}",
                    surface.id()
                );
                surface.events().emit(&ContextEvent::CreationFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub fn get(&self, surface: SurfaceId) -> Option<&Arc<GraphicsContext>> {
        self.contexts.get(&surface)
    }

    /// Drops the registry's handle and unbinds the surface.
    pub fn release(&mut self, surface: &mut Surface) -> Option<Arc<GraphicsContext>> {
        surface.detach();
        self.contexts.remove(&surface.id())
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
