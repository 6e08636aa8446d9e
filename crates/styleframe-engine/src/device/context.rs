use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::ContextError;
use crate::logging::TAG_CONTEXT;

use super::attributes::{ApiVersion, ContextAttributes};
use super::surface::Surface;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a graphics context.
///
/// Compared structurally by caches instead of comparing object addresses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Lifecycle notifications delivered to listeners installed on a surface.
#[derive(Debug, Clone)]
pub enum ContextEvent {
    /// The device is gone. Every resource created on it is invalid.
    Lost { context: ContextId, message: String },
    /// A replacement device is usable again.
    ///
    /// wgpu never restores a lost device; embedders that rebuild a context
    /// themselves report it through [`ContextEvents::emit`].
    Restored { context: ContextId },
    /// Creating a context for the surface failed.
    CreationFailed { message: String },
}

type Listener = Box<dyn Fn(&ContextEvent) + Send + Sync>;

/// Listener list shared between a surface and the contexts created on it.
#[derive(Default)]
pub struct ContextEvents {
    listeners: Mutex<Vec<Listener>>,
}

impl ContextEvents {
    pub fn subscribe(&self, listener: impl Fn(&ContextEvent) + Send + Sync + 'static) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|p| p.into_inner());
        listeners.push(Box::new(listener));
    }

    pub fn emit(&self, event: &ContextEvent) {
        let listeners = self.listeners.lock().unwrap_or_else(|p| p.into_inner());
        for listener in listeners.iter() {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Adapter features reported as extensions, by display name.
const EXTENSIONS: &[(wgpu::Features, &str)] = &[
    (wgpu::Features::FLOAT32_FILTERABLE, "float32-filterable"),
    (wgpu::Features::TIMESTAMP_QUERY, "timestamp-query"),
    (wgpu::Features::SHADER_F16, "shader-f16"),
    (wgpu::Features::TEXTURE_FORMAT_16BIT_NORM, "texture-format-16bit-norm"),
    (wgpu::Features::DEPTH_CLIP_CONTROL, "depth-clip-control"),
    (wgpu::Features::INDIRECT_FIRST_INSTANCE, "indirect-first-instance"),
    (wgpu::Features::TEXTURE_COMPRESSION_BC, "texture-compression-bc"),
    (wgpu::Features::RG11B10UFLOAT_RENDERABLE, "rg11b10ufloat-renderable"),
    (wgpu::Features::BGRA8UNORM_STORAGE, "bgra8unorm-storage"),
];

fn supported_extensions(features: wgpu::Features) -> Vec<String> {
    EXTENSIONS
        .iter()
        .filter(|(feature, _)| features.contains(*feature))
        .map(|(_, name)| (*name).to_string())
        .collect()
}

/// One hardware-accelerated context bound to a display surface.
///
/// Owns the device and queue shared by the compute backend and the renderer.
/// Handed out as `Arc<GraphicsContext>`; identity is [`ContextId`].
pub struct GraphicsContext {
    /// Key used by pipeline caches and texture handles.
    id: ContextId,
    /// API level the context was created at.
    version: ApiVersion,
    /// Attributes requested at creation, after validation.
    attributes: ContextAttributes,
    /// Display names of the optional features the adapter supports.
    extensions: Vec<String>,
    info: wgpu::AdapterInfo,
    /// Set by the device-lost callback. Never cleared.
    lost: Arc<AtomicBool>,

    /// Logical device all resources are created on.
    device: wgpu::Device,
    /// Submission queue for uploads, compute passes and draws.
    queue: wgpu::Queue,
    /// Physical adapter, kept for feature queries.
    adapter: wgpu::Adapter,
    // Dropped last.
    _instance: wgpu::Instance,
}

impl GraphicsContext {
    /// Creates a context for `surface` and binds it.
    ///
    /// Fails when the surface already carries a context, when no compatible
    /// adapter exists, or when the negotiated version is below `required`.
    pub async fn create(
        surface: &mut Surface,
        attributes: &ContextAttributes,
        required: ApiVersion,
    ) -> Result<Arc<Self>, ContextError> {
        attributes.validate()?;

        if let Some(bound) = surface.bound_context() {
            return Err(ContextError::AlreadyBound {
                surface: surface.id(),
                bound,
            });
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: attributes.backends,
            ..Default::default()
        });

        let swapchain = surface.create_wgpu_surface(&instance)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: attributes.power_preference,
                compatible_surface: swapchain.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| ContextError::NoAdapter(e.to_string()))?;

        let version = ApiVersion::negotiate(&adapter.get_downlevel_capabilities());
        if !version.satisfies(required) {
            return Err(ContextError::UnsupportedVersion {
                required,
                negotiated: version,
            });
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("styleframe device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| ContextError::Device(e.to_string()))?;

        let id = ContextId::next();
        let lost = Arc::new(AtomicBool::new(false));
        {
            let lost = Arc::clone(&lost);
            let events = surface.events();
            device.set_device_lost_callback(move |reason, message| {
                lost.store(true, Ordering::Release);
                if let wgpu::DeviceLostReason::Destroyed = reason {
                    log::debug!(target: TAG_CONTEXT, "{id} destroyed");
                    return;
                }
                log::error!(target: TAG_CONTEXT, "{id} lost ({reason:?}): {message}");
                events.emit(&ContextEvent::Lost {
                    context: id,
                    message,
                });
            });
        }

        surface.attach(id, &adapter, &device, swapchain, attributes)?;

        let info = adapter.get_info();
        let extensions = supported_extensions(adapter.features());

        log::info!(
            target: TAG_CONTEXT,
            "{id} created on surface {}: {} ({:?}), API {version}",
            surface.id(),
            info.name,
            info.backend
        );

        Ok(Arc::new(Self {
            id,
            version,
            attributes: attributes.clone(),
            extensions,
            info,
            lost,
            device,
            queue,
            adapter,
            _instance: instance,
        }))
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn api_version(&self) -> ApiVersion {
        self.version
    }

    pub fn attributes(&self) -> &ContextAttributes {
        &self.attributes
    }

    /// Optional features the adapter supports, queried once at creation.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Returns `Some(name)` when the adapter supports `feature` and it is one of
    /// the tracked extensions.
    pub fn extension(&self, feature: wgpu::Features) -> Option<&'static str> {
        EXTENSIONS
            .iter()
            .find(|(f, _)| *f == feature && self.adapter.features().contains(feature))
            .map(|(_, name)| *name)
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Cheap liveness query. Does not touch the device.
    pub fn is_alive(&self) -> bool {
        !self.lost.load(Ordering::Acquire)
    }

    /// Simulates device loss.
    #[cfg(test)]
    pub(crate) fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
    }

    /// Returns `ContextError::Lost` once the device is gone.
    pub fn check_alive(&self) -> Result<(), ContextError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(ContextError::Lost(self.id))
        }
    }
}

impl fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsContext")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("adapter", &self.info.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_context;

    #[test]
    fn context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn extensions_follow_feature_table() {
        let names = supported_extensions(
            wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::SHADER_F16,
        );
        assert_eq!(names, vec!["timestamp-query", "shader-f16"]);
        assert!(supported_extensions(wgpu::Features::empty()).is_empty());
    }

    #[test]
    fn listeners_receive_events() {
        let events = ContextEvents::default();
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        events.subscribe(move |event| {
            if let ContextEvent::CreationFailed { .. } = event {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });

        events.emit(&ContextEvent::CreationFailed {
            message: "no adapter".into(),
        });
        events.emit(&ContextEvent::Restored {
            context: ContextId::next(),
        });

        assert_eq!(events.len(), 1);
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn headless_context_is_alive() {
        let Some((surface, ctx)) = test_context(8, 8) else {
            return;
        };
        assert!(ctx.is_alive());
        assert!(ctx.check_alive().is_ok());
        assert_eq!(surface.bound_context(), Some(ctx.id()));
    }

    #[test]
    fn second_context_on_bound_surface_is_rejected() {
        let Some((mut surface, _ctx)) = test_context(8, 8) else {
            return;
        };
        let again = pollster::block_on(GraphicsContext::create(
            &mut surface,
            &ContextAttributes::default(),
            ApiVersion::V1,
        ));
        assert!(matches!(again, Err(ContextError::AlreadyBound { .. })));
    }
}
