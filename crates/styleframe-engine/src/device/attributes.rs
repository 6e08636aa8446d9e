use std::fmt;

use crate::error::ContextError;

/// Graphics API level negotiated with the adapter.
///
/// Major 2 guarantees render-to-texture, compute, blits and fences. Major 1 is
/// reported by downlevel adapters (GL ES without compute, WebGL-class limits).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
}

impl ApiVersion {
    pub const V1: ApiVersion = ApiVersion { major: 1 };
    pub const V2: ApiVersion = ApiVersion { major: 2 };

    /// Derives the API level from the adapter's downlevel capabilities.
    pub fn negotiate(caps: &wgpu::DownlevelCapabilities) -> Self {
        let compute = caps
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);

        if compute && shader_model_rank(caps.shader_model) >= 5 {
            Self::V2
        } else {
            Self::V1
        }
    }

    /// Returns true when this version satisfies `required`.
    pub fn satisfies(self, required: ApiVersion) -> bool {
        self.major >= required.major
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.0", self.major)
    }
}

fn shader_model_rank(model: wgpu::ShaderModel) -> u32 {
    match model {
        wgpu::ShaderModel::Sm2 => 2,
        wgpu::ShaderModel::Sm4 => 4,
        wgpu::ShaderModel::Sm5 => 5,
    }
}

/// Fixed attribute set a context is created with.
///
/// The pipeline draws one opaque quad, so every buffer the display does not
/// need is off by default.
#[derive(Debug, Clone)]
pub struct ContextAttributes {
    /// Composite the surface with the desktop using its alpha channel.
    pub alpha: bool,

    /// Multisampled surface. Not supported by the single-quad pipeline.
    pub antialias: bool,

    /// Treat surface color as premultiplied by alpha. Only meaningful with `alpha`.
    pub premultiplied_alpha: bool,

    /// Depth attachment. Not supported by the single-quad pipeline.
    pub depth: bool,

    /// Stencil attachment. Not supported by the single-quad pipeline.
    pub stencil: bool,

    /// Keep the previous surface contents instead of clearing before the blit.
    pub preserve_drawing_buffer: bool,

    pub power_preference: wgpu::PowerPreference,

    pub backends: wgpu::Backends,

    pub present_mode: wgpu::PresentMode,

    /// Prefer an sRGB surface format when available.
    ///
    /// Off by default: model output is already display-referred.
    pub prefer_srgb: bool,

    /// Desired maximum frame latency for the swapchain.
    ///
    /// This value is a hint; support depends on platform/backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self {
            alpha: false,
            antialias: false,
            premultiplied_alpha: false,
            depth: false,
            stencil: false,
            preserve_drawing_buffer: false,
            power_preference: wgpu::PowerPreference::HighPerformance,
            backends: wgpu::Backends::all(),
            present_mode: wgpu::PresentMode::Fifo,
            prefer_srgb: false,
            desired_maximum_frame_latency: 2,
        }
    }
}

impl ContextAttributes {
    /// Rejects attributes that would need buffers the pipeline never allocates.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.antialias {
            return Err(ContextError::UnsupportedAttribute("antialias"));
        }
        if self.depth {
            return Err(ContextError::UnsupportedAttribute("depth"));
        }
        if self.stencil {
            return Err(ContextError::UnsupportedAttribute("stencil"));
        }
        Ok(())
    }

    /// Composite alpha mode requested by this attribute set.
    pub fn alpha_mode(&self) -> wgpu::CompositeAlphaMode {
        match (self.alpha, self.premultiplied_alpha) {
            (false, _) => wgpu::CompositeAlphaMode::Opaque,
            (true, true) => wgpu::CompositeAlphaMode::PreMultiplied,
            (true, false) => wgpu::CompositeAlphaMode::PostMultiplied,
        }
    }

    /// Load op for the pass that writes the visible surface.
    pub fn surface_load_op(&self) -> wgpu::LoadOp<wgpu::Color> {
        if self.preserve_drawing_buffer {
            wgpu::LoadOp::Load
        } else {
            wgpu::LoadOp::Clear(wgpu::Color::BLACK)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── ApiVersion ────────────────────────────────────────────────────────

    #[test]
    fn version_ordering() {
        assert!(ApiVersion::V2.satisfies(ApiVersion::V2));
        assert!(ApiVersion::V2.satisfies(ApiVersion::V1));
        assert!(!ApiVersion::V1.satisfies(ApiVersion::V2));
        assert_eq!(ApiVersion::V2.to_string(), "2.0");
    }

    #[test]
    fn downlevel_adapter_negotiates_v1() {
        let caps = wgpu::DownlevelCapabilities {
            flags: wgpu::DownlevelFlags::empty(),
            limits: Default::default(),
            shader_model: wgpu::ShaderModel::Sm5,
        };
        assert_eq!(ApiVersion::negotiate(&caps), ApiVersion::V1);
    }

    #[test]
    fn compliant_adapter_negotiates_v2() {
        let caps = wgpu::DownlevelCapabilities::default();
        assert_eq!(ApiVersion::negotiate(&caps), ApiVersion::V2);
    }

    // ── ContextAttributes ─────────────────────────────────────────────────

    #[test]
    fn defaults_are_minimal() {
        let attrs = ContextAttributes::default();
        assert!(!attrs.alpha);
        assert!(!attrs.antialias);
        assert!(!attrs.premultiplied_alpha);
        assert!(!attrs.depth);
        assert!(!attrs.stencil);
        assert!(!attrs.preserve_drawing_buffer);
        assert!(attrs.validate().is_ok());
        assert_eq!(attrs.alpha_mode(), wgpu::CompositeAlphaMode::Opaque);
    }

    #[test]
    fn unsupported_buffers_are_rejected() {
        let attrs = ContextAttributes {
            depth: true,
            ..Default::default()
        };
        assert!(matches!(
            attrs.validate(),
            Err(ContextError::UnsupportedAttribute("depth"))
        ));
    }

    #[test]
    fn preserve_switches_load_op() {
        let attrs = ContextAttributes {
            preserve_drawing_buffer: true,
            ..Default::default()
        };
        assert!(matches!(attrs.surface_load_op(), wgpu::LoadOp::Load));
    }
}
