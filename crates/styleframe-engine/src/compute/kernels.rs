//! Pre/post-processing kernels of the reference wgpu backend.

use crate::error::{ComputeError, InputShapeError};

use super::backend::{ComputeBackend, ElementwiseParams, GpuBackend};
use super::kernel::{Kernel, KernelAttrs, KernelConfig, single_input};
use super::tensor::GpuTensor;

/// Name of the backend the built-in kernels are registered for.
pub const REFERENCE_BACKEND: &str = "wgpu";

pub const AFFINE: &str = "Affine";
pub const CLIP_BY_VALUE: &str = "ClipByValue";
pub const APPEND_ALPHA: &str = "AppendAlpha";

fn gpu<'a>(
    kernel: &str,
    backend: &'a dyn ComputeBackend,
) -> Result<&'a GpuBackend, ComputeError> {
    backend.as_gpu().ok_or_else(|| {
        log::error!("kernel `{kernel}` needs a GPU backend, got `{}`", backend.name());
        ComputeError::NotGpuBackend(backend.name().to_string())
    })
}

/// `x * scale + offset`.
pub struct Affine;

impl Kernel for Affine {
    fn run(
        &self,
        backend: &dyn ComputeBackend,
        inputs: &[&GpuTensor],
        attrs: &KernelAttrs,
    ) -> Result<GpuTensor, ComputeError> {
        let input = single_input(AFFINE, inputs)?;
        let params = ElementwiseParams {
            scale: attrs.require(AFFINE, "scale")?,
            offset: attrs.require(AFFINE, "offset")?,
            ..Default::default()
        };
        gpu(AFFINE, backend)?.run_elementwise(
            "affine",
            input,
            input.shape().to_vec(),
            params,
            input.len() as u32,
        )
    }
}

/// Clamps every value to `[min, max]`.
pub struct ClipByValue;

impl Kernel for ClipByValue {
    fn run(
        &self,
        backend: &dyn ComputeBackend,
        inputs: &[&GpuTensor],
        attrs: &KernelAttrs,
    ) -> Result<GpuTensor, ComputeError> {
        let input = single_input(CLIP_BY_VALUE, inputs)?;
        let params = ElementwiseParams {
            lo: attrs.require(CLIP_BY_VALUE, "min")?,
            hi: attrs.require(CLIP_BY_VALUE, "max")?,
            ..Default::default()
        };
        gpu(CLIP_BY_VALUE, backend)?.run_elementwise(
            "clip_by_value",
            input,
            input.shape().to_vec(),
            params,
            input.len() as u32,
        )
    }
}

/// Restacks `[.., 3]` into `[.., 4]` with a constant alpha (`alpha`).
pub struct AppendAlpha;

impl Kernel for AppendAlpha {
    fn run(
        &self,
        backend: &dyn ComputeBackend,
        inputs: &[&GpuTensor],
        attrs: &KernelAttrs,
    ) -> Result<GpuTensor, ComputeError> {
        let input = single_input(APPEND_ALPHA, inputs)?;
        let Some((&channels, outer)) = input.shape().split_last() else {
            return Err(InputShapeError::Rank(input.shape().to_vec()).into());
        };
        if channels != 3 {
            return Err(InputShapeError::Channels(channels).into());
        }

        let mut out_shape = outer.to_vec();
        out_shape.push(4);
        let params = ElementwiseParams {
            fill: attrs.require(APPEND_ALPHA, "alpha")?,
            ..Default::default()
        };
        gpu(APPEND_ALPHA, backend)?.run_elementwise(
            "append_alpha",
            input,
            out_shape,
            params,
            (input.len() / 3) as u32,
        )
    }
}

/// Kernel registrations for the reference backend.
pub fn reference_kernels() -> Vec<KernelConfig> {
    vec![
        KernelConfig::new(AFFINE, REFERENCE_BACKEND, Affine),
        KernelConfig::new(CLIP_BY_VALUE, REFERENCE_BACKEND, ClipByValue),
        KernelConfig::new(APPEND_ALPHA, REFERENCE_BACKEND, AppendAlpha),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> Option<(crate::device::Surface, GpuBackend)> {
        let (surface, ctx) = crate::device::test_context(4, 4)?;
        Some((surface, GpuBackend::new(REFERENCE_BACKEND, ctx)))
    }

    fn read(backend: &GpuBackend, tensor: &GpuTensor) -> Vec<f32> {
        crate::device::block_on(tensor.read(backend.gpu_context())).unwrap()
    }

    #[test]
    fn affine_maps_bytes_to_signed_unit() {
        let Some((_surface, backend)) = backend() else {
            return;
        };
        let input = GpuTensor::upload(backend.gpu_context(), &[0.0, 127.5, 255.0], &[1, 1, 3]).unwrap();
        let attrs = KernelAttrs::new()
            .with("scale", 1.0 / 127.5)
            .with("offset", -1.0);

        let out = Affine.run(&backend, &[&input], &attrs).unwrap();
        let values = read(&backend, &out);

        assert_eq!(out.shape(), &[1, 1, 3]);
        for (got, want) in values.iter().zip([-1.0f32, 0.0, 1.0]) {
            assert!((got - want).abs() < 1e-5, "{got} != {want}");
        }
    }

    #[test]
    fn clip_bounds_values() {
        let Some((_surface, backend)) = backend() else {
            return;
        };
        let input = GpuTensor::upload(backend.gpu_context(), &[-4.0, 12.0, 300.0], &[3]).unwrap();
        let attrs = KernelAttrs::new().with("min", 0.0).with("max", 255.0);

        let out = ClipByValue.run(&backend, &[&input], &attrs).unwrap();
        assert_eq!(read(&backend, &out), vec![0.0, 12.0, 255.0]);
    }

    #[test]
    fn append_alpha_restacks_channels() {
        let Some((_surface, backend)) = backend() else {
            return;
        };
        let input =
            GpuTensor::upload(backend.gpu_context(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[1, 2, 3])
                .unwrap();
        let attrs = KernelAttrs::new().with("alpha", 255.0);

        let out = AppendAlpha.run(&backend, &[&input], &attrs).unwrap();
        assert_eq!(out.shape(), &[1, 2, 4]);
        assert_eq!(
            read(&backend, &out),
            vec![1.0, 2.0, 3.0, 255.0, 4.0, 5.0, 6.0, 255.0]
        );
    }

    #[test]
    fn append_alpha_needs_three_channels() {
        let Some((_surface, backend)) = backend() else {
            return;
        };
        let input = GpuTensor::upload(backend.gpu_context(), &[0.0; 4], &[1, 1, 4]).unwrap();
        let result = AppendAlpha.run(&backend, &[&input], &KernelAttrs::new().with("alpha", 1.0));

        assert!(matches!(
            result,
            Err(ComputeError::Shape(InputShapeError::Channels(4)))
        ));
    }

    #[test]
    fn wrong_arity_is_reported() {
        let Some((_surface, backend)) = backend() else {
            return;
        };
        let input = GpuTensor::upload(backend.gpu_context(), &[0.0], &[1]).unwrap();
        let result = Affine.run(&backend, &[&input, &input], &KernelAttrs::new());

        assert!(matches!(
            result,
            Err(ComputeError::Arity {
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn reference_set_targets_reference_backend() {
        let kernels = reference_kernels();
        assert_eq!(kernels.len(), 3);
        assert!(kernels.iter().all(|k| k.backend_name == REFERENCE_BACKEND));
    }
}
