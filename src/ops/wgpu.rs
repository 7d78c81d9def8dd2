//! GPU-accelerated pointwise execution using WGPU.
//!
//! Binary rules that expose a WGSL expression are compiled into a single
//! broadcasting compute shader (`shaders/pointwise_binary.wgsl`) and cached per
//! rule name. Inputs are widened to `f32` on the host, read on the device
//! through broadcast strides (so broadcast operands are uploaded once at their
//! own size), and the `f32` result is narrowed to the output dtype on readback.
//!
//! Everything here is best effort: any condition the GPU cannot serve (no
//! adapter, `f64` compute, rank above 8, buffers over the device limits, shader
//! failure) yields `None` and the dispatcher runs the call on the CPU instead.
//!
//! WGSL leaves overflow and NaN results indeterminate, so inputs holding NaN or
//! infinities are never uploaded, and a result with a non-finite element is
//! thrown away and recomputed on the CPU.

use std::collections::HashMap;
use std::sync::{Mutex, mpsc};

use briny::prelude::*;
use half::{bf16, f16};
use wgpu::util::DeviceExt;

use super::dispatch::PointwiseRule;
use crate::dtype::{DType, Element};
use crate::promotion::Promotion;
use crate::shape::BroadcastIndexer;
use crate::tensors::Storage;

const POINTWISE_BINARY: &str = include_str!("shaders/pointwise_binary.wgsl");
const RULE_PLACEHOLDER: &str = "RULE_EXPR";

const MAX_RANK: usize = 8;
const WORKGROUP_SIZE: u32 = 64;
const MAX_GRID_SIZE_X: u32 = 65_535;

/// Basic wrapper for common GPU errors.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    /// An error in requesting the adapter.
    #[error("adapter error: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    /// An error in requesting the GPU (device).
    #[error("device error: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    /// The generated WGSL did not pass source validation.
    #[error("shader source for {0} failed validation")]
    Validation(&'static str),
    /// Mapping the readback buffer failed.
    #[error("readback failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    /// The readback callback never ran.
    #[error("readback callback dropped")]
    Readback,
    /// The device rejected a buffer, binding or submission.
    #[error("device rejected the submission: {0}")]
    Rejected(String),
}

/// Holds the WGPU device and queue used for executing compute pipelines.
pub struct GpuContext {
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// A queue for information related to the device.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Initializes a new GPU context, selecting the default adapter and creating a device + queue.
    ///
    /// Uses `pollster::block_on` to synchronously wait for the async WGPU calls.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("briny_fused"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;

        Ok(Self { device, queue })
    }
}

/// Wrapper for generated WGSL source, checked before compilation.
pub struct WgslSource<'a>(pub &'a str);

impl Validate for WgslSource<'_> {
    fn validate(&self) -> Result<(), ValidationError> {
        let src = self.0;

        if src.len() > 65536 || !src.contains("fn main") || src.contains(RULE_PLACEHOLDER) {
            return Err(ValidationError);
        }

        // rule expressions are pasted into the template verbatim
        let forbidden = ["import", "#include", "asm", "unsafe", "ptr", "std::"];
        if forbidden.iter().any(|bad| src.contains(bad)) {
            return Err(ValidationError);
        }

        Ok(())
    }
}

/// Layouts shared by every pointwise pipeline plus the per-rule pipeline cache.
struct PointwiseKernels {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: Mutex<HashMap<&'static str, wgpu::ComputePipeline>>,
}

impl PointwiseKernels {
    fn new(device: &wgpu::Device) -> Self {
        let buffer_entry = |binding: u32, ty: wgpu::BufferBindingType| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pointwise_bgl"),
            entries: &[
                buffer_entry(0, wgpu::BufferBindingType::Uniform),
                buffer_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(2, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(3, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pointwise_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            bind_group_layout,
            pipeline_layout,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    fn pipeline(
        &self,
        device: &wgpu::Device,
        name: &'static str,
        expr: &str,
    ) -> Result<wgpu::ComputePipeline, GpuError> {
        let mut cache = self
            .pipelines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(pipeline) = cache.get(name) {
            return Ok(pipeline.clone());
        }

        let source = POINTWISE_BINARY.replace(RULE_PLACEHOLDER, expr);
        WgslSource(&source)
            .validate()
            .map_err(|_| GpuError::Validation(name))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name),
            layout: Some(&self.pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            cache: None,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });
        cache.insert(name, pipeline.clone());
        Ok(pipeline)
    }
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: Option<GpuContext> = match GpuContext::new() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            tracing::debug!(component = crate::COMPONENT, error = %e, "wgpu context unavailable");
            None
        }
    };
    static ref POINTWISE_KERNELS: Option<PointwiseKernels> =
        GPU_CONTEXT.as_ref().map(|ctx| PointwiseKernels::new(&ctx.device));
}

/// Runs a binary pointwise rule on the GPU, or returns `None` if it cannot.
pub fn wgpu_pointwise<R, const N: usize>(
    rule: &R,
    promotion: Promotion,
    operands: &[&Storage; N],
    indexer: &BroadcastIndexer<N>,
) -> Option<Storage>
where
    R: PointwiseRule<N>,
{
    let expr = rule.wgsl()?;
    let (lhs, rhs) = match operands.as_slice() {
        [lhs, rhs] => (*lhs, *rhs),
        _ => return None,
    };
    if promotion.compute != DType::F32 || indexer.out_shape().len() > MAX_RANK {
        return None;
    }

    let numel: usize = indexer.out_shape().iter().product();
    let params = pack_params(numel, indexer.out_shape(), indexer.strides().as_slice())?;
    let ctx = GPU_CONTEXT.as_ref()?;
    let kernels = POINTWISE_KERNELS.as_ref()?;

    if !fits_limits(&ctx.device.limits(), &[numel, lhs.len(), rhs.len()]) {
        tracing::debug!(
            component = crate::COMPONENT,
            op = R::NAME,
            numel,
            "buffers exceed wgpu device limits"
        );
        return None;
    }

    let lhs: Vec<f32> = (0..lhs.len()).map(|i| lhs.load::<f32>(i)).collect();
    let rhs: Vec<f32> = (0..rhs.len()).map(|i| rhs.load::<f32>(i)).collect();
    if !lhs.iter().chain(&rhs).all(|v| v.is_finite()) {
        tracing::debug!(
            component = crate::COMPONENT,
            op = R::NAME,
            "non-finite inputs stay on the cpu"
        );
        return None;
    }

    let result = kernels
        .pipeline(&ctx.device, R::NAME, expr)
        .and_then(|pipeline| {
            pollster::block_on(run_pointwise_shader(ctx, kernels, &pipeline, &params, &lhs, &rhs, numel))
        });

    match result {
        Ok(out) if out.iter().all(|v| v.is_finite()) => narrow_output(out, promotion.output),
        Ok(_) => {
            tracing::debug!(
                component = crate::COMPONENT,
                op = R::NAME,
                "wgpu result not finite, recomputing on cpu"
            );
            None
        }
        Err(e) => {
            tracing::debug!(component = crate::COMPONENT, op = R::NAME, error = %e, "wgpu pointwise failed");
            None
        }
    }
}

/// Whether `f32` buffers of the given element counts can be created and bound.
fn fits_limits(limits: &wgpu::Limits, lens: &[usize]) -> bool {
    let max = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    lens.iter().all(|&len| {
        len.checked_mul(size_of::<f32>())
            .and_then(|bytes| u64::try_from(bytes).ok())
            .is_some_and(|bytes| bytes <= max)
    })
}

/// Uniform layout: `[numel, ndim, pad, pad, out_shape[8], lhs_strides[8], rhs_strides[8]]`.
fn pack_params(numel: usize, out_shape: &[usize], strides: &[Vec<usize>]) -> Option<Vec<u32>> {
    let [lhs_strides, rhs_strides] = strides else {
        return None;
    };
    let mut params = vec![0u32; 4 + 3 * MAX_RANK];
    params[0] = u32::try_from(numel).ok()?;
    params[1] = u32::try_from(out_shape.len()).ok()?;
    for (section, dims) in [out_shape, lhs_strides.as_slice(), rhs_strides.as_slice()].into_iter().enumerate() {
        let base = 4 + section * MAX_RANK;
        for (d, &v) in dims.iter().enumerate() {
            params[base + d] = u32::try_from(v).ok()?;
        }
    }
    Some(params)
}

fn narrow_output(out: Vec<f32>, dtype: DType) -> Option<Storage> {
    fn narrow<E: Element>(out: &[f32]) -> Storage {
        E::into_storage(out.iter().map(|&v| E::from_f32(v)).collect())
    }

    match dtype {
        DType::F32 => Some(Storage::F32(out)),
        DType::F16 => Some(narrow::<f16>(&out)),
        DType::BF16 => Some(narrow::<bf16>(&out)),
        _ => None,
    }
}

fn le_bytes<T: Copy, const W: usize>(data: &[T], to_bytes: fn(T) -> [u8; W]) -> Vec<u8> {
    data.iter().flat_map(|&v| to_bytes(v)).collect()
}

async fn run_pointwise_shader(
    ctx: &GpuContext,
    kernels: &PointwiseKernels,
    pipeline: &wgpu::ComputePipeline,
    params: &[u32],
    lhs: &[f32],
    rhs: &[f32],
    numel: usize,
) -> Result<Vec<f32>, GpuError> {
    let device = &ctx.device;
    let queue = &ctx.queue;
    let out_size = (numel * size_of::<f32>()) as u64;

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("pointwise_params"),
        contents: &le_bytes(params, u32::to_le_bytes),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let lhs_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("pointwise_lhs"),
        contents: &le_bytes(lhs, f32::to_le_bytes),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let rhs_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("pointwise_rhs"),
        contents: &le_bytes(rhs, f32::to_le_bytes),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let output_buf = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("pointwise_out"),
        size: out_size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("pointwise_bind_group"),
        layout: &kernels.bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: lhs_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: rhs_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: output_buf.as_entire_binding(),
            },
        ],
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("pointwise_encoder"),
    });

    {
        // numel fits in u32 (checked while packing params)
        let groups = (numel as u32).div_ceil(WORKGROUP_SIZE);
        let grid_x = groups.min(MAX_GRID_SIZE_X);
        let grid_y = groups.div_ceil(grid_x);

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("pointwise_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(grid_x, grid_y, 1);
    }

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("pointwise_staging"),
        size: out_size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    encoder.copy_buffer_to_buffer(&output_buf, 0, &staging, 0, out_size);
    queue.submit(Some(encoder.finish()));

    if let Some(e) = device.pop_error_scope().await {
        return Err(GpuError::Rejected(e.to_string()));
    }

    let (tx, rx) = mpsc::channel();
    staging.slice(..).map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    let _ = device.poll(wgpu::PollType::Wait);
    rx.recv().map_err(|_| GpuError::Readback)??;

    let data = staging.slice(..).get_mapped_range();
    let out = data
        .chunks_exact(size_of::<f32>())
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    drop(data);
    staging.unmap();

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::silu_and_mul::SiluAndMul;

    #[test]
    fn params_pack_shape_and_strides() {
        let params = pack_params(6, &[2, 3], &[vec![1, 0], vec![0, 1]]).unwrap();
        assert_eq!(&params[..4], &[6, 2, 0, 0]);
        assert_eq!(&params[4..6], &[2, 3]);
        assert_eq!(&params[12..14], &[1, 0]);
        assert_eq!(&params[20..22], &[0, 1]);
    }

    #[test]
    fn oversized_buffers_are_declined() {
        let limits = wgpu::Limits::default();
        assert!(fits_limits(&limits, &[1 << 20, 1, 1 << 20]));
        // 40M f32 elements is 160 MB, past the default 128 MiB binding limit
        assert!(!fits_limits(&limits, &[40_000_000, 1, 1]));
        assert!(!fits_limits(&limits, &[1, usize::MAX]));
    }

    fn run_silu(x: Vec<f32>, y: Vec<f32>) -> Option<Storage> {
        let shape = [x.len()];
        let indexer = BroadcastIndexer::new([&shape[..], &shape[..]], &shape);
        let promotion = Promotion {
            compute: DType::F32,
            output: DType::F32,
        };
        let (x, y) = (Storage::F32(x), Storage::F32(y));
        wgpu_pointwise(&SiluAndMul, promotion, &[&x, &y], &indexer)
    }

    #[test]
    fn silu_limits_on_device() {
        if GPU_CONTEXT.is_none() {
            return;
        }
        let Some(Storage::F32(out)) = run_silu(vec![-1e4, 1e4, 0.0], vec![1.0, 1.0, 2.0]) else {
            panic!("finite silu_and_mul should run on the device");
        };
        assert!(out.iter().all(|v| v.is_finite()));
        assert!(out[0].abs() < 1e-30);
        assert!((out[1] - 1e4).abs() <= 1e4 * 8.0 * f32::EPSILON);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn non_finite_inputs_are_declined() {
        assert!(run_silu(vec![f32::NAN, 1.0], vec![1.0, 1.0]).is_none());
        assert!(run_silu(vec![1.0, 1.0], vec![1.0, f32::INFINITY]).is_none());
    }

    #[test]
    fn template_needs_substitution() {
        assert!(WgslSource(POINTWISE_BINARY).validate().is_err());
        let src = POINTWISE_BINARY.replace(RULE_PLACEHOLDER, "x * y");
        assert!(WgslSource(&src).validate().is_ok());
    }
}
