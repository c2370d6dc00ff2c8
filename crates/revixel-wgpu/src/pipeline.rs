//! Top-level enhancement pipeline
//!
//! Ties the pieces together for one input image: plan the fixed stage
//! sequence against the run's resolution context, bind the plan to the
//! device, record and submit the draws, and export the result as a 16-bit
//! PNG. Construction happens once; [`UpscalePipeline::run`] may be called
//! repeatedly (e.g. in a benchmark loop) and is strictly serialized by the
//! completion await, so reruns never race on shared surfaces.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::info;

use crate::executor::{BindError, BoundPipeline};
use crate::gpu::{GpuContext, ReadbackError, SubmitError};
use crate::png16::{self, PngEncodeError, Rgba16Image};
use crate::resolution::Resolution;
use crate::schedule::schedule;
use crate::stage::{PipelinePlan, StageError, plan_pipeline};
use crate::stages::STANDARD_STAGES;
use crate::surface::SurfaceFormat;

/// Errors surfaced by pipeline construction, execution, or export
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The source texture format is not one the pipeline samples
    #[error("unsupported source texture format {0:?}")]
    UnsupportedSourceFormat(wgpu::TextureFormat),
    /// Stage assembly failed (configuration error)
    #[error(transparent)]
    Stage(#[from] StageError),
    /// Binding the plan to the device failed
    #[error(transparent)]
    Bind(#[from] BindError),
    /// The graphics submission failed; the run produced nothing
    #[error(transparent)]
    Submit(#[from] SubmitError),
    /// Reading the result back failed; no artifact was produced
    #[error(transparent)]
    Readback(#[from] ReadbackError),
    /// Encoding the PNG failed; no artifact was produced
    #[error(transparent)]
    Encode(#[from] PngEncodeError),
}

/// A constructed pipeline run over one input texture
pub struct UpscalePipeline {
    plan: PipelinePlan,
    bound: BoundPipeline,
}

impl UpscalePipeline {
    /// Plans and binds the standard stage sequence for one input
    ///
    /// `source` is the input texture (its size is `native`); `output` is the
    /// declared target resolution, conventionally 2x native. Per-pass
    /// enablement is decided here, once, and logged.
    pub fn new(gpu: &GpuContext, source: &wgpu::Texture, native: Resolution, output: Resolution) -> Result<Self, PipelineError> {
        let source_format = match source.format() {
            wgpu::TextureFormat::Rgba8Unorm => SurfaceFormat::Rgba8Unorm,
            wgpu::TextureFormat::Rgba16Float => SurfaceFormat::Rgba16Float,
            other => return Err(PipelineError::UnsupportedSourceFormat(other)),
        };

        let plan = plan_pipeline(&STANDARD_STAGES, native, output, source_format)?;
        for stage in &plan.stages {
            info!(stage = stage.label(), bypassed = stage.is_bypassed(), "assembled stage");
        }

        let ops = schedule(&plan);
        info!(
            draws = ops.len(),
            surfaces = plan.surfaces.len(),
            output = %plan.output_resolution,
            "pipeline planned"
        );

        let bound = BoundPipeline::new(gpu, &plan, &ops, source)?;
        Ok(Self { plan, bound })
    }

    /// Records all draws into one command sequence, submits it once, and
    /// waits for completion
    ///
    /// Returns the elapsed wall-clock time for diagnostics. A submission
    /// failure is fatal to this run and is not retried.
    pub fn run(&self, gpu: &GpuContext) -> Result<Duration, PipelineError> {
        let started = Instant::now();

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("enhancement pipeline") });
        self.bound.encode(&mut encoder);
        gpu.submit_and_await(encoder)?;

        let elapsed = started.elapsed();
        info!(?elapsed, draws = self.bound.draw_count(), "pipeline run complete");
        Ok(elapsed)
    }

    /// Resolution of the run's final result
    pub fn output_resolution(&self) -> Resolution {
        self.plan.output_resolution
    }

    /// Reads the result back and encodes it as a 16-bit RGBA PNG
    ///
    /// Must be called after [`run`](Self::run) has completed; the readback
    /// itself awaits the copy, so the returned bytes always reflect a
    /// finished submission.
    pub fn export_png(&self, gpu: &GpuContext) -> Result<Bytes, PipelineError> {
        let samples = gpu.read_rgba16f(self.bound.output())?;
        let resolution = self.plan.output_resolution;
        let image = Rgba16Image::new(resolution.width, resolution.height, samples)?;
        Ok(png16::encode(&image)?)
    }
}
