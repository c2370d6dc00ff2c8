//! GPU image enhancement with lossless 16-bit export
//!
//! This crate upscales and restores raster images through a fixed sequence
//! of wgpu render passes (highlight clamping, CNN-style restoration, 2x
//! upscaling, conditional pre-downscale correction) and exports the result
//! as a 16-bit-per-channel RGBA PNG.
//!
//! Which passes run is decided at construction time by mpv-style
//! reverse-Polish resolution conditions (see [`when`]); a stage whose
//! terminal pass is disabled transparently forwards its input to the next
//! stage. Planning is pure and device-free; binding and execution happen
//! against a caller-provided wgpu device.

pub mod gpu;
pub mod png16;
pub mod resolution;
pub mod scale;
pub mod schedule;
pub mod stage;
pub mod stages;
pub mod surface;
pub mod when;

mod executor;
mod pipeline;

pub use executor::{BindError, BoundPipeline};
pub use gpu::GpuContext;
pub use pipeline::{PipelineError, UpscalePipeline};
pub use resolution::{Resolution, ResolutionContext};
