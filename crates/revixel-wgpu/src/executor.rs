//! Binds a planned pipeline to wgpu resources and records its draws
//!
//! The planning side never touches the device; this module realizes the
//! surface table as textures, compiles one render pipeline per scheduled
//! draw, resolves bind groups, and records the whole run into a single
//! command encoder. Binding layout per pass: binding 0 is the stage input
//! texture, binding 1 the shared sampler, bindings 2.. the declared
//! dependency textures in order.

use crate::gpu::{GpuContext, texture_format};
use crate::schedule::DrawOp;
use crate::stage::PipelinePlan;
use crate::surface::SurfaceId;

/// Shared fullscreen-triangle vertex stage
const FULLSCREEN_VERTEX: &str = include_str!("../shaders/fullscreen.wgsl");

/// Errors raised while binding a plan to the device
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The caller-provided source texture does not match the plan
    #[error("source texture is {actual_width}x{actual_height}, plan expects {expected_width}x{expected_height}")]
    SourceSizeMismatch {
        /// Width the plan was built for
        expected_width: u32,
        /// Height the plan was built for
        expected_height: u32,
        /// Provided texture width
        actual_width: u32,
        /// Provided texture height
        actual_height: u32,
    },
}

/// One draw with all GPU resources resolved
struct BoundDraw {
    /// Combined stage/pass label
    label: String,
    /// Render target view
    target: wgpu::TextureView,
    /// The compiled render pipeline
    pipeline: wgpu::RenderPipeline,
    /// All texture and sampler bindings for the pass
    bind_group: wgpu::BindGroup,
}

/// A pipeline run bound to wgpu resources, ready to record
pub struct BoundPipeline {
    draws: Vec<BoundDraw>,
    output: wgpu::Texture,
}

impl BoundPipeline {
    /// Binds a plan and its scheduled draws to the device
    ///
    /// `source` must match the dimensions the plan was built for and carry
    /// `TEXTURE_BINDING` usage (plus `COPY_SRC` if the caller intends to
    /// export a fully bypassed run).
    pub fn new(gpu: &GpuContext, plan: &PipelinePlan, ops: &[DrawOp], source: &wgpu::Texture) -> Result<Self, BindError> {
        let source_spec = plan.surfaces.get(plan.source);
        if source.width() != source_spec.width || source.height() != source_spec.height {
            return Err(BindError::SourceSizeMismatch {
                expected_width: source_spec.width,
                expected_height: source_spec.height,
                actual_width: source.width(),
                actual_height: source.height(),
            });
        }

        // Realize the surface table; the source slot aliases the caller's
        // texture so a fully bypassed pipeline exports the input unchanged.
        let textures: Vec<wgpu::Texture> = plan
            .surfaces
            .specs()
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                if SurfaceId(index) == plan.source {
                    source.clone()
                } else {
                    gpu.create_surface(spec)
                }
            })
            .collect();

        let vertex_module = gpu.create_shader("fullscreen vertex", FULLSCREEN_VERTEX);
        let sampler = gpu.create_sampler();

        let mut draws = Vec::with_capacity(ops.len());
        for op in ops {
            let texture_count = 1 + op.dependencies.len();

            let mut layout_entries = Vec::with_capacity(texture_count + 1);
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
            for index in 0..op.dependencies.len() {
                layout_entries.push(wgpu::BindGroupLayoutEntry {
                    binding: 2 + index as u32,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                });
            }

            let bind_group_layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&op.label),
                entries: &layout_entries,
            });

            let fragment_module = gpu.create_shader(&op.label, op.fragment);
            let target_format = texture_format(plan.surfaces.get(op.target).format);
            let pipeline = gpu.create_render_pipeline(&op.label, &vertex_module, &fragment_module, &bind_group_layout, target_format);

            let source_view = textures[op.source.0].create_view(&wgpu::TextureViewDescriptor::default());
            let mut group_entries = Vec::with_capacity(texture_count + 1);
            group_entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&source_view),
            });
            group_entries.push(wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&sampler),
            });
            let dependency_views: Vec<wgpu::TextureView> = op
                .dependencies
                .iter()
                .map(|id| textures[id.0].create_view(&wgpu::TextureViewDescriptor::default()))
                .collect();
            for (index, view) in dependency_views.iter().enumerate() {
                group_entries.push(wgpu::BindGroupEntry {
                    binding: 2 + index as u32,
                    resource: wgpu::BindingResource::TextureView(view),
                });
            }

            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&op.label),
                layout: &bind_group_layout,
                entries: &group_entries,
            });

            draws.push(BoundDraw {
                label: op.label.clone(),
                target: textures[op.target.0].create_view(&wgpu::TextureViewDescriptor::default()),
                pipeline,
                bind_group,
            });
        }

        let output = textures[plan.output.0].clone();

        Ok(Self { draws, output })
    }

    /// Records every scheduled draw into the encoder, in order
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        for draw in &self.draws {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&draw.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &draw.target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&draw.pipeline);
            pass.set_bind_group(0, &draw.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
    }

    /// The texture holding the run's final result
    pub fn output(&self) -> &wgpu::Texture {
        &self.output
    }

    /// Number of recorded draws
    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }
}
