//! wgpu backend plumbing
//!
//! Thin wrapper over a caller-provided device/queue pair. The core never
//! touches adapters or instances; bring-up lives with the caller (see the
//! CLI example). Everything here is resource creation, one-shot submission
//! with completion await, and rgba16float readback.

use crate::surface::{SurfaceFormat, SurfaceRole, SurfaceSpec};

/// A wgpu device/queue pair the pipeline executes against
#[derive(Debug)]
pub struct GpuContext {
    /// The wgpu device for resource creation
    pub device: wgpu::Device,
    /// The command queue for submission
    pub queue: wgpu::Queue,
}

/// A graphics submission failed; fatal to the current run
#[derive(Debug, thiserror::Error)]
#[error("graphics submission failed")]
pub struct SubmitError(#[from] wgpu::PollError);

/// Reading a rendered surface back to the CPU failed
#[derive(Debug, thiserror::Error)]
pub enum ReadbackError {
    /// The texture is not rgba16float
    #[error("readback requires an rgba16float texture, got {0:?}")]
    UnsupportedFormat(wgpu::TextureFormat),
    /// Waiting for the copy to complete failed
    #[error("readback submission failed")]
    Submit(#[from] SubmitError),
    /// Mapping the staging buffer failed
    #[error("failed to map readback buffer")]
    Map(#[from] wgpu::BufferAsyncError),
    /// The map callback never fired
    #[error("readback channel closed before the buffer was mapped")]
    ChannelClosed,
}

/// Maps a planned surface format to its wgpu equivalent
pub fn texture_format(format: SurfaceFormat) -> wgpu::TextureFormat {
    match format {
        SurfaceFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        SurfaceFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

impl GpuContext {
    /// Wraps an already-acquired device and queue
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Realizes a planned surface as a wgpu texture
    pub fn create_surface(&self, spec: &SurfaceSpec) -> wgpu::Texture {
        let usage = match spec.role {
            SurfaceRole::Source => wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
            SurfaceRole::Intermediate => wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            SurfaceRole::Export => wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        };

        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&spec.label),
            size: wgpu::Extent3d {
                width: spec.width,
                height: spec.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(spec.format),
            usage,
            view_formats: &[],
        })
    }

    /// Compiles a WGSL shader module
    pub fn create_shader(&self, label: &str, source: &str) -> wgpu::ShaderModule {
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    }

    /// Creates the shared linear clamp-to-edge sampler
    pub fn create_sampler(&self) -> wgpu::Sampler {
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("pass sampler"),
            // Clamp to edge to avoid artifacts when sampling at texture boundaries
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 0.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        })
    }

    /// Builds a render pipeline for one fullscreen pass
    ///
    /// All passes share the same shape: the fullscreen-triangle vertex stage
    /// and a fragment stage rendering to a single color target.
    pub fn create_render_pipeline(
        &self,
        label: &str,
        vertex: &wgpu::ShaderModule,
        fragment: &wgpu::ShaderModule,
        bind_group_layout: &wgpu::BindGroupLayout,
        target_format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[bind_group_layout],
            push_constant_ranges: &[],
        });

        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: vertex,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: fragment,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(target_format.into())],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    /// Submits one recorded command sequence and blocks until it completes
    ///
    /// There is exactly one submission per run; a failure here is fatal to
    /// the run and is never retried.
    pub fn submit_and_await(&self, encoder: wgpu::CommandEncoder) -> Result<(), SubmitError> {
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::PollType::Wait)?;
        Ok(())
    }

    /// Reads an rgba16float texture back as half-precision bit patterns
    ///
    /// Returns `width * height * 4` interleaved R,G,B,A samples, row-major.
    /// Copy rows must be 256-byte aligned, so the staging buffer is padded
    /// per row and the padding stripped after mapping.
    pub fn read_rgba16f(&self, texture: &wgpu::Texture) -> Result<Vec<u16>, ReadbackError> {
        if texture.format() != wgpu::TextureFormat::Rgba16Float {
            return Err(ReadbackError::UnsupportedFormat(texture.format()));
        }

        let width = texture.width();
        let height = texture.height();
        let unpadded_bytes_per_row = width * 8;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback encoder") });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| sender.send(result).unwrap());

        self.device.poll(wgpu::PollType::Wait).map_err(SubmitError)?;
        pollster::block_on(receiver.receive()).ok_or(ReadbackError::ChannelClosed)??;

        let data = buffer_slice.get_mapped_range();
        let mut samples = Vec::with_capacity(width as usize * height as usize * 4);
        for row in data.chunks_exact(padded_bytes_per_row as usize) {
            let row_samples: &[u16] = bytemuck::cast_slice(&row[..unpadded_bytes_per_row as usize]);
            samples.extend_from_slice(row_samples);
        }

        Ok(samples)
    }
}
