//! Command-line image enhancer
//!
//! Loads an image, runs the GPU enhancement pipeline, and writes the result
//! as a lossless 16-bit RGBA PNG.
//!
//! # Usage
//! ```bash
//! cli input.png output.png --scale 2
//! ```

use clap::Parser;
use image::GenericImageView;
use revixel_wgpu::scale::ScaleFactor;
use revixel_wgpu::{GpuContext, Resolution, UpscalePipeline};
use std::path::PathBuf;

/// Command-line arguments for the enhancer
#[derive(Parser)]
#[command(version, about = "GPU image enhancer with 16-bit PNG export")]
struct Args {
    /// Input image file path
    input: PathBuf,

    /// Output PNG file path
    output: PathBuf,

    /// Target scale factor relative to the input ("2", "3/2", ...)
    #[arg(long, short, default_value = "2")]
    scale: ScaleFactor,

    /// Number of benchmark runs before the exported one
    #[arg(long, default_value = "0")]
    warmup_runs: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    println!("Loading image from: {}", args.input.display());
    let input_image = image::open(&args.input)?;
    let (input_width, input_height) = input_image.dimensions();
    println!("Input image: {input_width}x{input_height}");

    let native = Resolution::new(input_width, input_height)?;
    let target = Resolution::new(args.scale.apply(input_width), args.scale.apply(input_height))?;
    println!("Target output: {target} (scale factor: {})", args.scale);

    println!("Initializing GPU...");
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: None,
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: wgpu::MemoryHints::default(),
        trace: Default::default(),
    }))?;
    let gpu = GpuContext::new(device, queue);
    println!("GPU initialized successfully");

    let source = upload_image(&gpu, &input_image);

    let pipeline = UpscalePipeline::new(&gpu, &source, native, target)?;

    for run in 0..args.warmup_runs {
        let elapsed = pipeline.run(&gpu)?;
        println!("Warmup run {}: {elapsed:?}", run + 1);
    }

    println!("Executing enhancement pipeline...");
    let elapsed = pipeline.run(&gpu)?;
    println!("Pipeline completed in {elapsed:?}");

    let png = pipeline.export_png(&gpu)?;
    std::fs::write(&args.output, &png)?;
    println!(
        "Wrote {} ({} bytes, {})",
        args.output.display(),
        png.len(),
        pipeline.output_resolution()
    );

    Ok(())
}

/// Uploads an image as an rgba8unorm texture the pipeline can sample
fn upload_image(gpu: &GpuContext, image: &image::DynamicImage) -> wgpu::Texture {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("input image"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });

    gpu.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    texture
}
