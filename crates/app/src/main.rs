//! Entry point for ObjView: logging + CLI, then hand over to the platform loop.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use renderer::{IlluminationPolicy, RendererConfig};

/// GPU backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum GpuBackend {
    /// Let wgpu pick.
    #[default]
    Auto,
    #[value(alias = "vk")]
    Vulkan,
    #[value(alias = "d3d12")]
    Dx12,
    #[value(alias = "mtl")]
    Metal,
    #[value(alias = "opengl", alias = "gles")]
    Gl,
}

impl From<GpuBackend> for wgpu::Backends {
    fn from(backend: GpuBackend) -> Self {
        match backend {
            GpuBackend::Auto => wgpu::Backends::all(),
            GpuBackend::Vulkan => wgpu::Backends::VULKAN,
            GpuBackend::Dx12 => wgpu::Backends::DX12,
            GpuBackend::Metal => wgpu::Backends::METAL,
            GpuBackend::Gl => wgpu::Backends::GL,
        }
    }
}

/// Render a Wavefront OBJ with its MTL materials.
#[derive(Parser, Debug)]
#[command(name = "objview", version)]
struct Args {
    /// OBJ file to display; material libraries are resolved next to it.
    #[arg(long)]
    obj: PathBuf,

    #[arg(long, value_enum, default_value = "auto")]
    gpu_backend: GpuBackend,

    /// Initial window width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Uniform scale applied to the object.
    #[arg(long, default_value = "1.0")]
    scale: f32,

    /// Directional light intensity in [0, 1].
    #[arg(long, default_value = "1.0")]
    light_intensity: f32,

    /// Directory with WGSL files that replace the built-in shaders.
    #[arg(long)]
    shader_dir: Option<PathBuf>,

    /// Fail instead of falling back to Phong for unsupported `illum` models.
    #[arg(long)]
    strict_illumination: bool,

    /// Log frames per second once a second.
    #[arg(long)]
    show_fps: bool,
}

impl Args {
    fn into_run_options(self) -> platform::RunOptions {
        let illumination = if self.strict_illumination {
            IlluminationPolicy::Reject
        } else {
            IlluminationPolicy::FallbackToPhong
        };
        platform::RunOptions {
            obj_path: self.obj,
            backends: self.gpu_backend.into(),
            width: self.width.max(1),
            height: self.height.max(1),
            show_fps: self.show_fps,
            scale: self.scale,
            light_intensity: self.light_intensity,
            renderer: RendererConfig {
                shader_dir: self.shader_dir,
                illumination,
                ..RendererConfig::default()
            },
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!(
        "Starting ObjView. Backend: {:?}, show_fps={}, window_size={}x{}",
        args.gpu_backend,
        args.show_fps,
        args.width,
        args.height
    );

    platform::run_with_renderer(args.into_run_options())?;

    log::info!("Graceful shutdown. Bye!");
    Ok(())
}
