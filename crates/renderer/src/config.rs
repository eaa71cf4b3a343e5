use std::path::PathBuf;

/// What to do with materials whose illumination model has no shader variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IlluminationPolicy {
    /// Warn and shade with the Phong variant.
    #[default]
    FallbackToPhong,
    /// Fail material construction.
    Reject,
}

/// Renderer-wide settings chosen by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Directory whose `.wgsl` files replace the built-in shader sources.
    pub shader_dir: Option<PathBuf>,
    pub illumination: IlluminationPolicy,
    pub clear_color: [f64; 4],
    /// Draw calls recorded per frame; each one takes a uniform ring slot.
    pub max_draws_per_frame: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shader_dir: None,
            illumination: IlluminationPolicy::default(),
            clear_color: [0.05, 0.05, 0.08, 1.0],
            max_draws_per_frame: 1024,
        }
    }
}
