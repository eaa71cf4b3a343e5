//! GPU seam: a handle-based device interface with a GL-style bind model.
//!
//! Renderer objects never talk to wgpu directly. They allocate buffers,
//! textures and programs through [`GpuDevice`], set uniforms and vertex
//! attribute streams on the program in use, and issue indexed draws.
//! [`WgpuDevice`] records those draws and replays them in a render pass;
//! [`RecordingDevice`] keeps a call log for tests.

mod recording;
mod wgpu_device;

pub use recording::{GpuCall, RecordingDevice};
pub use wgpu_device::WgpuDevice;

use asset::TextureData;
use glam::{Mat4, Vec3, Vec4};

use crate::error::GpuError;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u64);

/// Handle to a sampled GPU texture (view + sampler)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u64);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u64);

/// Index of a uniform inside its program's declaration list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub(crate) u32);

/// Vertex input location (`@location(n)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeLocation(pub(crate) u32);

impl AttributeLocation {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
}

/// Uniform types available to programs, laid out with WGSL uniform rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Mat4,
    Vec4,
    Vec3,
    Float,
    Int,
}

impl UniformKind {
    pub fn size(self) -> u32 {
        match self {
            UniformKind::Mat4 => 64,
            UniformKind::Vec4 => 16,
            UniformKind::Vec3 => 12,
            UniformKind::Float | UniformKind::Int => 4,
        }
    }

    pub fn align(self) -> u32 {
        match self {
            UniformKind::Mat4 | UniformKind::Vec4 | UniformKind::Vec3 => 16,
            UniformKind::Float | UniformKind::Int => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UniformKind::Mat4 => "mat4x4<f32>",
            UniformKind::Vec4 => "vec4<f32>",
            UniformKind::Vec3 => "vec3<f32>",
            UniformKind::Float => "f32",
            UniformKind::Int => "i32",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Vec4(Vec4),
    Vec3(Vec3),
    Float(f32),
    Int(i32),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Mat4(_) => UniformKind::Mat4,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
        }
    }

    /// Little-endian bytes as they sit in a uniform block.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Mat4(m) => bytemuck::bytes_of(&m.to_cols_array()).to_vec(),
            UniformValue::Vec4(v) => bytemuck::bytes_of(&v.to_array()).to_vec(),
            UniformValue::Vec3(v) => bytemuck::bytes_of(&v.to_array()).to_vec(),
            UniformValue::Float(f) => f.to_le_bytes().to_vec(),
            UniformValue::Int(i) => i.to_le_bytes().to_vec(),
        }
    }
}

/// One member of a program's uniform block, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub kind: UniformKind,
}

impl UniformDecl {
    pub const fn new(name: &'static str, kind: UniformKind) -> Self {
        Self { name, kind }
    }
}

/// Offsets of each declared uniform plus the padded block size.
pub fn uniform_block_layout(decls: &[UniformDecl]) -> (Vec<u32>, u32) {
    let mut offsets = Vec::with_capacity(decls.len());
    let mut cursor = 0u32;
    for decl in decls {
        cursor = cursor.next_multiple_of(decl.kind.align());
        offsets.push(cursor);
        cursor += decl.kind.size();
    }
    (offsets, cursor.next_multiple_of(16))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeFormat {
    Float32x2,
    Float32x3,
}

impl AttributeFormat {
    pub fn size(self) -> u64 {
        match self {
            AttributeFormat::Float32x2 => 8,
            AttributeFormat::Float32x3 => 12,
        }
    }
}

/// Vertex + fragment pair to compile and link, with its interface.
/// Attribute `i` lives at `@location(i)`, sampled texture `i` at unit `i`.
#[derive(Debug, Clone, Copy)]
pub struct ProgramSource<'a> {
    pub label: &'a str,
    pub vertex: &'a str,
    pub fragment: &'a str,
    pub uniforms: &'a [UniformDecl],
    pub attributes: &'a [(&'static str, AttributeFormat)],
    pub textures: &'a [&'static str],
}

/// Upload description for a sampled texture. `levels` is a full mip chain,
/// level 0 first. Sampling is trilinear with linear magnification.
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    pub label: &'a str,
    pub levels: &'a [TextureData],
    pub clamp: bool,
}

pub trait GpuDevice {
    fn create_buffer(
        &mut self,
        usage: BufferUsage,
        size: u64,
        label: &str,
    ) -> Result<BufferId, GpuError>;
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError>;
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> Result<TextureId, GpuError>;
    fn destroy_texture(&mut self, texture: TextureId);

    /// Compile both stages and link them into a program.
    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<ProgramId, GpuError>;
    fn destroy_program(&mut self, program: ProgramId);
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation>;
    fn texture_unit(&self, program: ProgramId, name: &str) -> Option<u32>;

    fn use_program(&mut self, program: ProgramId) -> Result<(), GpuError>;
    /// Set a uniform of the program in use; values persist across draws.
    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), GpuError>;
    fn bind_texture(&mut self, unit: u32, texture: TextureId) -> Result<(), GpuError>;
    fn unbind_texture(&mut self, unit: u32);

    fn set_vertex_attribute(
        &mut self,
        location: AttributeLocation,
        buffer: BufferId,
        offset: u64,
        format: AttributeFormat,
    ) -> Result<(), GpuError>;
    fn enable_vertex_attribute(&mut self, location: AttributeLocation);
    fn disable_vertex_attribute(&mut self, location: AttributeLocation);

    /// Indexed triangle list with 16-bit indices.
    fn draw_indexed(&mut self, index_buffer: BufferId, index_count: u32) -> Result<(), GpuError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_layout_packs_scalars_after_vec3() {
        let decls = [
            UniformDecl::new("m", UniformKind::Mat4),
            UniformDecl::new("c", UniformKind::Vec3),
            UniformDecl::new("f", UniformKind::Float),
            UniformDecl::new("i", UniformKind::Int),
            UniformDecl::new("v", UniformKind::Vec4),
        ];
        let (offsets, size) = uniform_block_layout(&decls);
        assert_eq!(offsets, vec![0, 64, 76, 80, 96]);
        assert_eq!(size, 112);
    }

    #[test]
    fn uniform_bytes_are_column_major() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let bytes = UniformValue::Mat4(m).to_bytes();
        assert_eq!(bytes.len(), 64);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[12..15], &[1.0, 2.0, 3.0]);
    }
}
