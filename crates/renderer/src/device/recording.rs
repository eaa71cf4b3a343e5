//! In-memory [`GpuDevice`] that validates usage and logs every call.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{
    AttributeFormat, AttributeLocation, BufferId, BufferUsage, GpuDevice, ProgramId,
    ProgramSource, ShaderStage, TextureId, TextureUpload, UniformDecl, UniformLocation,
    UniformValue,
};
use crate::error::GpuError;

const TEXTURE_UNITS: u32 = 8;

/// One entry of the call log.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateBuffer {
        id: BufferId,
        usage: BufferUsage,
        size: u64,
    },
    WriteBuffer {
        id: BufferId,
        offset: u64,
        len: u64,
    },
    DestroyBuffer(BufferId),
    CreateTexture {
        id: TextureId,
        width: u32,
        height: u32,
        levels: usize,
        clamp: bool,
    },
    DestroyTexture(TextureId),
    CreateProgram { id: ProgramId, label: String },
    DestroyProgram(ProgramId),
    UseProgram(ProgramId),
    SetUniform {
        program: ProgramId,
        name: &'static str,
        value: UniformValue,
    },
    BindTexture { unit: u32, texture: TextureId },
    UnbindTexture(u32),
    SetVertexAttribute {
        location: AttributeLocation,
        buffer: BufferId,
        offset: u64,
    },
    EnableVertexAttribute(AttributeLocation),
    DisableVertexAttribute(AttributeLocation),
    DrawIndexed {
        program: ProgramId,
        index_buffer: BufferId,
        index_count: u32,
    },
}

#[derive(Debug)]
struct RecordedProgram {
    uniforms: Vec<UniformDecl>,
    attributes: Vec<&'static str>,
    textures: Vec<&'static str>,
    values: HashMap<&'static str, UniformValue>,
}

/// Headless device for tests. Ids are never reused, so a stale handle is
/// reported instead of aliasing a newer resource.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    next_id: u64,
    calls: Vec<GpuCall>,
    buffers: BTreeMap<BufferId, u64>,
    textures: BTreeSet<TextureId>,
    programs: BTreeMap<ProgramId, RecordedProgram>,
    current_program: Option<ProgramId>,
    attributes: HashMap<AttributeLocation, (BufferId, u64)>,
    enabled: BTreeSet<AttributeLocation>,
    bound_units: BTreeMap<u32, TextureId>,
    fail_shader: Option<ShaderStage>,
    fail_link: bool,
    fail_buffer: bool,
    fail_textures: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next program creation fail compiling `stage`.
    pub fn fail_next_compile(&mut self, stage: ShaderStage) {
        self.fail_shader = Some(stage);
    }

    /// Make the next program creation fail at link time.
    pub fn fail_next_link(&mut self) {
        self.fail_link = true;
    }

    /// Make the next buffer allocation fail.
    pub fn fail_next_buffer(&mut self) {
        self.fail_buffer = true;
    }

    pub fn fail_texture_creation(&mut self, fail: bool) {
        self.fail_textures = fail;
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&GpuCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn live_buffers(&self) -> Vec<BufferId> {
        self.buffers.keys().copied().collect()
    }

    pub fn live_textures(&self) -> Vec<TextureId> {
        self.textures.iter().copied().collect()
    }

    pub fn live_programs(&self) -> Vec<ProgramId> {
        self.programs.keys().copied().collect()
    }

    pub fn enabled_attributes(&self) -> Vec<AttributeLocation> {
        self.enabled.iter().copied().collect()
    }

    pub fn bound_texture(&self, unit: u32) -> Option<TextureId> {
        self.bound_units.get(&unit).copied()
    }

    /// Last value uploaded to `name` on `program`.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.programs.get(&program)?.values.get(name).copied()
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_buffer(&self, buffer: BufferId) -> Result<u64, GpuError> {
        self.buffers
            .get(&buffer)
            .copied()
            .ok_or(GpuError::UnknownBuffer(buffer))
    }
}

impl GpuDevice for RecordingDevice {
    fn create_buffer(
        &mut self,
        usage: BufferUsage,
        size: u64,
        label: &str,
    ) -> Result<BufferId, GpuError> {
        let reason = if std::mem::take(&mut self.fail_buffer) {
            Some("injected buffer failure")
        } else if size == 0 {
            Some("zero-sized buffer")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(GpuError::BufferCreation {
                label: label.to_string(),
                reason: reason.into(),
            });
        }
        let id = BufferId(self.allocate());
        self.buffers.insert(id, size);
        self.calls.push(GpuCall::CreateBuffer { id, usage, size });
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let size = self.check_buffer(buffer)?;
        let len = data.len() as u64;
        if offset + len > size {
            return Err(GpuError::OutOfBounds {
                buffer,
                offset,
                len,
                size,
            });
        }
        self.calls.push(GpuCall::WriteBuffer {
            id: buffer,
            offset,
            len,
        });
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.attributes.retain(|_, (b, _)| *b != buffer);
        self.calls.push(GpuCall::DestroyBuffer(buffer));
    }

    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> Result<TextureId, GpuError> {
        let failure = |reason: &str| GpuError::TextureCreation {
            label: upload.label.to_string(),
            reason: reason.to_string(),
        };
        if self.fail_textures {
            return Err(failure("injected texture failure"));
        }
        let base = upload.levels.first().ok_or_else(|| failure("no texture levels"))?;
        let id = TextureId(self.allocate());
        self.textures.insert(id);
        self.calls.push(GpuCall::CreateTexture {
            id,
            width: base.width,
            height: base.height,
            levels: upload.levels.len(),
            clamp: upload.clamp,
        });
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.bound_units.retain(|_, t| *t != texture);
        self.calls.push(GpuCall::DestroyTexture(texture));
    }

    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<ProgramId, GpuError> {
        if let Some(stage) = self.fail_shader.take() {
            return Err(GpuError::ShaderCompile {
                stage,
                label: source.label.to_string(),
                log: "injected compile failure".into(),
            });
        }
        if std::mem::take(&mut self.fail_link) {
            return Err(GpuError::ProgramLink {
                label: source.label.to_string(),
                log: "injected link failure".into(),
            });
        }
        let id = ProgramId(self.allocate());
        self.programs.insert(
            id,
            RecordedProgram {
                uniforms: source.uniforms.to_vec(),
                attributes: source.attributes.iter().map(|(name, _)| *name).collect(),
                textures: source.textures.to_vec(),
                values: HashMap::new(),
            },
        );
        self.calls.push(GpuCall::CreateProgram {
            id,
            label: source.label.to_string(),
        });
        Ok(id)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.calls.push(GpuCall::DestroyProgram(program));
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let program = self.programs.get(&program)?;
        let index = program.uniforms.iter().position(|u| u.name == name)?;
        Some(UniformLocation(index as u32))
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation> {
        let program = self.programs.get(&program)?;
        let index = program.attributes.iter().position(|a| *a == name)?;
        Some(AttributeLocation(index as u32))
    }

    fn texture_unit(&self, program: ProgramId, name: &str) -> Option<u32> {
        let program = self.programs.get(&program)?;
        program
            .textures
            .iter()
            .position(|t| *t == name)
            .map(|unit| unit as u32)
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), GpuError> {
        if !self.programs.contains_key(&program) {
            return Err(GpuError::UnknownProgram(program));
        }
        self.current_program = Some(program);
        self.calls.push(GpuCall::UseProgram(program));
        Ok(())
    }

    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), GpuError> {
        let id = self.current_program.ok_or(GpuError::NoProgramBound)?;
        let program = self
            .programs
            .get_mut(&id)
            .ok_or(GpuError::UnknownProgram(id))?;
        let decl = program
            .uniforms
            .get(location.0 as usize)
            .copied()
            .filter(|d| d.kind == value.kind())
            .ok_or(GpuError::UniformType {
                program: id,
                location: location.0,
                expected: value.kind().name(),
            })?;
        program.values.insert(decl.name, value);
        self.calls.push(GpuCall::SetUniform {
            program: id,
            name: decl.name,
            value,
        });
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) -> Result<(), GpuError> {
        if unit >= TEXTURE_UNITS {
            return Err(GpuError::TextureUnit {
                unit,
                units: TEXTURE_UNITS,
            });
        }
        if !self.textures.contains(&texture) {
            return Err(GpuError::UnknownTexture(texture));
        }
        self.bound_units.insert(unit, texture);
        self.calls.push(GpuCall::BindTexture { unit, texture });
        Ok(())
    }

    fn unbind_texture(&mut self, unit: u32) {
        self.bound_units.remove(&unit);
        self.calls.push(GpuCall::UnbindTexture(unit));
    }

    fn set_vertex_attribute(
        &mut self,
        location: AttributeLocation,
        buffer: BufferId,
        offset: u64,
        format: AttributeFormat,
    ) -> Result<(), GpuError> {
        let size = self.check_buffer(buffer)?;
        if offset + format.size() > size {
            return Err(GpuError::OutOfBounds {
                buffer,
                offset,
                len: format.size(),
                size,
            });
        }
        self.attributes.insert(location, (buffer, offset));
        self.calls.push(GpuCall::SetVertexAttribute {
            location,
            buffer,
            offset,
        });
        Ok(())
    }

    fn enable_vertex_attribute(&mut self, location: AttributeLocation) {
        self.enabled.insert(location);
        self.calls.push(GpuCall::EnableVertexAttribute(location));
    }

    fn disable_vertex_attribute(&mut self, location: AttributeLocation) {
        self.enabled.remove(&location);
        self.calls.push(GpuCall::DisableVertexAttribute(location));
    }

    fn draw_indexed(&mut self, index_buffer: BufferId, index_count: u32) -> Result<(), GpuError> {
        let program = self.current_program.ok_or(GpuError::NoProgramBound)?;
        let size = self.check_buffer(index_buffer)?;
        if u64::from(index_count) * 2 > size {
            return Err(GpuError::OutOfBounds {
                buffer: index_buffer,
                offset: 0,
                len: u64::from(index_count) * 2,
                size,
            });
        }
        let inputs = self.programs.get(&program).map_or(0, |p| p.attributes.len());
        for location in (0..inputs as u32).map(AttributeLocation) {
            if !self.enabled.contains(&location) || !self.attributes.contains_key(&location) {
                return Err(GpuError::AttributeNotReady(location));
            }
        }
        self.calls.push(GpuCall::DrawIndexed {
            program,
            index_buffer,
            index_count,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::UniformKind;

    const UNIFORMS: &[UniformDecl] = &[
        UniformDecl::new("u_A", UniformKind::Float),
        UniformDecl::new("u_B", UniformKind::Mat4),
    ];

    fn program(device: &mut RecordingDevice) -> ProgramId {
        device
            .create_program(&ProgramSource {
                label: "test",
                vertex: "",
                fragment: "",
                uniforms: UNIFORMS,
                attributes: &[("a_Position", AttributeFormat::Float32x3)],
                textures: &["u_Tex"],
            })
            .unwrap()
    }

    #[test]
    fn resolves_locations_by_declaration_order() {
        let mut device = RecordingDevice::new();
        let p = program(&mut device);
        assert_eq!(device.uniform_location(p, "u_B"), Some(UniformLocation(1)));
        assert_eq!(device.uniform_location(p, "u_Missing"), None);
        assert_eq!(device.attribute_location(p, "a_Position"), Some(AttributeLocation(0)));
        assert_eq!(device.texture_unit(p, "u_Tex"), Some(0));
    }

    #[test]
    fn uniform_type_is_checked() {
        let mut device = RecordingDevice::new();
        let p = program(&mut device);
        let loc = device.uniform_location(p, "u_A").unwrap();
        assert_eq!(
            device.set_uniform(loc, UniformValue::Float(1.0)),
            Err(GpuError::NoProgramBound)
        );
        device.use_program(p).unwrap();
        device.set_uniform(loc, UniformValue::Float(2.0)).unwrap();
        assert!(device.set_uniform(loc, UniformValue::Int(2)).is_err());
        assert_eq!(device.uniform(p, "u_A"), Some(UniformValue::Float(2.0)));
    }

    #[test]
    fn draw_requires_enabled_attributes() {
        let mut device = RecordingDevice::new();
        let p = program(&mut device);
        let vb = device.create_buffer(BufferUsage::Vertex, 36, "vb").unwrap();
        let ib = device.create_buffer(BufferUsage::Index, 6, "ib").unwrap();
        device.use_program(p).unwrap();

        let loc = AttributeLocation(0);
        device
            .set_vertex_attribute(loc, vb, 0, AttributeFormat::Float32x3)
            .unwrap();
        assert_eq!(device.draw_indexed(ib, 3), Err(GpuError::AttributeNotReady(loc)));
        device.enable_vertex_attribute(loc);
        device.draw_indexed(ib, 3).unwrap();
        assert!(device.draw_indexed(ib, 4).is_err());
    }

    #[test]
    fn injected_failures_fire_once() {
        let mut device = RecordingDevice::new();
        device.fail_next_compile(ShaderStage::Fragment);
        let source = ProgramSource {
            label: "x",
            vertex: "",
            fragment: "",
            uniforms: &[],
            attributes: &[],
            textures: &[],
        };
        assert!(matches!(
            device.create_program(&source),
            Err(GpuError::ShaderCompile { stage: ShaderStage::Fragment, .. })
        ));
        device.fail_next_link();
        assert!(matches!(
            device.create_program(&source),
            Err(GpuError::ProgramLink { .. })
        ));
        assert!(device.create_program(&source).is_ok());
    }
}
