//! GPU program + textures for one MTL material, shared by every part that
//! uses the material.

use std::{collections::HashMap, sync::Arc};

use asset::{MaterialDefinition, TextureData, TextureOptions, TextureSlot};
use corelib::{LightingParameters, Mat4, Vec3, model_matrix};
use parking_lot::Mutex;

use crate::{
    config::IlluminationPolicy,
    device::{GpuDevice, ProgramId, TextureId, UniformLocation, UniformValue},
    error::{RenderError, RenderResult},
    geometry::VertexAttributes,
    ownership::{Acquire, OwnershipGuard},
    shader::{self, ShaderLibrary, ShaderVariant},
    texture_cache::SharedTextureCache,
};

const WHAT: &str = "Material binding";

/// A material shared by reference between sub-mesh renderers.
pub type SharedMaterial = Arc<Mutex<MaterialBinding>>;

/// One colour channel that is either sampled or taken from the material.
#[derive(Debug, Clone, Copy)]
struct Channel {
    slot: TextureSlot,
    sampler: &'static str,
    use_flag: &'static str,
    color_uniform: &'static str,
}

const CHANNELS: [Channel; 3] = [
    Channel {
        slot: TextureSlot::Diffuse,
        sampler: shader::U_TEX_DIFFUSE,
        use_flag: shader::U_USE_TEX_DIFFUSE,
        color_uniform: shader::U_MTL_DIFFUSE,
    },
    Channel {
        slot: TextureSlot::Ambient,
        sampler: shader::U_TEX_AMBIENT,
        use_flag: shader::U_USE_TEX_AMBIENT,
        color_uniform: shader::U_MTL_AMBIENT,
    },
    Channel {
        slot: TextureSlot::Specular,
        sampler: shader::U_TEX_SPECULAR,
        use_flag: shader::U_USE_TEX_SPECULAR,
        color_uniform: shader::U_MTL_SPECULAR,
    },
];

/// Handles resolved from the linked program. Uniforms the program does not
/// declare resolve to `None` and are skipped.
#[derive(Debug, Clone)]
struct ProgramHandles {
    program: ProgramId,
    uniforms: HashMap<&'static str, UniformLocation>,
    units: HashMap<&'static str, u32>,
    attributes: VertexAttributes,
}

impl ProgramHandles {
    fn resolve(
        device: &dyn GpuDevice,
        program: ProgramId,
        material: &str,
    ) -> RenderResult<Self> {
        let attribute = |name: &'static str| {
            device
                .attribute_location(program, name)
                .ok_or_else(|| RenderError::MissingAttribute {
                    material: material.to_string(),
                    name,
                })
        };
        let attributes = VertexAttributes {
            position: attribute(shader::A_POSITION)?,
            normal: attribute(shader::A_NORMAL)?,
            texcoord: attribute(shader::A_TEX_COORD)?,
        };

        let mut uniforms = HashMap::new();
        for decl in shader::UNIFORMS {
            match device.uniform_location(program, decl.name) {
                Some(location) => {
                    uniforms.insert(decl.name, location);
                }
                None => log::debug!("Program for '{}' does not use {}", material, decl.name),
            }
        }
        let units = shader::TEXTURES
            .iter()
            .filter_map(|name| Some((*name, device.texture_unit(program, name)?)))
            .collect();

        Ok(Self {
            program,
            uniforms,
            units,
            attributes,
        })
    }
}

#[derive(Debug)]
pub struct MaterialBinding {
    definition: Arc<MaterialDefinition>,
    variant: ShaderVariant,
    shaders: Arc<ShaderLibrary>,
    textures: SharedTextureCache,
    guard: OwnershipGuard,
    handles: Option<ProgramHandles>,
    resident: HashMap<TextureSlot, (TextureOptions, TextureId)>,
    decoded: HashMap<TextureSlot, Vec<TextureData>>,
    bound_units: Vec<u32>,
    model: Mat4,
    model_view: Mat4,
    model_view_projection: Mat4,
}

impl MaterialBinding {
    /// Select the shader variant for the material's illumination model.
    /// Nothing touches the device until [`create_on_gl_thread`](Self::create_on_gl_thread).
    pub fn new(
        definition: Arc<MaterialDefinition>,
        shaders: Arc<ShaderLibrary>,
        textures: SharedTextureCache,
        policy: IlluminationPolicy,
    ) -> RenderResult<Self> {
        let variant = ShaderVariant::select(definition.illumination, policy)?;
        Ok(Self {
            definition,
            variant,
            shaders,
            textures,
            guard: OwnershipGuard::new(),
            handles: None,
            resident: HashMap::new(),
            decoded: HashMap::new(),
            bound_units: Vec::new(),
            model: Mat4::IDENTITY,
            model_view: Mat4::IDENTITY,
            model_view_projection: Mat4::IDENTITY,
        })
    }

    pub fn shared(self) -> SharedMaterial {
        Arc::new(Mutex::new(self))
    }

    pub fn definition(&self) -> &Arc<MaterialDefinition> {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn variant(&self) -> ShaderVariant {
        self.variant
    }

    pub fn is_created(&self) -> bool {
        self.guard.is_created()
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.handles.as_ref().map(|h| h.program)
    }

    pub fn vertex_attributes(&self) -> Option<VertexAttributes> {
        self.handles.as_ref().map(|h| h.attributes)
    }

    pub fn resident_texture(&self, slot: TextureSlot) -> Option<TextureId> {
        self.resident.get(&slot).map(|(_, id)| *id)
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.model
    }

    pub fn model_view(&self) -> Mat4 {
        self.model_view
    }

    pub fn model_view_projection(&self) -> Mat4 {
        self.model_view_projection
    }

    /// Decode every referenced texture into a mip chain. CPU only, so it
    /// can run on a loader thread ahead of `create_on_gl_thread`.
    pub fn decode_textures(&mut self) {
        for (slot, options) in self.definition.maps.iter() {
            if self.decoded.contains_key(&slot) {
                continue;
            }
            match decode(options) {
                Ok(levels) => {
                    self.decoded.insert(slot, levels);
                }
                Err(err) => log::warn!(
                    "Texture {} for material '{}' could not be decoded: {:#}",
                    options.path.display(),
                    self.definition.name,
                    err
                ),
            }
        }
    }

    /// Compile and link the variant's program, resolve its handles and
    /// upload textures. A second call from the owning thread is a no-op.
    pub fn create_on_gl_thread(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        match self.guard.check_create(WHAT) {
            Acquire::AlreadyOwned => return Ok(()),
            Acquire::Migrated { .. } => self.abandon(),
            Acquire::Fresh => {}
        }

        let built = self
            .allocate_textures(device)
            .and_then(|()| self.build_program(device));
        match built {
            Ok(handles) => {
                self.handles = Some(handles);
                self.guard.claim();
                Ok(())
            }
            Err(err) => {
                self.release_textures(device);
                Err(err)
            }
        }
    }

    fn build_program(&self, device: &mut dyn GpuDevice) -> RenderResult<ProgramHandles> {
        let label = format!("{} ({:?})", self.definition.name, self.variant);
        let program = self
            .shaders
            .source(self.variant)
            .and_then(|pair| Ok(device.create_program(&pair.program_source(&label))?))
            .inspect_err(|err| log::error!("Failed to build program for {}: {}", label, err))?;
        ProgramHandles::resolve(device, program, &self.definition.name).inspect_err(|_| {
            device.destroy_program(program);
        })
    }

    /// Upload each present texture map through the shared cache. A map whose
    /// image cannot be loaded stays unallocated and the channel falls back to
    /// the material colour.
    pub fn allocate_textures(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        let definition = Arc::clone(&self.definition);
        for (slot, options) in definition.maps.iter() {
            if self.resident.contains_key(&slot) {
                continue;
            }
            let predecoded = self.decoded.remove(&slot);
            let acquired = self
                .textures
                .lock()
                .acquire(device, options, || match predecoded {
                    Some(levels) => Ok(levels),
                    None => decode(options),
                });
            match acquired {
                Ok(id) => {
                    self.resident.insert(slot, (options.clone(), id));
                }
                Err(RenderError::Texture { path, source }) => log::warn!(
                    "Texture {} for material '{}' is unavailable, using constant colour: {:#}",
                    path.display(),
                    definition.name,
                    source
                ),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    pub fn update_model_matrix(&mut self, anchor: Mat4, scale_factor: f32) {
        self.model = model_matrix(anchor, scale_factor);
    }

    /// Activate the program and upload the per-draw uniforms. Each colour
    /// channel binds its texture when one is resident, otherwise uploads the
    /// material colour. On failure every unit bound so far is released.
    pub fn pre_draw(
        &mut self,
        device: &mut dyn GpuDevice,
        view: Mat4,
        projection: Mat4,
        lighting: &LightingParameters,
        use_varying_normal: bool,
    ) -> RenderResult<()> {
        self.create_on_gl_thread(device)?;
        let result = self.bind_for_draw(device, view, projection, lighting, use_varying_normal);
        if result.is_err() {
            self.post_draw(device);
        }
        result
    }

    fn bind_for_draw(
        &mut self,
        device: &mut dyn GpuDevice,
        view: Mat4,
        projection: Mat4,
        lighting: &LightingParameters,
        use_varying_normal: bool,
    ) -> RenderResult<()> {
        let handles = self.handles.clone().ok_or(RenderError::NotCreated(WHAT))?;

        self.model_view = view * self.model;
        self.model_view_projection = projection * self.model_view;

        device.use_program(handles.program)?;
        let set = |device: &mut dyn GpuDevice, name: &'static str, value: UniformValue| {
            match handles.uniforms.get(name) {
                Some(location) => device.set_uniform(*location, value),
                None => Ok(()),
            }
        };
        set(device, shader::U_MODEL_VIEW, UniformValue::Mat4(self.model_view))?;
        set(
            device,
            shader::U_MODEL_VIEW_PROJECTION,
            UniformValue::Mat4(self.model_view_projection),
        )?;
        set(
            device,
            shader::U_LIGHTING_PARAMETERS,
            UniformValue::Vec4(lighting.packed(&self.model_view)),
        )?;
        set(device, shader::U_D, UniformValue::Float(self.definition.dissolve))?;
        set(
            device,
            shader::U_SPECULAR_POWER,
            UniformValue::Float(self.definition.specular_exponent),
        )?;
        set(
            device,
            shader::U_USE_VARYING_NORMAL,
            UniformValue::Int(use_varying_normal as i32),
        )?;

        for channel in CHANNELS {
            let texture = self.resident_texture(channel.slot);
            let unit = handles.units.get(channel.sampler).copied();
            match (texture, unit) {
                (Some(texture), Some(unit)) => {
                    device.bind_texture(unit, texture)?;
                    self.bound_units.push(unit);
                    set(device, channel.use_flag, UniformValue::Int(1))?;
                }
                _ => {
                    set(device, channel.use_flag, UniformValue::Int(0))?;
                    set(
                        device,
                        channel.color_uniform,
                        UniformValue::Vec3(self.channel_color(channel.slot)),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Unbind every texture unit bound by the last `pre_draw`.
    pub fn post_draw(&mut self, device: &mut dyn GpuDevice) {
        for unit in self.bound_units.drain(..) {
            device.unbind_texture(unit);
        }
    }

    /// Release the program and this material's texture references.
    /// Refused from a non-owning thread.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        match self.guard.check_release(WHAT) {
            Ok(()) => {}
            Err(RenderError::NotCreated(_)) => return Ok(()),
            Err(err) => return Err(err),
        }
        if let Some(handles) = self.handles.take() {
            device.destroy_program(handles.program);
        }
        self.release_textures(device);
        self.bound_units.clear();
        self.guard.clear();
        Ok(())
    }

    fn release_textures(&mut self, device: &mut dyn GpuDevice) {
        let mut cache = self.textures.lock();
        for (_, (options, _)) in self.resident.drain() {
            cache.release(device, &options);
        }
    }

    fn channel_color(&self, slot: TextureSlot) -> Vec3 {
        match slot {
            TextureSlot::Ambient => self.definition.ambient,
            TextureSlot::Specular => self.definition.specular,
            _ => self.definition.diffuse,
        }
    }

    /// Forget handles owned by a previous context without device calls.
    /// Leaves the binding unowned until the next successful create.
    fn abandon(&mut self) {
        self.handles = None;
        self.bound_units.clear();
        self.guard.clear();
        let mut cache = self.textures.lock();
        for (_, (options, _)) in self.resident.drain() {
            cache.abandon(&options);
        }
    }
}

fn decode(options: &TextureOptions) -> anyhow::Result<Vec<TextureData>> {
    TextureData::load(&options.path)?.mip_chain()
}
