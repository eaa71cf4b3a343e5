//! Material definitions as described by MTL files.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
    sync::Arc,
};

use corelib::Vec3;

/// Name bound to the fallback material used for unassigned polygons.
pub const FALLBACK_MATERIAL_NAME: &str = "<unassigned>";

/// MTL `illum` values 0..=10.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IlluminationModel {
    ColorOnAmbientOff,
    ColorOnAmbientOn,
    #[default]
    HighlightOn,
    ReflectionOnRayTraceOn,
    TransparencyGlassOnReflectionRayTraceOn,
    ReflectionFresnelOnRayTraceOn,
    TransparencyRefractionOnReflectionFresnelOffRayTraceOn,
    TransparencyRefractionOnReflectionFresnelOnRayTraceOn,
    ReflectionOnRayTraceOff,
    TransparencyGlassOnReflectionRayTraceOff,
    ShadowOnInvisibleSurfaces,
}

impl IlluminationModel {
    pub const ALL: [IlluminationModel; 11] = [
        Self::ColorOnAmbientOff,
        Self::ColorOnAmbientOn,
        Self::HighlightOn,
        Self::ReflectionOnRayTraceOn,
        Self::TransparencyGlassOnReflectionRayTraceOn,
        Self::ReflectionFresnelOnRayTraceOn,
        Self::TransparencyRefractionOnReflectionFresnelOffRayTraceOn,
        Self::TransparencyRefractionOnReflectionFresnelOnRayTraceOn,
        Self::ReflectionOnRayTraceOff,
        Self::TransparencyGlassOnReflectionRayTraceOff,
        Self::ShadowOnInvisibleSurfaces,
    ];

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u32 {
        self as u32
    }
}

/// The eight texture-map slots an MTL material may reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Ambient,
    Diffuse,
    Specular,
    SpecularExponent,
    Dissolve,
    Bump,
    Displacement,
    Decal,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 8] = [
        Self::Ambient,
        Self::Diffuse,
        Self::Specular,
        Self::SpecularExponent,
        Self::Dissolve,
        Self::Bump,
        Self::Displacement,
        Self::Decal,
    ];

    fn position(self) -> usize {
        self as usize
    }
}

/// A texture reference: file plus wrap/filter options.
///
/// Float options compare and hash by bit pattern so the struct can key a cache.
#[derive(Clone, Debug)]
pub struct TextureOptions {
    pub path: PathBuf,
    /// `-clamp on`: clamp to edge instead of repeating.
    pub clamp: bool,
    pub blend_u: bool,
    pub blend_v: bool,
    pub offset: [f32; 3],
    pub scale: [f32; 3],
    pub bump_multiplier: f32,
}

impl TextureOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            clamp: false,
            blend_u: true,
            blend_v: true,
            offset: [0.0; 3],
            scale: [1.0; 3],
            bump_multiplier: 1.0,
        }
    }

    /// Same options with the path resolved against `base_dir` when relative.
    pub fn resolved_against(&self, base_dir: &Path) -> Self {
        let mut resolved = self.clone();
        if self.path.is_relative() {
            resolved.path = base_dir.join(&self.path);
        }
        resolved
    }

    fn key(&self) -> (&Path, bool, bool, bool, [u32; 7]) {
        let mut bits = [0u32; 7];
        for (slot, v) in bits
            .iter_mut()
            .zip(self.offset.iter().chain(&self.scale).chain([&self.bump_multiplier]))
        {
            *slot = v.to_bits();
        }
        (&self.path, self.clamp, self.blend_u, self.blend_v, bits)
    }
}

impl PartialEq for TextureOptions {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TextureOptions {}

impl Hash for TextureOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Optional texture per [`TextureSlot`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureMaps {
    maps: [Option<TextureOptions>; 8],
}

impl TextureMaps {
    pub fn get(&self, slot: TextureSlot) -> Option<&TextureOptions> {
        self.maps[slot.position()].as_ref()
    }

    pub fn set(&mut self, slot: TextureSlot, options: Option<TextureOptions>) {
        self.maps[slot.position()] = options;
    }

    /// Present maps in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (TextureSlot, &TextureOptions)> {
        TextureSlot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|opts| (slot, opts)))
    }

    pub fn is_empty(&self) -> bool {
        self.maps.iter().all(Option::is_none)
    }
}

/// Shading parameters of one named material.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDefinition {
    pub name: String,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    /// `Ns`
    pub specular_exponent: f32,
    /// `d` (opacity); `Tr` is stored as `1 - Tr`.
    pub dissolve: f32,
    pub illumination: IlluminationModel,
    pub maps: TextureMaps,
}

impl MaterialDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient: Vec3::ZERO,
            diffuse: Vec3::ONE,
            specular: Vec3::ZERO,
            specular_exponent: 100.0,
            dissolve: 1.0,
            illumination: IlluminationModel::default(),
            maps: TextureMaps::default(),
        }
    }

    /// Material bound to polygons with no `usemtl`.
    pub fn fallback() -> Self {
        Self {
            ambient: Vec3::splat(0.2),
            diffuse: Vec3::splat(0.8),
            ..Self::new(FALLBACK_MATERIAL_NAME)
        }
    }
}

/// Name → material mapping, iterated in insertion order.
#[derive(Clone, Debug, Default)]
pub struct MaterialTable {
    materials: Vec<Arc<MaterialDefinition>>,
    by_name: HashMap<String, usize>,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a material; a later definition with the same name replaces the earlier one.
    pub fn insert(&mut self, material: MaterialDefinition) {
        let material = Arc::new(material);
        match self.by_name.get(&material.name) {
            Some(&idx) => {
                log::warn!(
                    "Material '{}' defined more than once; keeping the last definition",
                    material.name
                );
                self.materials[idx] = material;
            }
            None => {
                self.by_name.insert(material.name.clone(), self.materials.len());
                self.materials.push(material);
            }
        }
    }

    pub fn extend(&mut self, other: MaterialTable) {
        for material in other.materials {
            self.insert(Arc::unwrap_or_clone(material));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<MaterialDefinition>> {
        self.by_name.get(name).map(|&idx| &self.materials[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MaterialDefinition>> {
        self.materials.iter()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl FromIterator<MaterialDefinition> for MaterialTable {
    fn from_iter<T: IntoIterator<Item = MaterialDefinition>>(iter: T) -> Self {
        let mut table = Self::new();
        for material in iter {
            table.insert(material);
        }
        table
    }
}
