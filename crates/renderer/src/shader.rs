//! Shader variants per illumination model and the uniform naming contract.
//!
//! Every variant is a vertex + fragment WGSL pair that declares the same
//! uniform block (`UNIFORMS`, in order), the same vertex inputs and the same
//! texture units. Adding a variant means adding a fragment source that honors
//! these names and a case in [`ShaderVariant::select`].

use std::{
    borrow::Cow,
    fs,
    path::{Path, PathBuf},
};

use asset::IlluminationModel;

use crate::{
    config::IlluminationPolicy,
    device::{AttributeFormat, ProgramSource, UniformDecl, UniformKind},
    error::RenderError,
};

pub const U_MODEL_VIEW: &str = "u_ModelView";
pub const U_MODEL_VIEW_PROJECTION: &str = "u_ModelViewProjection";
pub const U_LIGHTING_PARAMETERS: &str = "u_LightingParameters";
pub const U_MTL_AMBIENT: &str = "u_MtlAmbient";
pub const U_MTL_DIFFUSE: &str = "u_MtlDiffuse";
pub const U_MTL_SPECULAR: &str = "u_MtlSpecular";
pub const U_D: &str = "u_D";
pub const U_SPECULAR_POWER: &str = "u_SpecularPower";
pub const U_USE_VARYING_NORMAL: &str = "u_UseVaryingNormal";
pub const U_USE_TEX_AMBIENT: &str = "u_UseTexAmbient";
pub const U_USE_TEX_DIFFUSE: &str = "u_UseTexDiffuse";
pub const U_USE_TEX_SPECULAR: &str = "u_UseTexSpecular";
pub const U_TEX_AMBIENT: &str = "u_TexAmbient";
pub const U_TEX_DIFFUSE: &str = "u_TexDiffuse";
pub const U_TEX_SPECULAR: &str = "u_TexSpecular";

pub const A_POSITION: &str = "a_Position";
pub const A_NORMAL: &str = "a_Normal";
pub const A_TEX_COORD: &str = "a_TexCoord";

/// Uniform block members; WGSL sources declare them in this order.
pub const UNIFORMS: &[UniformDecl] = &[
    UniformDecl::new(U_MODEL_VIEW, UniformKind::Mat4),
    UniformDecl::new(U_MODEL_VIEW_PROJECTION, UniformKind::Mat4),
    UniformDecl::new(U_LIGHTING_PARAMETERS, UniformKind::Vec4),
    UniformDecl::new(U_MTL_AMBIENT, UniformKind::Vec3),
    UniformDecl::new(U_D, UniformKind::Float),
    UniformDecl::new(U_MTL_DIFFUSE, UniformKind::Vec3),
    UniformDecl::new(U_SPECULAR_POWER, UniformKind::Float),
    UniformDecl::new(U_MTL_SPECULAR, UniformKind::Vec3),
    UniformDecl::new(U_USE_VARYING_NORMAL, UniformKind::Int),
    UniformDecl::new(U_USE_TEX_AMBIENT, UniformKind::Int),
    UniformDecl::new(U_USE_TEX_DIFFUSE, UniformKind::Int),
    UniformDecl::new(U_USE_TEX_SPECULAR, UniformKind::Int),
];

pub const ATTRIBUTES: &[(&str, AttributeFormat)] = &[
    (A_POSITION, AttributeFormat::Float32x3),
    (A_NORMAL, AttributeFormat::Float32x3),
    (A_TEX_COORD, AttributeFormat::Float32x2),
];

/// Sampled textures; the index is the texture unit.
pub const TEXTURES: &[&str] = &[U_TEX_DIFFUSE, U_TEX_AMBIENT, U_TEX_SPECULAR];

const VERTEX_FILE: &str = "object_vertex.wgsl";
const BUILTIN_VERTEX: &str = include_str!("shaders/object_vertex.wgsl");
const BUILTIN_ILLUM2: &str = include_str!("shaders/frag_illum2.wgsl");

/// Shader selected by a material's illumination model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVariant {
    /// Ambient + Lambert diffuse + Phong specular (`illum 0..=2`).
    Phong,
}

impl ShaderVariant {
    pub fn select(
        model: IlluminationModel,
        policy: IlluminationPolicy,
    ) -> Result<Self, RenderError> {
        match model {
            IlluminationModel::ColorOnAmbientOff
            | IlluminationModel::ColorOnAmbientOn
            | IlluminationModel::HighlightOn => Ok(ShaderVariant::Phong),
            unsupported => match policy {
                IlluminationPolicy::FallbackToPhong => {
                    log::warn!(
                        "Illumination model {:?} (illum {}) is not implemented; shading with Phong",
                        unsupported,
                        unsupported.index()
                    );
                    Ok(ShaderVariant::Phong)
                }
                IlluminationPolicy::Reject => Err(RenderError::UnsupportedIlluminationModel {
                    model: unsupported,
                    index: unsupported.index(),
                }),
            },
        }
    }

    pub fn fragment_file(self) -> &'static str {
        match self {
            ShaderVariant::Phong => "frag_illum2.wgsl",
        }
    }

    fn builtin_fragment(self) -> &'static str {
        match self {
            ShaderVariant::Phong => BUILTIN_ILLUM2,
        }
    }
}

/// Vertex + fragment WGSL for one variant.
#[derive(Debug, Clone)]
pub struct ShaderPair {
    pub variant: ShaderVariant,
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl ShaderPair {
    pub fn program_source<'a>(&'a self, label: &'a str) -> ProgramSource<'a> {
        ProgramSource {
            label,
            vertex: &self.vertex,
            fragment: &self.fragment,
            uniforms: UNIFORMS,
            attributes: ATTRIBUTES,
            textures: TEXTURES,
        }
    }
}

/// Source lookup: built-in sources, or files from an override directory.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    override_dir: Option<PathBuf>,
}

impl ShaderLibrary {
    pub fn builtin() -> Self {
        Self::default()
    }

    pub fn with_override_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: Some(dir.into()),
        }
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    pub fn source(&self, variant: ShaderVariant) -> Result<ShaderPair, RenderError> {
        let Some(dir) = &self.override_dir else {
            return Ok(ShaderPair {
                variant,
                vertex: Cow::Borrowed(BUILTIN_VERTEX),
                fragment: Cow::Borrowed(variant.builtin_fragment()),
            });
        };
        Ok(ShaderPair {
            variant,
            vertex: Cow::Owned(read_source(&dir.join(VERTEX_FILE))?),
            fragment: Cow::Owned(read_source(&dir.join(variant.fragment_file()))?),
        })
    }
}

fn read_source(path: &Path) -> Result<String, RenderError> {
    log::debug!("Reading shader {}", path.display());
    fs::read_to_string(path).map_err(|source| RenderError::ShaderSource {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::uniform_block_layout;

    #[test]
    fn legacy_models_share_phong() {
        for index in 0..=2 {
            let model = IlluminationModel::from_index(index).unwrap();
            assert_eq!(
                ShaderVariant::select(model, IlluminationPolicy::Reject).unwrap(),
                ShaderVariant::Phong
            );
        }
    }

    #[test]
    fn unsupported_models_follow_policy() {
        let model = IlluminationModel::ReflectionOnRayTraceOn;
        assert_eq!(
            ShaderVariant::select(model, IlluminationPolicy::FallbackToPhong).unwrap(),
            ShaderVariant::Phong
        );
        match ShaderVariant::select(model, IlluminationPolicy::Reject) {
            Err(RenderError::UnsupportedIlluminationModel { index, .. }) => assert_eq!(index, 3),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn builtin_sources_declare_the_contract() {
        let pair = ShaderLibrary::builtin().source(ShaderVariant::Phong).unwrap();
        for decl in UNIFORMS {
            assert!(pair.vertex.contains(decl.name), "vertex lacks {}", decl.name);
            assert!(pair.fragment.contains(decl.name), "fragment lacks {}", decl.name);
        }
        for (name, _) in ATTRIBUTES {
            assert!(pair.vertex.contains(name));
        }
        for name in TEXTURES {
            assert!(pair.fragment.contains(name));
        }
        let (_, size) = uniform_block_layout(UNIFORMS);
        assert_eq!(size, 208);
    }

    #[test]
    fn missing_override_file_is_fatal() {
        let dir = std::env::temp_dir().join(format!("shader-override-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(VERTEX_FILE), BUILTIN_VERTEX).unwrap();

        let library = ShaderLibrary::with_override_dir(&dir);
        assert_eq!(library.override_dir(), Some(dir.as_path()));
        match library.source(ShaderVariant::Phong) {
            Err(RenderError::ShaderSource { path, .. }) => {
                assert_eq!(path, dir.join("frag_illum2.wgsl"))
            }
            other => panic!("expected ShaderSource error, got {other:?}"),
        }

        std::fs::write(dir.join("frag_illum2.wgsl"), "// custom").unwrap();
        let pair = library.source(ShaderVariant::Phong).unwrap();
        assert_eq!(pair.fragment, "// custom");
        std::fs::remove_dir_all(&dir).ok();
    }
}
