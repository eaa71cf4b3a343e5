use std::{path::PathBuf, thread::ThreadId};

use asset::{IlluminationModel, PartitionError};
use thiserror::Error;

use crate::device::{AttributeLocation, BufferId, ProgramId, ShaderStage, TextureId};

/// Failures reported by a [`GpuDevice`](crate::GpuDevice) implementation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GpuError {
    #[error("Failed to initialize GPU: {0}")]
    Initialization(String),
    #[error("Failed to create surface: {0}")]
    Surface(String),
    #[error("Failed to create buffer '{label}': {reason}")]
    BufferCreation { label: String, reason: String },
    #[error("Unknown buffer {0:?}")]
    UnknownBuffer(BufferId),
    #[error("Write of {len} bytes at offset {offset} overflows {buffer:?} ({size} bytes)")]
    OutOfBounds {
        buffer: BufferId,
        offset: u64,
        len: u64,
        size: u64,
    },
    #[error("Failed to create texture '{label}': {reason}")]
    TextureCreation { label: String, reason: String },
    #[error("Unknown texture {0:?}")]
    UnknownTexture(TextureId),
    #[error("Error compiling {stage:?} shader '{label}': {log}")]
    ShaderCompile {
        stage: ShaderStage,
        label: String,
        log: String,
    },
    #[error("Error linking program '{label}': {log}")]
    ProgramLink { label: String, log: String },
    #[error("Unknown program {0:?}")]
    UnknownProgram(ProgramId),
    #[error("No program in use")]
    NoProgramBound,
    #[error("Uniform {location} of {program:?} expects {expected}")]
    UniformType {
        program: ProgramId,
        location: u32,
        expected: &'static str,
    },
    #[error("Vertex attribute {0:?} is not enabled or has no source buffer")]
    AttributeNotReady(AttributeLocation),
    #[error("Texture unit {unit} out of range ({units} units)")]
    TextureUnit { unit: u32, units: u32 },
}

/// Errors surfaced by the GPU-owning renderer objects.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("Failed to load shader source {}", path.display())]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Illumination model {model:?} (illum {index}) has no shader variant")]
    UnsupportedIlluminationModel {
        model: IlluminationModel,
        index: u32,
    },
    #[error("Program for '{material}' has no attribute '{name}'")]
    MissingAttribute { material: String, name: &'static str },
    #[error("Failed to load texture {}", path.display())]
    Texture {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("{what} is owned by thread {owner:?}, not the calling thread")]
    WrongThread { what: &'static str, owner: ThreadId },
    #[error("{0} has not been created on a GL thread")]
    NotCreated(&'static str),
    #[error("Composite object needs at least one part")]
    EmptyComposite,
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Why an asset never turned into a drawable.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read OBJ {}", path.display())]
    Obj {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to read MTL {}", path.display())]
    Mtl {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
