//! Renderer: multi-material OBJ drawing behind a GL-style device seam.
//! wgpu = 26.x, winit = 0.30.x
//!
//! An OBJ is partitioned into sub-meshes (see `asset`), each drawn by a
//! [`SubMeshRenderer`] that pairs a [`GeometryBuffer`] with a shared
//! [`MaterialBinding`]. [`ObjRenderer`] wraps them into one object. Every
//! GPU-owning type records the thread that created it and refuses to
//! release resources from any other thread.

pub mod config;
pub mod device;
pub mod error;
pub mod geometry;
pub mod loader;
pub mod material;
pub mod object;
pub mod ownership;
pub mod shader;
pub mod texture_cache;

pub use config::{IlluminationPolicy, RendererConfig};
pub use device::{GpuCall, GpuDevice, RecordingDevice, WgpuDevice};
pub use error::{GpuError, LoadError, RenderError, RenderResult};
pub use geometry::{GeometryBuffer, VertexAttributes, VertexRegions};
pub use loader::{AssetLoader, LoadedAsset, load_obj_renderer};
pub use material::{MaterialBinding, SharedMaterial};
pub use object::{ObjRenderer, SubMeshRenderer, VirtualObject};
pub use ownership::{Acquire, OwnershipGuard};
pub use shader::{ShaderLibrary, ShaderVariant};
pub use texture_cache::{SharedTextureCache, TextureCache};
