//! Core types: math re-exports, bounds, lighting, transform, camera, errors.
//! Renderer-agnostic; shared by the asset and renderer crates.

pub use glam::{EulerRot, Mat4, Quat, Vec2, Vec3, Vec4, vec3, vec4};

pub mod bounds;
pub mod camera;
pub mod error;
pub mod lighting;
pub mod transform;

pub use bounds::Bounds3;
pub use error::{CoreError, CoreResult};
pub use lighting::LightingParameters;
pub use transform::{centered_anchor, model_matrix};
