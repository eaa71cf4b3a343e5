//! Model placement: an anchor matrix composed with a uniform scale.

use crate::{Mat4, Quat, Vec3};

/// Model matrix = anchor * uniform scale.
#[inline]
pub fn model_matrix(anchor: Mat4, scale_factor: f32) -> Mat4 {
    anchor * Mat4::from_scale(Vec3::splat(scale_factor))
}

/// Anchor that moves `center` (in object space, before scaling by
/// `scale_factor`) to the origin and then applies `rotation`.
#[inline]
pub fn centered_anchor(rotation: Quat, center: Vec3, scale_factor: f32) -> Mat4 {
    Mat4::from_quat(rotation) * Mat4::from_translation(-center * scale_factor)
}
