//! Per-frame lighting input supplied by the rendering-surface owner.

use crate::{CoreError, CoreResult, Mat4, Vec3, Vec4};

/// Directional light: intensity in `[0, 1]` plus a homogeneous direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightingParameters {
    intensity: f32,
    direction: Vec4,
}

impl LightingParameters {
    pub fn new(intensity: f32, direction: Vec4) -> CoreResult<Self> {
        if !(0.0..=1.0).contains(&intensity) {
            return Err(CoreError::LightIntensityOutOfRange(intensity));
        }
        let xyz = direction.truncate();
        if !xyz.is_finite() || xyz.length_squared() <= f32::EPSILON {
            return Err(CoreError::InvalidLightDirection);
        }
        Ok(Self {
            intensity,
            direction,
        })
    }

    #[inline]
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    #[inline]
    pub fn direction(&self) -> Vec4 {
        self.direction
    }

    /// Light direction carried into view space by `model_view`, renormalized.
    pub fn view_direction(&self, model_view: &Mat4) -> Vec3 {
        (*model_view * self.direction).truncate().normalize_or_zero()
    }

    /// `xyz` = view-space direction, `w` = intensity; the layout the shaders expect.
    pub fn packed(&self, model_view: &Mat4) -> Vec4 {
        self.view_direction(model_view).extend(self.intensity)
    }
}

impl Default for LightingParameters {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            direction: Vec4::new(0.0, 1.0, 0.0, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec4;

    #[test]
    fn rejects_intensity_outside_unit_range() {
        let dir = vec4(0.0, 1.0, 0.0, 0.0);
        assert_eq!(
            LightingParameters::new(1.5, dir),
            Err(CoreError::LightIntensityOutOfRange(1.5))
        );
        assert!(LightingParameters::new(-0.1, dir).is_err());
        assert!(LightingParameters::new(0.0, dir).is_ok());
        assert!(LightingParameters::new(1.0, dir).is_ok());
    }

    #[test]
    fn rejects_zero_direction() {
        assert_eq!(
            LightingParameters::new(0.5, Vec4::ZERO),
            Err(CoreError::InvalidLightDirection)
        );
    }

    #[test]
    fn view_direction_is_renormalized() {
        let light = LightingParameters::new(0.8, vec4(0.0, 2.0, 0.0, 0.0)).unwrap();
        let mv = Mat4::from_scale(Vec3::splat(5.0)) * Mat4::from_rotation_z(90f32.to_radians());
        let dir = light.view_direction(&mv);
        assert!((dir.length() - 1.0).abs() < 1e-5);
        assert!((dir - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
        let packed = light.packed(&mv);
        assert!((packed.w - 0.8).abs() < 1e-6);
    }
}
