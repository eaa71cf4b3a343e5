//! Core shared errors (renderer-agnostic).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("Light intensity {0} is outside [0, 1]")]
    LightIntensityOutOfRange(f32),
    #[error("Light direction must be a finite, non-zero vector")]
    InvalidLightDirection,
}

pub type CoreResult<T> = Result<T, CoreError>;
