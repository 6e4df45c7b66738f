//! Core shared types (renderer-agnostic): math re-exports, camera, model placement, errors.

pub use glam::{EulerRot, Mat4, Quat, Vec3, vec3};

pub mod camera;
pub mod error;
pub mod transform;

pub use error::{ParseError, SetupFailure, ShaderError, ShaderStage, StartupError, TextureError};
