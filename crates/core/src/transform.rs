//! Where the loaded mesh sits in the world: its bounds and the model matrix
//! built from a user placement.

use crate::{EulerRot, Mat4, Quat, Vec3};

/// Axis-aligned box around a set of positions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// `None` for an empty point set.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self { min: first, max: first }, |b, p| Self {
            min: b.min.min(p),
            max: b.max.max(p),
        }))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Length of the longest side.
    pub fn extent(&self) -> f32 {
        (self.max - self.min).max_element()
    }
}

/// Model matrix inputs with a uniform scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Transform {
    #[inline]
    pub const fn identity() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }

    /// T * R * S.
    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// User-facing placement of the mesh. The default leaves the mesh exactly
/// as authored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPlacement {
    /// Multiplies whatever scale fitting produced.
    pub scale: f32,
    /// Euler XYZ, degrees.
    pub rotation_deg: Vec3,
    /// Longest side the mesh is rescaled to, centred on the origin.
    pub fit_extent: Option<f32>,
}

impl Default for ModelPlacement {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation_deg: Vec3::ZERO,
            fit_extent: None,
        }
    }
}

impl ModelPlacement {
    /// Rotation and scale pivot on the mesh centre when fitting, otherwise on
    /// the authored origin. Degenerate bounds skip the fit.
    pub fn transform(&self, bounds: Option<Bounds>) -> Transform {
        let (fit_scale, pivot) = match (self.fit_extent, bounds) {
            (Some(target), Some(b)) if b.extent() > f32::EPSILON => (target / b.extent(), b.center()),
            _ => (1.0, Vec3::ZERO),
        };
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation_deg.x.to_radians(),
            self.rotation_deg.y.to_radians(),
            self.rotation_deg.z.to_radians(),
        );
        let scale = fit_scale * self.scale;
        Transform {
            translation: rotation * (-pivot * scale),
            rotation,
            scale,
        }
    }
}
