use crate::{EulerRot, Mat4, Quat, Vec3};

/// Free-flying perspective camera (right-handed, looks down -Z at rest).
///
/// Orientation is stored as Euler angles in radians and applied yaw, then
/// pitch, then roll.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub aspect: f32,
}

impl Camera {
    pub fn new_perspective(
        position: Vec3,
        fov_y_rad: f32,
        z_near: f32,
        z_far: f32,
        aspect: f32,
    ) -> Self {
        Self {
            position,
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            fov_y_rad,
            z_near,
            z_far,
            aspect,
        }
    }

    #[inline]
    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, self.roll)
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    #[inline]
    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.orientation() * Vec3::Y
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation(), self.position).inverse()
    }

    /// Depth range is [0,1], which is what wgpu expects.
    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_rad,
            self.aspect.max(1e-6),
            self.z_near,
            self.z_far,
        )
    }

    #[inline]
    pub fn proj_view(&self) -> Mat4 {
        self.proj() * self.view()
    }

    #[inline]
    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }
}
