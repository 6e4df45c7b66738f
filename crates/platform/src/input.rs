//! Keyboard polling and the free-fly camera controller.

use std::collections::HashSet;

use corelib::{Vec3, camera::Camera};
use winit::keyboard::KeyCode;

/// Keys currently held down.
#[derive(Debug, Default)]
pub struct KeyState {
    held: HashSet<KeyCode>,
}

impl KeyState {
    pub fn set(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }
    }

    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    /// -1, 0 or 1 depending on which of the two keys is held.
    pub fn axis(&self, negative: KeyCode, positive: KeyCode) -> f32 {
        self.is_held(positive) as i32 as f32 - self.is_held(negative) as i32 as f32
    }

    /// Forget everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.held.clear();
    }
}

/// Speeds are per second.
#[derive(Clone, Copy, Debug)]
pub struct CameraController {
    pub move_speed: f32,
    pub turn_speed: f32,
    pub threshold_speed: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        Self {
            move_speed: 3.0,
            turn_speed: 1.5,
            threshold_speed: 0.5,
        }
    }
}

impl CameraController {
    /// WASD moves in the view plane, Space/Shift rise and fall, arrows pitch
    /// and yaw, Q/E roll, `[`/`]` lower and raise the lighting threshold.
    pub fn update(&self, keys: &KeyState, dt: f32, camera: &mut Camera, threshold: &mut f32) {
        let forward = keys.axis(KeyCode::KeyS, KeyCode::KeyW);
        let strafe = keys.axis(KeyCode::KeyA, KeyCode::KeyD);
        let lift = keys.axis(KeyCode::ShiftLeft, KeyCode::Space);

        let step = camera.forward() * forward + camera.right() * strafe + Vec3::Y * lift;
        if step != Vec3::ZERO {
            camera.position += step.normalize() * self.move_speed * dt;
        }

        let turn = self.turn_speed * dt;
        camera.pitch = (camera.pitch + keys.axis(KeyCode::ArrowDown, KeyCode::ArrowUp) * turn)
            .clamp(-MAX_PITCH, MAX_PITCH);
        camera.yaw += keys.axis(KeyCode::ArrowRight, KeyCode::ArrowLeft) * turn;
        camera.roll += keys.axis(KeyCode::KeyE, KeyCode::KeyQ) * turn;

        let nudge = keys.axis(KeyCode::BracketLeft, KeyCode::BracketRight) * self.threshold_speed * dt;
        *threshold = (*threshold + nudge).clamp(0.0, 1.0);
    }
}

/// Just short of straight up/down.
const MAX_PITCH: f32 = 1.55;

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::vec3;

    fn camera() -> Camera {
        Camera::new_perspective(Vec3::ZERO, 1.0, 0.1, 100.0, 1.0)
    }

    fn held(keys: &[KeyCode]) -> KeyState {
        let mut state = KeyState::default();
        for &k in keys {
            state.set(k, true);
        }
        state
    }

    #[test]
    fn released_key_is_no_longer_held() {
        let mut keys = held(&[KeyCode::KeyW]);
        assert!(keys.is_held(KeyCode::KeyW));
        keys.set(KeyCode::KeyW, false);
        assert!(!keys.is_held(KeyCode::KeyW));
    }

    #[test]
    fn opposing_keys_cancel() {
        let keys = held(&[KeyCode::KeyW, KeyCode::KeyS]);
        assert_eq!(keys.axis(KeyCode::KeyS, KeyCode::KeyW), 0.0);
    }

    #[test]
    fn w_moves_along_view_direction() {
        let mut cam = camera();
        let mut threshold = 0.5;
        CameraController::default().update(&held(&[KeyCode::KeyW]), 1.0, &mut cam, &mut threshold);
        assert!((cam.position - vec3(0.0, 0.0, -3.0)).length() < 1e-5);
    }

    #[test]
    fn space_rises_regardless_of_pitch() {
        let mut cam = camera();
        cam.pitch = 0.7;
        let mut threshold = 0.5;
        CameraController::default().update(&held(&[KeyCode::Space]), 0.5, &mut cam, &mut threshold);
        assert!((cam.position - vec3(0.0, 1.5, 0.0)).length() < 1e-5);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = camera();
        let mut threshold = 0.5;
        CameraController::default().update(&held(&[KeyCode::ArrowUp]), 10.0, &mut cam, &mut threshold);
        assert_eq!(cam.pitch, MAX_PITCH);
    }

    #[test]
    fn threshold_stays_in_unit_range() {
        let mut cam = camera();
        let mut threshold = 0.9;
        let controller = CameraController::default();
        controller.update(&held(&[KeyCode::BracketRight]), 1.0, &mut cam, &mut threshold);
        assert_eq!(threshold, 1.0);
        controller.update(&held(&[KeyCode::BracketLeft]), 10.0, &mut cam, &mut threshold);
        assert_eq!(threshold, 0.0);
    }

    #[test]
    fn idle_keys_leave_camera_untouched() {
        let mut cam = camera();
        let mut threshold = 0.5;
        CameraController::default().update(&KeyState::default(), 1.0, &mut cam, &mut threshold);
        assert_eq!(cam.position, Vec3::ZERO);
        assert_eq!((cam.pitch, cam.yaw, cam.roll), (0.0, 0.0, 0.0));
        assert_eq!(threshold, 0.5);
    }
}
