//! First-person camera control.

use umbra_input::{EventListener, InputEvent, InputState, KeyCode};
use umbra_render::Camera;

/// Units per second.
const MOVE_SPEED: f32 = 10.0;
/// Multiplier while Shift is held.
const SLOW_FACTOR: f32 = 0.1;
/// Degrees per unit of mouse motion.
const MOUSE_SENSITIVITY: f32 = 0.1;

/// Turns input events into camera movement.
#[derive(Debug, Default)]
pub struct CameraController {
    input: InputState,
    exit_requested: bool,
}

impl EventListener for CameraController {
    fn on_event(&mut self, event: &InputEvent) {
        if *event == InputEvent::KeyPressed(KeyCode::Escape) {
            self.exit_requested = true;
        }
        self.input.apply(event);
    }
}

impl CameraController {
    pub const fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Apply the input gathered since the last call, `dt` seconds of it.
    pub fn update(&mut self, camera: &mut Camera, dt: f32) {
        let look = self.input.mouse_delta() * MOUSE_SENSITIVITY;
        camera.rotate(-look.x, -look.y);

        let speed = if self.held_any(&[KeyCode::ShiftLeft, KeyCode::ShiftRight]) {
            MOVE_SPEED * SLOW_FACTOR
        } else {
            MOVE_SPEED
        } * dt;

        let forward = self.axis(&[KeyCode::KeyW], &[KeyCode::KeyS]);
        let strafe = self.axis(&[KeyCode::KeyD], &[KeyCode::KeyA]);
        let lift = self.axis(
            &[KeyCode::Space],
            &[KeyCode::ControlLeft, KeyCode::ControlRight],
        );
        camera.translate(forward * speed, strafe * speed, lift * speed);

        self.input.end_frame();
    }

    fn held_any(&self, keys: &[KeyCode]) -> bool {
        keys.iter().any(|&key| self.input.is_held(key))
    }

    fn axis(&self, positive: &[KeyCode], negative: &[KeyCode]) -> f32 {
        f32::from(u8::from(self.held_any(positive))) - f32::from(u8::from(self.held_any(negative)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{Vec2, Vec3};

    fn camera() -> Camera {
        Camera::new(Vec3::ZERO, 1.0)
    }

    #[test]
    fn forward_moves_along_front() {
        let mut controller = CameraController::default();
        let mut camera = camera();
        let front = camera.front();

        controller.on_event(&InputEvent::KeyPressed(KeyCode::KeyW));
        controller.update(&mut camera, 0.5);

        assert!(camera.position.abs_diff_eq(front * 5.0, 1e-5));
    }

    #[test]
    fn shift_slows_movement() {
        let mut controller = CameraController::default();
        let mut camera = camera();
        let right = camera.right();

        controller.on_event(&InputEvent::KeyPressed(KeyCode::KeyD));
        controller.on_event(&InputEvent::KeyPressed(KeyCode::ShiftLeft));
        controller.update(&mut camera, 1.0);

        assert!(camera.position.abs_diff_eq(right, 1e-5));
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut controller = CameraController::default();
        let mut camera = camera();
        controller.on_event(&InputEvent::KeyPressed(KeyCode::Space));
        controller.on_event(&InputEvent::KeyPressed(KeyCode::ControlLeft));
        controller.update(&mut camera, 1.0);
        assert_eq!(camera.position, Vec3::ZERO);
    }

    #[test]
    fn mouse_turns_once() {
        let mut controller = CameraController::default();
        let mut camera = camera();
        let yaw = camera.yaw;

        controller.on_event(&InputEvent::MouseMotion(Vec2::new(20.0, 0.0)));
        controller.update(&mut camera, 0.0);
        assert_relative_eq!(camera.yaw, yaw - 2.0);

        controller.update(&mut camera, 0.0);
        assert_relative_eq!(camera.yaw, yaw - 2.0);
    }

    #[test]
    fn escape_requests_exit() {
        let mut controller = CameraController::default();
        assert!(!controller.exit_requested());
        controller.on_event(&InputEvent::KeyPressed(KeyCode::Escape));
        assert!(controller.exit_requested());
    }
}
