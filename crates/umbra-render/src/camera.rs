//! FPS camera.
//!
//! World up is `-Y`. Projections use reversed depth (near plane at 1, far
//! plane at 0) and flip Y so the image is not upside down in Vulkan clip space.

use glam::{Mat4, Vec3};

use crate::scene::VertexPushConstants;

/// World-space up direction.
pub const WORLD_UP: Vec3 = Vec3::NEG_Y;

const MAX_PITCH: f32 = 89.0;

/// Perspective projection with reversed depth and Y flipped.
pub fn reversed_perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_y_degrees.to_radians(), aspect, far, near);
    proj.y_axis.y *= -1.0;
    proj
}

/// First-person camera driven by yaw and pitch, in degrees.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            yaw: -90.0,
            pitch: 0.0,
            fov: 70.0,
            aspect: 1.0,
            near: 0.01,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Camera at `position` looking down `-Z`.
    pub fn new(position: Vec3, aspect: f32) -> Self {
        Self {
            position,
            aspect,
            ..Self::default()
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Unit view direction.
    pub fn front(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(
            yaw.cos() * pitch.cos(),
            -pitch.sin(),
            yaw.sin() * pitch.cos(),
        )
        .normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.front().cross(WORLD_UP).normalize()
    }

    /// Turn by the given angles. Pitch stays within ±89°.
    pub fn rotate(&mut self, yaw_delta: f32, pitch_delta: f32) {
        self.yaw += yaw_delta;
        self.pitch = (self.pitch + pitch_delta).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Move relative to the view direction: `forward` along the front
    /// vector, `strafe` along the right vector, `lift` along world up.
    pub fn translate(&mut self, forward: f32, strafe: f32, lift: f32) {
        self.position += self.front() * forward + self.right() * strafe + WORLD_UP * lift;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.front(), WORLD_UP)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        reversed_perspective(self.fov, self.aspect, self.near, self.far)
    }

    /// Push constants for the G-buffer, lighting and gizmo passes.
    pub fn push_constants(&self, vertex_buffer: u64) -> VertexPushConstants {
        VertexPushConstants {
            view: self.view_matrix().to_cols_array_2d(),
            proj: self.projection_matrix().to_cols_array_2d(),
            camera_pos: self.position.extend(1.0).to_array(),
            vertex_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    fn ndc(clip: Vec4) -> Vec3 {
        clip.truncate() / clip.w
    }

    #[test]
    fn default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        let front = camera.front();
        assert_relative_eq!(front.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(front.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(front.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn depth_is_reversed() {
        let proj = reversed_perspective(70.0, 1.0, 0.1, 100.0);
        let near = ndc(proj * Vec4::new(0.0, 0.0, -0.1, 1.0));
        let far = ndc(proj * Vec4::new(0.0, 0.0, -100.0, 1.0));
        assert_relative_eq!(near.z, 1.0, epsilon = 1e-5);
        assert_relative_eq!(far.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn world_up_lands_at_top_of_screen() {
        let camera = Camera::default();
        let clip =
            camera.projection_matrix() * camera.view_matrix() * Vec4::new(0.0, -1.0, 0.0, 1.0);
        // Vulkan NDC has -Y at the top.
        assert!(ndc(clip).y < 0.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.rotate(0.0, 500.0);
        assert_relative_eq!(camera.pitch, 89.0);
        camera.rotate(0.0, -1000.0);
        assert_relative_eq!(camera.pitch, -89.0);
    }

    #[test]
    fn lift_moves_along_world_up() {
        let mut camera = Camera::default();
        camera.translate(0.0, 0.0, 2.0);
        assert_relative_eq!(camera.position.y, -2.0);
    }

    #[test]
    fn push_constants_carry_camera_state() {
        let camera = Camera::new(Vec3::new(1.0, 2.0, 3.0), 1.5);
        let push = camera.push_constants(0xdead_0000);
        assert_eq!(push.camera_pos, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(push.vertex_buffer, 0xdead_0000);
        assert_eq!(push.view, camera.view_matrix().to_cols_array_2d());
    }
}
