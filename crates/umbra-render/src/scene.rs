//! Scene description and the GPU layouts the shaders read.
//!
//! Every `#[repr(C)]` struct here mirrors a std430 block in the GLSL sources
//! and must keep the same field order and size.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3, Vec4};
use umbra_core::constants::{MAX_LIGHTS, MAX_MATERIALS, SHADOW_FACES};

use crate::camera::reversed_perspective;

/// Per-object data, indexed by instance in the G-buffer and shadow passes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectData {
    /// `x` is the material index.
    pub material: [i32; 4],
    pub color: [f32; 4],
    pub model: [[f32; 4]; 4],
    /// Rotation only, used to transform normals.
    pub rotation: [[f32; 4]; 4],
}

/// Header of the light block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightGeneralData {
    /// `x` is the number of active lights.
    pub counts: [i32; 4],
    /// `rgb` colour, `w` strength.
    pub ambient: [f32; 4],
}

/// One point light, including its gizmo model and shadow matrices.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightData {
    pub position: [f32; 4],
    pub model: [[f32; 4]; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// Constant, linear and quadratic terms.
    pub attenuation: [f32; 4],
    pub proj: [[f32; 4]; 4],
    /// One view per cube face: `+X, -X, +Y, -Y, +Z, -Z`.
    pub view: [[[f32; 4]; 4]; SHADOW_FACES],
    /// Shadow near and far planes.
    pub planes: [f32; 4],
}

/// Contents of a light storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightBlock {
    pub general: LightGeneralData,
    pub lights: [LightData; MAX_LIGHTS],
}

/// Blinn-Phong material.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    /// `x` ambient strength, `y` diffuse strength.
    pub params: [f32; 4],
    /// `rgb` specular colour, `w` shininess.
    pub specular: [f32; 4],
}

impl MaterialData {
    pub const fn new(ambient: f32, diffuse: f32, specular: [f32; 3], shininess: f32) -> Self {
        Self {
            params: [ambient, diffuse, 0.0, 0.0],
            specular: [specular[0], specular[1], specular[2], shininess],
        }
    }
}

/// Push constants of the G-buffer, lighting and gizmo pipelines.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VertexPushConstants {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    /// Device address of the vertex buffer.
    pub vertex_buffer: u64,
}

/// Push constants of the shadow pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ShadowPushConstants {
    pub vertex_buffer: u64,
    /// `x` is the light being rendered.
    pub current_light: [i32; 2],
}

/// A cube instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub material: u32,
    pub color: Vec4,
}

impl SceneObject {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            material: 0,
            color: Vec4::ONE,
        }
    }

    pub fn gpu_data(&self) -> ObjectData {
        ObjectData {
            material: [self.material as i32, 0, 0, 0],
            color: self.color.to_array(),
            model: Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
                .to_cols_array_2d(),
            rotation: Mat4::from_quat(self.rotation).to_cols_array_2d(),
        }
    }
}

/// How a light moves over time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightMotion {
    Static,
    /// Circles the Y axis at `radius`, cycling its colour as it goes.
    Orbit { radius: f32 },
}

/// A point light.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub attenuation: Vec3,
    pub motion: LightMotion,
}

impl PointLight {
    pub const fn new(position: Vec3, diffuse: Vec3, specular: Vec3, attenuation: Vec3) -> Self {
        Self {
            position,
            diffuse,
            specular,
            attenuation,
            motion: LightMotion::Static,
        }
    }

    /// Position and diffuse colour at `time_ms`.
    pub fn animated(&self, time_ms: f64) -> (Vec3, Vec3) {
        match self.motion {
            LightMotion::Static => (self.position, self.diffuse),
            LightMotion::Orbit { radius } => {
                let t = (time_ms * 0.001) as f32;
                let (sin, cos) = t.sin_cos();
                let position = Vec3::new(radius * sin, self.position.y, radius * cos);
                let diffuse = 0.6 * Vec3::new((cos + sin).abs(), cos.abs(), sin.abs());
                (position, diffuse)
            }
        }
    }

    /// GPU data at `time_ms`.
    pub fn gpu_data(&self, time_ms: f64) -> LightData {
        let (position, diffuse) = self.animated(time_ms);
        let model = Mat4::from_translation(position) * Mat4::from_scale(Vec3::splat(GIZMO_SCALE));

        LightData {
            position: position.extend(1.0).to_array(),
            model: model.to_cols_array_2d(),
            diffuse: diffuse.extend(1.0).to_array(),
            specular: self.specular.extend(1.0).to_array(),
            attenuation: self.attenuation.extend(0.0).to_array(),
            proj: shadow_projection().to_cols_array_2d(),
            view: shadow_views(position).map(|m| m.to_cols_array_2d()),
            planes: [SHADOW_NEAR, SHADOW_FAR, 0.0, 0.0],
        }
    }
}

const GIZMO_SCALE: f32 = 0.2;
const SHADOW_NEAR: f32 = 0.1;
const SHADOW_FAR: f32 = 40.0;

/// Cube face directions and up vectors, in layer order.
const CUBE_FACES: [(Vec3, Vec3); SHADOW_FACES] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// 90° square projection shared by every cube face.
pub fn shadow_projection() -> Mat4 {
    reversed_perspective(90.0, 1.0, SHADOW_NEAR, SHADOW_FAR)
}

/// View matrices for the six cube faces around `position`.
pub fn shadow_views(position: Vec3) -> [Mat4; SHADOW_FACES] {
    CUBE_FACES.map(|(dir, up)| Mat4::look_at_rh(position, position + dir, up))
}

/// Objects, materials and lights.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
    pub materials: Vec<MaterialData>,
    pub lights: Vec<PointLight>,
    /// `rgb` colour, `w` strength.
    pub ambient: Vec4,
}

impl Scene {
    /// Nine rotated cubes over a floor, lit by five point lights.
    pub fn demo() -> Self {
        const CUBES: [Vec3; 9] = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, -5.0, -15.0),
            Vec3::new(-1.5, 2.2, -2.5),
            Vec3::new(-3.8, 2.0, -12.3),
            Vec3::new(2.4, 0.4, -3.5),
            Vec3::new(-1.7, -3.0, -7.5),
            Vec3::new(1.3, 2.0, -2.5),
            Vec3::new(1.5, -2.0, -2.5),
            Vec3::new(1.5, -0.2, -1.5),
        ];

        let axis = Vec3::new(1.0, -0.3, 0.5).normalize();
        let mut objects: Vec<SceneObject> = CUBES
            .iter()
            .enumerate()
            .map(|(i, &position)| SceneObject {
                rotation: Quat::from_axis_angle(axis, (20.0 * i as f32).to_radians()),
                ..SceneObject::new(position)
            })
            .collect();

        objects.push(SceneObject {
            scale: Vec3::new(15.0, 1.0, 15.0),
            material: 1,
            color: Vec4::new(0.2, 0.2, 0.2, 1.0),
            ..SceneObject::new(Vec3::new(0.0, 5.0, 0.0))
        });

        let materials = vec![
            MaterialData::new(0.3, 0.8, [1.0, 1.0, 1.0], 32.0),
            MaterialData::new(0.3, 1.0, [0.5, 0.5, 0.5], 64.0),
        ];

        let lights = vec![
            PointLight::new(
                Vec3::new(0.1, -4.0, 0.0),
                Vec3::new(0.9, 0.3, 0.3),
                Vec3::splat(0.5),
                Vec3::new(0.5, 0.3, 0.0),
            ),
            PointLight {
                motion: LightMotion::Orbit { radius: 10.0 },
                ..PointLight::new(
                    Vec3::ZERO,
                    Vec3::splat(0.6),
                    Vec3::splat(0.3),
                    Vec3::new(0.5, 0.08, 0.0),
                )
            },
            PointLight::new(
                Vec3::new(0.5, 3.0, 5.0),
                Vec3::new(0.0, 0.9, 0.9),
                Vec3::splat(0.5),
                Vec3::new(1.0, 0.0, 0.0),
            ),
            PointLight::new(
                Vec3::new(3.5, 3.0, 5.0),
                Vec3::new(0.9, 0.4, 0.3),
                Vec3::splat(0.5),
                Vec3::new(1.0, 0.0, 0.0),
            ),
            PointLight::new(
                Vec3::new(3.5, 3.0, -5.0),
                Vec3::new(0.9, 0.9, 0.0),
                Vec3::splat(0.8),
                Vec3::new(0.8, 0.2, 0.0),
            ),
        ];

        Self {
            objects,
            materials,
            lights,
            ambient: Vec4::new(1.0, 1.0, 1.0, 0.1),
        }
    }

    /// One cube at the origin lit from `(0, -2, 0)`.
    pub fn single_cube() -> Self {
        Self {
            objects: vec![SceneObject::new(Vec3::ZERO)],
            materials: vec![MaterialData::new(0.3, 0.8, [1.0, 1.0, 1.0], 32.0)],
            lights: vec![PointLight::new(
                Vec3::new(0.0, -2.0, 0.0),
                Vec3::splat(0.9),
                Vec3::splat(0.5),
                Vec3::new(1.0, 0.09, 0.032),
            )],
            ambient: Vec4::new(1.0, 1.0, 1.0, 0.1),
        }
    }

    pub fn object_data(&self) -> Vec<ObjectData> {
        self.objects.iter().map(SceneObject::gpu_data).collect()
    }

    /// Materials, truncated to the shader's limit.
    pub fn material_data(&self) -> Vec<MaterialData> {
        if self.materials.len() > MAX_MATERIALS {
            tracing::warn!(
                "Scene has {} materials, only the first {} are used",
                self.materials.len(),
                MAX_MATERIALS
            );
        }
        self.materials.iter().take(MAX_MATERIALS).copied().collect()
    }

    /// Number of lights the shaders will see.
    pub fn light_count(&self) -> usize {
        self.lights.len().min(MAX_LIGHTS)
    }

    /// The light block at `time_ms`. Lights past the limit are dropped.
    pub fn light_block(&self, time_ms: f64) -> LightBlock {
        if self.lights.len() > MAX_LIGHTS {
            tracing::warn!(
                "Scene has {} lights, only the first {} are used",
                self.lights.len(),
                MAX_LIGHTS
            );
        }

        let mut block = LightBlock::zeroed();
        let count = self.light_count();
        block.general = LightGeneralData {
            counts: [count as i32, 0, 0, 0],
            ambient: self.ambient.to_array(),
        };
        for (slot, light) in block.lights.iter_mut().zip(&self.lights) {
            *slot = light.gpu_data(time_ms);
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::mem::size_of;

    #[test]
    fn layouts_match_shader_blocks() {
        assert_eq!(size_of::<ObjectData>(), 160);
        assert_eq!(size_of::<LightGeneralData>(), 32);
        assert_eq!(size_of::<LightData>(), 592);
        assert_eq!(size_of::<LightBlock>(), 32 + 592 * MAX_LIGHTS);
        assert_eq!(size_of::<MaterialData>(), 32);
        assert_eq!(size_of::<VertexPushConstants>(), 152);
        assert_eq!(size_of::<ShadowPushConstants>(), 16);
    }

    #[test]
    fn demo_scene_contents() {
        let scene = Scene::demo();
        assert_eq!(scene.objects.len(), 10);
        assert_eq!(scene.materials.len(), 2);
        assert_eq!(scene.lights.len(), 5);

        let floor = scene.objects.last().unwrap();
        assert_eq!(floor.material, 1);
        assert_eq!(floor.scale, Vec3::new(15.0, 1.0, 15.0));
    }

    #[test]
    fn cubes_rotate_twenty_degrees_apart() {
        let scene = Scene::demo();
        let angle = scene.objects[0].rotation.angle_between(scene.objects[3].rotation);
        assert_relative_eq!(angle, 60f32.to_radians(), epsilon = 1e-4);
    }

    #[test]
    fn orbiting_light_follows_the_clock() {
        let light = &Scene::demo().lights[1];
        let (start, _) = light.animated(0.0);
        assert_relative_eq!(start.x, 0.0);
        assert_relative_eq!(start.z, 10.0);

        let quarter = std::f64::consts::FRAC_PI_2 * 1000.0;
        let (position, color) = light.animated(quarter);
        assert_relative_eq!(position.x, 10.0, epsilon = 1e-4);
        assert_relative_eq!(position.z, 0.0, epsilon = 1e-3);
        assert_relative_eq!(color.z, 0.6, epsilon = 1e-4);
    }

    #[test]
    fn static_light_ignores_the_clock() {
        let light = &Scene::demo().lights[0];
        assert_eq!(light.animated(0.0), light.animated(12_345.0));
    }

    #[test]
    fn light_block_counts_and_fills() {
        let scene = Scene::demo();
        let block = scene.light_block(0.0);
        assert_eq!(block.general.counts[0], 5);
        assert_eq!(scene.light_count(), 5);
        assert_eq!(block.lights[0].position, [0.1, -4.0, 0.0, 1.0]);
        assert_eq!(block.lights[5], LightData::zeroed());
    }

    #[test]
    fn excess_lights_are_dropped() {
        let mut scene = Scene::single_cube();
        let light = scene.lights[0].clone();
        scene.lights = vec![light; MAX_LIGHTS + 3];
        let block = scene.light_block(0.0);
        assert_eq!(block.general.counts[0], MAX_LIGHTS as i32);
    }

    #[test]
    fn shadow_faces_look_along_axes() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let views = shadow_views(position);
        for (view, (dir, _)) in views.iter().zip(CUBE_FACES) {
            // A point one unit along the face direction sits straight ahead.
            let p = view.transform_point3(position + dir);
            assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
            assert_relative_eq!(p.y, 0.0, epsilon = 1e-5);
            assert_relative_eq!(p.z, -1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn gizmo_model_is_scaled_at_light() {
        let data = Scene::single_cube().lights[0].gpu_data(0.0);
        let model = Mat4::from_cols_array_2d(&data.model);
        let corner = model.transform_point3(Vec3::splat(0.5));
        assert_relative_eq!(corner.x, 0.1, epsilon = 1e-6);
        assert_relative_eq!(corner.y, -1.9, epsilon = 1e-6);
        assert_relative_eq!(data.planes[1], 40.0);
    }

    #[test]
    fn object_data_carries_material_and_transform() {
        let object = SceneObject {
            material: 1,
            ..SceneObject::new(Vec3::new(0.0, 5.0, 0.0))
        };
        let data = object.gpu_data();
        assert_eq!(data.material[0], 1);
        assert_eq!(data.model[3], [0.0, 5.0, 0.0, 1.0]);
        assert_eq!(data.rotation, Mat4::IDENTITY.to_cols_array_2d());
    }
}
