//! Indexed meshes.
//!
//! Shaders pull vertices from a storage buffer through its device address, so
//! pipelines declare no vertex input state.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use gpu_allocator::MemoryLocation;
use umbra_gpu::{GpuBuffer, GpuContext, Result};

/// A vertex as laid out in the vertex storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 4],
    pub uv: [f32; 4],
    pub normal: [f32; 4],
}

/// CPU-side mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Unit cube centred on the origin, four vertices per face.
///
/// Triangles wind counter-clockwise seen from outside.
pub fn cube() -> MeshData {
    // (normal, u, v) with u x v == normal.
    const FACES: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];
    const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut mesh = MeshData::default();
    for (face, (normal, u, v)) in FACES.into_iter().enumerate() {
        let base = (face * 4) as u32;
        for (su, sv) in CORNERS {
            let position = 0.5 * (normal + u * su + v * sv);
            mesh.vertices.push(Vertex {
                position: position.extend(1.0).to_array(),
                uv: [(su + 1.0) * 0.5, (sv + 1.0) * 0.5, 0.0, 0.0],
                normal: normal.extend(0.0).to_array(),
            });
        }
        mesh.indices
            .extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// A mesh uploaded to device-local buffers.
pub struct GpuMesh {
    pub vertex_buffer: GpuBuffer,
    pub index_buffer: GpuBuffer,
    pub index_count: u32,
    pub vertex_address: vk::DeviceAddress,
}

impl GpuMesh {
    /// Upload `mesh` through the staged copy path.
    pub fn upload(gpu: &GpuContext, mesh: &MeshData, name: &str) -> Result<Self> {
        let vertex_size = std::mem::size_of_val(mesh.vertices.as_slice()) as u64;
        let index_size = std::mem::size_of_val(mesh.indices.as_slice()) as u64;

        let vertex_buffer = gpu.allocator().lock().create_buffer(
            vertex_size,
            vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            &format!("{name} vertices"),
        )?;
        let index_buffer = gpu.allocator().lock().create_buffer(
            index_size,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            &format!("{name} indices"),
        )?;

        let mut uploaded = Self {
            vertex_address: vertex_buffer.device_address(gpu.device()),
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        };

        let result = uploaded
            .vertex_buffer
            .upload(gpu, &mesh.vertices)
            .and_then(|()| uploaded.index_buffer.upload(gpu, &mesh.indices));
        if let Err(e) = result {
            uploaded.destroy(gpu)?;
            return Err(e);
        }

        tracing::debug!(
            "Uploaded mesh '{}': {} vertices, {} indices",
            name,
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(uploaded)
    }

    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let mut allocator = gpu.allocator().lock();
        allocator.free_buffer(&mut self.vertex_buffer)?;
        allocator.free_buffer(&mut self.index_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(v: &Vertex) -> Vec3 {
        Vec3::from_slice(&v.position[..3])
    }

    #[test]
    fn cube_counts() {
        let mesh = cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert!(mesh.indices.iter().all(|&i| i < 24));
    }

    #[test]
    fn triangles_wind_counter_clockwise_from_outside() {
        let mesh = cube();
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| &mesh.vertices[tri[k] as usize]);
            let normal = Vec3::from_slice(&a.normal[..3]);
            let winding = (point(b) - point(a)).cross(point(c) - point(a));
            assert!(winding.dot(normal) > 0.0, "triangle {tri:?} faces inwards");
        }
    }

    #[test]
    fn vertices_lie_on_their_face() {
        for v in &cube().vertices {
            let normal = Vec3::from_slice(&v.normal[..3]);
            assert!((point(v).dot(normal) - 0.5).abs() < 1e-6);
            assert!(point(v).abs().max_element() <= 0.5);
            assert!(v.uv[0] >= 0.0 && v.uv[0] <= 1.0);
        }
    }

    #[test]
    fn vertex_stride_matches_shader() {
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
    }
}
