use std::sync::Arc;

use ultraviolet::{Mat4, Vec2, Vec3, Vec4};

use super::{Material, NodeId};

/// Axis aligned bounding box. An empty box has `min > max`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box3 {
    pub min: Vec3,
    pub max: Vec3,
}

impl Box3 {
    pub fn empty() -> Self {
        Self {
            min: Vec3::broadcast(f32::INFINITY),
            max: Vec3::broadcast(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn insert_point(&mut self, point: Vec3) {
        self.min = self.min.min_by_component(point);
        self.max = self.max.max_by_component(point);
    }

    /// Grows the box to contain a sphere.
    pub fn insert_sphere(&mut self, center: Vec3, radius: f32) {
        let radius = Vec3::broadcast(radius.abs());
        self.insert_point(center - radius);
        self.insert_point(center + radius);
    }

    pub fn union(&mut self, other: &Box3) {
        if !other.is_empty() {
            self.insert_point(other.min);
            self.insert_point(other.max);
        }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.y >= self.min.y
            && point.z >= self.min.z
            && point.x <= self.max.x
            && point.y <= self.max.y
            && point.z <= self.max.z
    }
}

impl Default for Box3 {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BufferRange {
    pub byte_offset: u64,
    pub byte_size: u64,
}

/// Packed vertex and index data shared by all meshes of one asset.
#[derive(Debug, Default)]
pub struct BufferGroup {
    pub index_data: Vec<u32>,
    pub position_data: Vec<Vec3>,
    /// snorm8x4, see [`super::vector_to_snorm8`]
    pub normal_data: Vec<u32>,
    /// snorm8x4, the handedness is stored in w
    pub tangent_data: Vec<u32>,
    pub texcoord1_data: Vec<Vec2>,
    pub joint_data: Vec<[u16; 4]>,
    pub weight_data: Vec<Vec4>,
    pub radius_data: Vec<f32>,
    pub morph_target_data: Vec<Vec4>,
    pub morph_target_buffer_range: Vec<BufferRange>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MeshType {
    #[default]
    Triangles,
    CurvePolytubes,
    CurveDisjointOrthogonalTriangleStrips,
    CurveLinearSweptSpheres,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PrimitiveType {
    #[default]
    Triangles,
    Lines,
    LineStrip,
}

#[derive(Clone, Debug)]
pub struct MeshGeometry {
    pub material: Option<Arc<Material>>,
    pub primitive_type: PrimitiveType,
    pub index_offset_in_mesh: u32,
    pub vertex_offset_in_mesh: u32,
    pub num_indices: u32,
    pub num_vertices: u32,
    pub object_space_bounds: Box3,
}

impl Default for MeshGeometry {
    fn default() -> Self {
        Self {
            material: None,
            primitive_type: PrimitiveType::Triangles,
            index_offset_in_mesh: 0,
            vertex_offset_in_mesh: 0,
            num_indices: 0,
            num_vertices: 0,
            object_space_bounds: Box3::empty(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MeshInfo {
    pub name: String,
    pub mesh_type: MeshType,
    pub buffers: Option<Arc<BufferGroup>>,
    pub geometries: Vec<MeshGeometry>,
    pub object_space_bounds: Box3,
    pub index_offset: u32,
    pub vertex_offset: u32,
    pub total_indices: u32,
    pub total_vertices: u32,
    pub is_skin_prototype: bool,
    pub is_morph_target_animation_mesh: bool,
}

impl MeshInfo {
    /// The slice of the shared index buffer that belongs to this mesh.
    pub fn indices(&self) -> &[u32] {
        let start = self.index_offset as usize;
        let end = start + self.total_indices as usize;
        self.buffers
            .as_ref()
            .and_then(|buffers| buffers.index_data.get(start..end))
            .unwrap_or(&[])
    }

    pub fn positions(&self) -> &[Vec3] {
        let start = self.vertex_offset as usize;
        let end = start + self.total_vertices as usize;
        self.buffers
            .as_ref()
            .and_then(|buffers| buffers.position_data.get(start..end))
            .unwrap_or(&[])
    }
}

#[derive(Clone, Debug)]
pub struct MeshInstance {
    pub mesh: Arc<MeshInfo>,
}

#[derive(Clone, Debug)]
pub struct SkinnedMeshJoint {
    pub inverse_bind_matrix: Mat4,
    pub node: NodeId,
}

#[derive(Clone, Debug)]
pub struct SkinnedMeshInstance {
    pub prototype_mesh: Arc<MeshInfo>,
    pub joints: Vec<SkinnedMeshJoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_grow() {
        let mut bounds = Box3::empty();
        assert!(bounds.is_empty());

        bounds.insert_point(Vec3::new(1.0, 2.0, 3.0));
        bounds.insert_sphere(Vec3::zero(), 0.5);
        assert_eq!(bounds.min, Vec3::new(-0.5, -0.5, -0.5));
        assert_eq!(bounds.max, Vec3::new(1.0, 2.0, 3.0));

        let mut total = Box3::empty();
        total.union(&Box3::empty());
        assert!(total.is_empty());
        total.union(&bounds);
        assert!(total.contains(Vec3::new(0.5, 0.5, 0.5)));
    }
}
