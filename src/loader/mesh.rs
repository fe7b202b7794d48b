use std::sync::Arc;

use gltf::{
    accessor::{DataType, Dimensions},
    mesh::Mode,
    Semantic,
};
use ultraviolet::{Vec2, Vec3, Vec4};

use crate::{
    config_loader::ImportOptions,
    error::ImportError,
    scene::{
        vector_to_snorm8, Box3, BufferGroup, BufferRange, Material, MeshInfo, MeshType,
        PrimitiveType, SceneTypeFactory,
    },
    vfs::Blob,
};

use super::{accessor::AccessorReader, tangent::compute_tangents};

const INDEX_TYPES: [DataType; 3] = [DataType::U8, DataType::U16, DataType::U32];
const NORMALIZED_TYPES: [DataType; 3] = [DataType::F32, DataType::U8, DataType::U16];

/// The geometry of one asset, packed into a single buffer group.
pub struct AssembledGeometry {
    /// One per glTF mesh, in document order.
    pub meshes: Vec<Arc<MeshInfo>>,
    pub buffers: Arc<BufferGroup>,
    /// Copies of the source buffers that received rebuilt tangents.
    pub rebuilt_buffers: Vec<Option<Vec<u8>>>,
}

fn primitive_type(mode: Mode) -> Option<PrimitiveType> {
    match mode {
        Mode::Triangles => Some(PrimitiveType::Triangles),
        Mode::Lines => Some(PrimitiveType::Lines),
        Mode::LineStrip => Some(PrimitiveType::LineStrip),
        _ => None,
    }
}

fn is_radius(semantic: &Semantic) -> bool {
    match semantic {
        Semantic::Extras(name) => name.trim_start_matches('_').starts_with("RADIUS"),
        _ => false,
    }
}

fn vertex_count(primitive: &gltf::Primitive<'_>) -> usize {
    primitive
        .get(&Semantic::Positions)
        .or_else(|| primitive.attributes().next().map(|(_, accessor)| accessor))
        .map(|accessor| accessor.count())
        .unwrap_or(0)
}

fn supported_primitives<'a>(
    mesh: &gltf::Mesh<'a>,
) -> impl Iterator<Item = (gltf::Primitive<'a>, PrimitiveType)> + 'a {
    mesh.primitives().filter_map(|primitive| {
        let primitive_type = primitive_type(primitive.mode())?;
        primitive
            .attributes()
            .next()
            .is_some()
            .then_some((primitive, primitive_type))
    })
}

#[derive(Default)]
struct AllocationSizes {
    indices: usize,
    vertices: usize,
    has_joints: bool,
}

fn count_allocation_sizes(document: &gltf::Document) -> AllocationSizes {
    let mut sizes = AllocationSizes::default();
    for mesh in document.meshes() {
        for (primitive, _) in supported_primitives(&mesh) {
            let vertices = vertex_count(&primitive);
            sizes.indices += primitive
                .indices()
                .map(|accessor| accessor.count())
                .unwrap_or(vertices);
            sizes.vertices += vertices;
            sizes.has_joints |= primitive.attributes().any(|(semantic, _)| {
                matches!(semantic, Semantic::Joints(_) | Semantic::Weights(_))
            });
        }
    }
    sizes
}

struct GeometryAssembler<'a> {
    buffers: &'a [Blob],
    materials: &'a [Arc<Material>],
    factory: &'a dyn SceneTypeFactory,
    options: &'a ImportOptions,
    group: BufferGroup,
    rebuilt_buffers: Vec<Option<Vec<u8>>>,
    /// Vertices over all meshes, the size of one morph target frame
    asset_vertices: usize,
    total_indices: usize,
    total_vertices: usize,
}

impl<'a> GeometryAssembler<'a> {
    fn attribute(
        &self,
        primitive: &gltf::Primitive<'_>,
        semantic: &Semantic,
    ) -> Result<Option<AccessorReader<'a>>, ImportError> {
        primitive
            .get(semantic)
            .map(|accessor| AccessorReader::new(&accessor, self.buffers))
            .transpose()
    }

    fn check_count(
        mesh: &MeshInfo,
        attribute: &'static str,
        expected: usize,
        reader: &AccessorReader<'_>,
    ) -> Result<(), ImportError> {
        if reader.count() == expected {
            Ok(())
        } else {
            Err(ImportError::AttributeCountMismatch {
                mesh: mesh.name.clone(),
                attribute,
                expected,
                found: reader.count(),
            })
        }
    }

    fn write_rebuilt_tangent(&mut self, location: (usize, usize), tangent: Vec4) {
        let (buffer_index, offset) = location;
        let Some(source) = self.buffers.get(buffer_index) else {
            return;
        };
        let copy = self.rebuilt_buffers[buffer_index].get_or_insert_with(|| source.to_vec());
        if let Some(target) = copy.get_mut(offset..offset + 16) {
            for (bytes, value) in target.chunks_exact_mut(4).zip(tangent.as_array()) {
                bytes.copy_from_slice(&value.to_le_bytes());
            }
        }
    }

    fn load_mesh(
        &mut self,
        gltf_mesh: &gltf::Mesh<'_>,
        missing_material: &Arc<Material>,
    ) -> Result<MeshInfo, ImportError> {
        let mut mesh = self.factory.create_mesh();
        mesh.name = gltf_mesh.name().unwrap_or_default().to_string();
        mesh.index_offset = self.total_indices as u32;
        mesh.vertex_offset = self.total_vertices as u32;

        let mut morph_frames: Vec<Vec<Vec3>> = Vec::new();

        for (primitive, primitive_type) in supported_primitives(gltf_mesh) {
            if primitive_type != PrimitiveType::Triangles {
                mesh.mesh_type = MeshType::CurvePolytubes;
            }

            let positions = self
                .attribute(&primitive, &Semantic::Positions)?
                .ok_or_else(|| ImportError::MissingPositions {
                    mesh: mesh.name.clone(),
                })?
                .expect("positions", &[DataType::F32], &[Dimensions::Vec3])?;
            let vertex_count = positions.count();
            let first_vertex = self.total_vertices;
            let vertex_range = first_vertex..first_vertex + vertex_count;

            let indices = match primitive.indices() {
                Some(accessor) => Some(
                    AccessorReader::new(&accessor, self.buffers)?.expect(
                        "indices",
                        &INDEX_TYPES,
                        &[Dimensions::Scalar],
                    )?,
                ),
                None => None,
            };
            let index_count = indices.as_ref().map_or(vertex_count, |reader| reader.count());
            let index_range = self.total_indices..self.total_indices + index_count;

            let index_target = &mut self.group.index_data[index_range.clone()];
            match &indices {
                Some(reader) => {
                    for (i, index) in index_target.iter_mut().enumerate() {
                        *index = reader.read_index(i);
                    }
                }
                None => {
                    for (i, index) in index_target.iter_mut().enumerate() {
                        *index = i as u32;
                    }
                }
            }

            let mut bounds = Box3::empty();
            for (i, position) in self.group.position_data[vertex_range.clone()]
                .iter_mut()
                .enumerate()
            {
                *position = Vec3::from(positions.read_floats::<3>(i));
                bounds.insert_point(*position);
            }

            let radius = primitive
                .attributes()
                .find(|(semantic, _)| is_radius(semantic))
                .map(|(_, accessor)| AccessorReader::new(&accessor, self.buffers))
                .transpose()?;
            match radius {
                Some(reader) if !self.group.radius_data.is_empty() => {
                    let reader = reader.expect("radius", &[DataType::F32], &[Dimensions::Scalar])?;
                    Self::check_count(&mesh, "radius", vertex_count, &reader)?;
                    for i in 0..vertex_count {
                        let [radius] = reader.read_floats::<1>(i);
                        let vertex = first_vertex + i;
                        self.group.radius_data[vertex] = radius;
                        bounds.insert_sphere(self.group.position_data[vertex], radius);
                    }
                }
                Some(_) => {}
                None => self.group.radius_data.clear(),
            }

            let normals = match self.attribute(&primitive, &Semantic::Normals)? {
                Some(reader) => {
                    let reader = reader.expect("normals", &[DataType::F32], &[Dimensions::Vec3])?;
                    Self::check_count(&mesh, "normal", vertex_count, &reader)?;
                    Some(reader)
                }
                None => None,
            };
            if let Some(reader) = &normals {
                for (i, normal) in self.group.normal_data[vertex_range.clone()]
                    .iter_mut()
                    .enumerate()
                {
                    *normal = vector_to_snorm8(reader.read_floats::<4>(i));
                }
            }

            let tangents = match self.attribute(&primitive, &Semantic::Tangents)? {
                Some(reader) => {
                    let reader = reader.expect("tangents", &[DataType::F32], &[Dimensions::Vec4])?;
                    Self::check_count(&mesh, "tangent", vertex_count, &reader)?;
                    Some(reader)
                }
                None => None,
            };
            if let Some(reader) = &tangents {
                for (i, tangent) in self.group.tangent_data[vertex_range.clone()]
                    .iter_mut()
                    .enumerate()
                {
                    *tangent = vector_to_snorm8(reader.read_floats::<4>(i));
                }
            }

            let texcoords = match self.attribute(&primitive, &Semantic::TexCoords(0))? {
                Some(reader) => {
                    let reader = reader.expect(
                        "texture coordinates",
                        &NORMALIZED_TYPES,
                        &[Dimensions::Vec2],
                    )?;
                    Self::check_count(&mesh, "texture coordinate", vertex_count, &reader)?;
                    Some(reader)
                }
                None => None,
            };
            for (i, texcoord) in self.group.texcoord1_data[vertex_range.clone()]
                .iter_mut()
                .enumerate()
            {
                *texcoord = match &texcoords {
                    Some(reader) => Vec2::from(reader.read_floats::<2>(i)),
                    None => Vec2::zero(),
                };
            }

            if let (Some(normals), Some(_)) = (&normals, &texcoords) {
                if tangents.is_none() || self.options.force_rebuild_tangents {
                    let normal_values: Vec<Vec3> = (0..vertex_count)
                        .map(|i| Vec3::from(normals.read_floats::<3>(i)))
                        .collect();
                    let computed = compute_tangents(
                        &self.group.index_data[index_range.clone()],
                        &self.group.position_data[vertex_range.clone()],
                        &normal_values,
                        &self.group.texcoord1_data[vertex_range.clone()],
                    );
                    for (i, tangent) in computed.into_iter().enumerate() {
                        self.group.tangent_data[first_vertex + i] =
                            vector_to_snorm8(*tangent.as_array());
                        if self.options.force_rebuild_tangents {
                            if let Some(location) =
                                tangents.as_ref().and_then(|reader| reader.element_location(i))
                            {
                                self.write_rebuilt_tangent(location, tangent);
                            }
                        }
                    }
                }
            }

            if let Some(reader) = self.attribute(&primitive, &Semantic::Joints(0))? {
                let reader = reader.expect(
                    "joints",
                    &[DataType::U8, DataType::U16],
                    &[Dimensions::Vec4],
                )?;
                Self::check_count(&mesh, "joint", vertex_count, &reader)?;
                mesh.is_skin_prototype = true;
                for (i, joints) in self.group.joint_data[vertex_range.clone()]
                    .iter_mut()
                    .enumerate()
                {
                    *joints = reader.read_u16x4(i);
                }
            }

            if let Some(reader) = self.attribute(&primitive, &Semantic::Weights(0))? {
                let reader = reader.expect("weights", &NORMALIZED_TYPES, &[Dimensions::Vec4])?;
                Self::check_count(&mesh, "weight", vertex_count, &reader)?;
                mesh.is_skin_prototype = true;
                for (i, weights) in self.group.weight_data[vertex_range.clone()]
                    .iter_mut()
                    .enumerate()
                {
                    *weights = Vec4::from(reader.read_unorm::<4>(i));
                }
            }

            let mut geometry = self.factory.create_mesh_geometry();
            geometry.material = match primitive.material().index() {
                Some(index) => self.materials.get(index).cloned(),
                None => None,
            };
            if geometry.material.is_none() {
                log::warn!(
                    "Geometry {} for mesh '{}' doesn't have a material.",
                    mesh.geometries.len(),
                    mesh.name
                );
                geometry.material = Some(missing_material.clone());
            }

            let targets: Vec<_> = primitive.morph_targets().collect();
            if !targets.is_empty() {
                mesh.is_morph_target_animation_mesh = true;
                if morph_frames.len() < targets.len() {
                    morph_frames.resize_with(targets.len(), Vec::new);
                }

                for (target, frame) in targets.iter().zip(morph_frames.iter_mut()) {
                    let Some(accessor) = target.positions() else {
                        continue;
                    };
                    let reader = AccessorReader::new(&accessor, self.buffers)?.expect(
                        "morph target positions",
                        &[DataType::F32],
                        &[Dimensions::Vec3],
                    )?;
                    frame.resize(self.asset_vertices, Vec3::zero());
                    let count = reader.count().min(vertex_count);
                    for i in 0..count {
                        let delta = Vec3::from(reader.read_floats::<3>(i));
                        frame[first_vertex + i] = delta;
                        bounds.insert_point(self.group.position_data[first_vertex + i] + delta);
                    }
                }
            }

            geometry.primitive_type = primitive_type;
            geometry.index_offset_in_mesh = mesh.total_indices;
            geometry.vertex_offset_in_mesh = mesh.total_vertices;
            geometry.num_indices = index_count as u32;
            geometry.num_vertices = vertex_count as u32;
            geometry.object_space_bounds = bounds;

            mesh.object_space_bounds.union(&bounds);
            mesh.total_indices += geometry.num_indices;
            mesh.total_vertices += geometry.num_vertices;
            mesh.geometries.push(geometry);

            self.total_indices += index_count;
            self.total_vertices += vertex_count;
        }

        for frame in morph_frames {
            let range = BufferRange {
                byte_offset: (self.group.morph_target_data.len() * std::mem::size_of::<Vec4>())
                    as u64,
                byte_size: (frame.len() * std::mem::size_of::<Vec4>()) as u64,
            };
            self.group.morph_target_buffer_range.push(range);
            self.group
                .morph_target_data
                .extend(frame.into_iter().map(|delta| Vec4::new(delta.x, delta.y, delta.z, 0.0)));
        }

        Ok(mesh)
    }
}

/// Packs the geometry of every glTF mesh into one shared [`BufferGroup`].
pub fn assemble_geometry(
    document: &gltf::Document,
    buffers: &[Blob],
    materials: &[Arc<Material>],
    factory: &dyn SceneTypeFactory,
    options: &ImportOptions,
) -> Result<AssembledGeometry, ImportError> {
    let sizes = count_allocation_sizes(document);
    log::debug!(
        "Allocating {} indices and {} vertices",
        sizes.indices,
        sizes.vertices
    );

    let mut group = BufferGroup {
        index_data: vec![0; sizes.indices],
        position_data: vec![Vec3::zero(); sizes.vertices],
        normal_data: vec![0; sizes.vertices],
        tangent_data: vec![0; sizes.vertices],
        texcoord1_data: vec![Vec2::zero(); sizes.vertices],
        radius_data: vec![0.0; sizes.vertices],
        ..Default::default()
    };
    if sizes.has_joints {
        group.joint_data = vec![[0; 4]; sizes.vertices];
        group.weight_data = vec![Vec4::zero(); sizes.vertices];
    }

    let mut assembler = GeometryAssembler {
        buffers,
        materials,
        factory,
        options,
        group,
        rebuilt_buffers: vec![None; buffers.len()],
        asset_vertices: sizes.vertices,
        total_indices: 0,
        total_vertices: 0,
    };

    let missing_material = Arc::new(Material::missing_material());
    let mut meshes = Vec::with_capacity(document.meshes().len());
    for gltf_mesh in document.meshes() {
        meshes.push(assembler.load_mesh(&gltf_mesh, &missing_material)?);
    }

    let buffers = Arc::new(assembler.group);
    let meshes = meshes
        .into_iter()
        .map(|mut mesh| {
            mesh.buffers = Some(buffers.clone());
            Arc::new(mesh)
        })
        .collect();

    Ok(AssembledGeometry {
        meshes,
        buffers,
        rebuilt_buffers: assembler.rebuilt_buffers,
    })
}
