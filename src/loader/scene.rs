use std::{path::Path, sync::Arc};

use gltf::accessor::{DataType, Dimensions};
use ultraviolet::{Mat4, Vec4};

use crate::{
    error::ImportError,
    scene::{
        MeshInfo, SceneCamera, SceneGraph, SceneLeaf, SceneLight, SceneTypeFactory,
        SkinnedMeshInstance, SkinnedMeshJoint, NodeId,
    },
    vfs::Blob,
};

use super::accessor::AccessorReader;

pub struct BuiltGraph {
    pub graph: SceneGraph,
    /// The scene node of every glTF node that was reached by the walk
    pub node_ids: Vec<Option<NodeId>>,
    pub cameras: Vec<Arc<SceneCamera>>,
    pub lights: Vec<Arc<SceneLight>>,
}

struct GraphBuilder<'a> {
    meshes: &'a [Arc<MeshInfo>],
    factory: &'a dyn SceneTypeFactory,
    graph: SceneGraph,
    node_ids: Vec<Option<NodeId>>,
    cameras: Vec<SceneCamera>,
    /// Cameras get their final name when they are first attached
    attached_cameras: Vec<Option<Arc<SceneCamera>>>,
    lights: Vec<Arc<SceneLight>>,
    unnamed_camera_counter: u32,
    skinned_nodes: Vec<gltf::Node<'a>>,
}

impl<'a> GraphBuilder<'a> {
    /// Cameras and lights go to a new child when the node already has a leaf
    /// or still waits for its skinned mesh.
    fn attach_leaf(&mut self, node: NodeId, leaf: SceneLeaf, reserved: bool) {
        if reserved || self.graph.leaf(node).is_some() {
            let child = self.graph.create_child(node, "");
            self.graph.set_leaf(child, leaf);
        } else {
            self.graph.set_leaf(node, leaf);
        }
    }

    /// Puts a mesh leaf on the node and moves a leaf that was already there to a new child.
    fn set_mesh_leaf(&mut self, node: NodeId, leaf: SceneLeaf) {
        if let Some(previous) = self.graph.set_leaf(node, leaf) {
            let child = self.graph.create_child(node, "");
            self.graph.set_leaf(child, previous);
        }
    }

    fn camera(&mut self, index: usize) -> Option<Arc<SceneCamera>> {
        if let Some(camera) = self.attached_cameras.get(index)?.as_ref() {
            return Some(camera.clone());
        }
        let mut camera = self.cameras.get(index)?.clone();
        if camera.name.is_empty() {
            camera.name = format!("Camera{}", self.unnamed_camera_counter);
            self.unnamed_camera_counter += 1;
        }
        let camera = Arc::new(camera);
        self.attached_cameras[index] = Some(camera.clone());
        Some(camera)
    }

    fn load_node(&mut self, node: &gltf::Node<'a>, parent: NodeId) -> NodeId {
        let id = self
            .graph
            .create_child(parent, node.name().unwrap_or_default());
        self.graph.node_mut(id).transform = node.transform().into();
        self.node_ids[node.index()] = Some(id);

        let skinned = node.skin().is_some();
        if skinned {
            // Joints may not exist yet, skins are resolved after the walk
            self.skinned_nodes.push(node.clone());
        } else if let Some(mesh) = node.mesh() {
            if let Some(mesh) = self.meshes.get(mesh.index()) {
                let instance = self.factory.create_mesh_instance(mesh.clone());
                self.graph.set_leaf(id, SceneLeaf::MeshInstance(instance));
            }
        }

        let mesh_pending = skinned && node.mesh().is_some();
        if let Some(camera) = node.camera().and_then(|camera| self.camera(camera.index())) {
            self.attach_leaf(id, SceneLeaf::Camera(camera), mesh_pending);
        }

        if let Some(light) = node
            .light()
            .and_then(|light| self.lights.get(light.index()).cloned())
        {
            self.attach_leaf(id, SceneLeaf::Light(light), mesh_pending);
        }

        id
    }

    /// Depth first with an explicit stack, children keep their order.
    fn walk(&mut self, roots: Vec<gltf::Node<'a>>) {
        let root = self.graph.root();
        let mut stack: Vec<(gltf::Node<'a>, NodeId)> =
            roots.into_iter().rev().map(|node| (node, root)).collect();

        while let Some((node, parent)) = stack.pop() {
            if self.node_ids[node.index()].is_some() {
                log::warn!(
                    "Node {} is reachable more than once, only the first occurrence is used",
                    node.index()
                );
                continue;
            }
            let id = self.load_node(&node, parent);
            let children: Vec<_> = node.children().collect();
            stack.extend(children.into_iter().rev().map(|child| (child, id)));
        }
    }

    fn resolve_skins(&mut self, buffers: &[Blob]) -> Result<(), ImportError> {
        for node in std::mem::take(&mut self.skinned_nodes) {
            let (Some(skin), Some(id)) = (node.skin(), self.node_ids[node.index()]) else {
                continue;
            };
            let Some(mesh) = node.mesh().and_then(|mesh| self.meshes.get(mesh.index())) else {
                log::warn!("Node {} has a skin but no mesh, ignoring the skin", node.index());
                continue;
            };

            if !mesh.is_skin_prototype {
                log::warn!(
                    "Mesh '{}' is used with a skin, but has no joints or weights",
                    mesh.name
                );
                let instance = self.factory.create_mesh_instance(mesh.clone());
                self.set_mesh_leaf(id, SceneLeaf::MeshInstance(instance));
                continue;
            }

            let inverse_bind_matrices = skin
                .inverse_bind_matrices()
                .map(|accessor| {
                    AccessorReader::new(&accessor, buffers)?.expect(
                        "inverse bind matrices",
                        &[DataType::F32],
                        &[Dimensions::Mat4],
                    )
                })
                .transpose()?;

            let mut joints = Vec::new();
            for (joint_index, joint_node) in skin.joints().enumerate() {
                // Joint indices in the vertex data must stay aligned, so missing joints use the root
                let Some(joint_id) = self.node_ids[joint_node.index()] else {
                    log::warn!(
                        "Joint node {} of skin {} is not part of the scene, using the root instead",
                        joint_node.index(),
                        skin.index()
                    );
                    joints.push(SkinnedMeshJoint {
                        inverse_bind_matrix: Mat4::identity(),
                        node: self.graph.root(),
                    });
                    continue;
                };
                // A short accessor leaves the remaining joints at identity
                let inverse_bind_matrix = inverse_bind_matrices
                    .as_ref()
                    .filter(|reader| joint_index < reader.count())
                    .map(|reader| column_major_matrix(reader.read_floats::<16>(joint_index)))
                    .unwrap_or_else(Mat4::identity);
                joints.push(SkinnedMeshJoint {
                    inverse_bind_matrix,
                    node: joint_id,
                });

                if self.graph.leaf(joint_id).is_none() {
                    self.graph
                        .set_leaf(joint_id, SceneLeaf::SkinnedMeshReference { instance: id });
                }
            }

            let instance = SkinnedMeshInstance {
                prototype_mesh: mesh.clone(),
                joints,
            };
            self.set_mesh_leaf(id, SceneLeaf::SkinnedMeshInstance(Arc::new(instance)));
        }
        Ok(())
    }
}

fn column_major_matrix(m: [f32; 16]) -> Mat4 {
    Mat4::new(
        Vec4::new(m[0], m[1], m[2], m[3]),
        Vec4::new(m[4], m[5], m[6], m[7]),
        Vec4::new(m[8], m[9], m[10], m[11]),
        Vec4::new(m[12], m[13], m[14], m[15]),
    )
}

/// The nodes the scene starts from: the default scene, else the first scene, else every parentless node.
fn root_nodes<'a>(document: &'a gltf::Document) -> Vec<gltf::Node<'a>> {
    if let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) {
        return scene.nodes().collect();
    }

    let mut has_parent = vec![false; document.nodes().len()];
    for node in document.nodes() {
        for child in node.children() {
            has_parent[child.index()] = true;
        }
    }
    document
        .nodes()
        .filter(|node| !has_parent[node.index()])
        .collect()
}

/// Builds the node hierarchy with its mesh, camera, light and skin leaves.
pub fn build_graph(
    document: &gltf::Document,
    file_name: &Path,
    meshes: &[Arc<MeshInfo>],
    buffers: &[Blob],
    factory: &dyn SceneTypeFactory,
) -> Result<BuiltGraph, ImportError> {
    let root_name = file_name
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cameras: Vec<SceneCamera> = document.cameras().map(SceneCamera::from).collect();
    let lights: Vec<Arc<SceneLight>> = document
        .lights()
        .map(|lights| lights.map(|light| Arc::new(SceneLight::from(light))).collect())
        .unwrap_or_default();

    let mut builder = GraphBuilder {
        meshes,
        factory,
        graph: SceneGraph::new(root_name),
        node_ids: vec![None; document.nodes().len()],
        attached_cameras: vec![None; cameras.len()],
        cameras,
        lights,
        unnamed_camera_counter: 1,
        skinned_nodes: Vec::new(),
    };

    builder.walk(root_nodes(document));
    builder.resolve_skins(buffers)?;

    let cameras = builder
        .attached_cameras
        .into_iter()
        .zip(builder.cameras)
        .map(|(attached, camera)| attached.unwrap_or_else(|| Arc::new(camera)))
        .collect();

    Ok(BuiltGraph {
        graph: builder.graph,
        node_ids: builder.node_ids,
        cameras,
        lights: builder.lights,
    })
}
