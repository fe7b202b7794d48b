use std::sync::Arc;

use super::{Material, MeshGeometry, MeshInfo, MeshInstance};

/// Creates the engine objects the importer fills in.
/// Applications override these to start from their own defaults.
pub trait SceneTypeFactory: Send + Sync {
    fn create_material(&self) -> Material {
        Material::default()
    }

    fn create_mesh(&self) -> MeshInfo {
        MeshInfo::default()
    }

    fn create_mesh_geometry(&self) -> MeshGeometry {
        MeshGeometry::default()
    }

    fn create_mesh_instance(&self, mesh: Arc<MeshInfo>) -> MeshInstance {
        MeshInstance { mesh }
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct DefaultSceneTypeFactory;

impl SceneTypeFactory for DefaultSceneTypeFactory {}
