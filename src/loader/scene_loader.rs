use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use serde_json::Value;
use tokio::runtime::Handle;

use crate::{
    config_loader::ImportOptions,
    error::ImportError,
    scene::{
        BufferGroup, Material, MeshInfo, SceneCamera, SceneGraph, SceneGraphAnimation,
        SceneLight, SceneTypeFactory,
    },
    texture_cache::TextureCache,
    vfs::{Blob, FileSystem},
};

use super::{
    animation::load_animations,
    buffer::load_buffers,
    extensions::{MSFT_TEXTURE_DDS, NV_MATERIALS_HAIR, NV_MATERIALS_SUBSURFACE, NV_TEXTURE_SWIZZLE},
    material::load_materials,
    mesh::assemble_geometry,
    scene::build_graph,
    texture::TextureResolver,
};

/// Progress counters that the host can read while an import is running.
#[derive(Debug, Default)]
pub struct SceneLoadingStats {
    pub objects_total: AtomicU32,
    pub objects_loaded: AtomicU32,
}

impl SceneLoadingStats {
    fn add_total(&self, count: usize) {
        self.objects_total.fetch_add(count as u32, Ordering::Relaxed);
    }

    fn add_loaded(&self, count: usize) {
        self.objects_loaded.fetch_add(count as u32, Ordering::Relaxed);
    }
}

/// Everything one import produced.
pub struct SceneImportResult {
    pub graph: SceneGraph,
    pub buffers: Arc<BufferGroup>,
    pub meshes: Vec<Arc<MeshInfo>>,
    pub materials: Vec<Arc<Material>>,
    pub cameras: Vec<Arc<SceneCamera>>,
    pub lights: Vec<Arc<SceneLight>>,
    pub animations: Vec<Arc<SceneGraphAnimation>>,
}

/// Imports glTF and GLB files into a scene graph.
///
/// The importer keeps no state between calls, so one instance can serve concurrent imports.
pub struct GltfImporter {
    fs: Arc<dyn FileSystem>,
    factory: Arc<dyn SceneTypeFactory>,
}

/// Extensions read from the raw JSON. The `gltf` crate doesn't know them and
/// would reject an asset that lists them as required.
const RAW_JSON_EXTENSIONS: [&str; 4] = [
    MSFT_TEXTURE_DDS,
    NV_TEXTURE_SWIZZLE,
    NV_MATERIALS_SUBSURFACE,
    NV_MATERIALS_HAIR,
];

struct ParsedAsset {
    document: gltf::Document,
    blob: Option<Vec<u8>>,
    json: Value,
}

fn parse_asset(data: &[u8]) -> Result<ParsedAsset, ImportError> {
    let (json, blob): (Value, Option<Vec<u8>>) = if data.starts_with(b"glTF") {
        let glb = gltf::Glb::from_slice(data)?;
        (
            serde_json::from_slice(&glb.json)?,
            glb.bin.map(|bin| bin.into_owned()),
        )
    } else {
        (serde_json::from_slice(data)?, None)
    };

    let mut validated = json.clone();
    if let Some(required) = validated
        .get_mut("extensionsRequired")
        .and_then(Value::as_array_mut)
    {
        required.retain(|name| {
            !name
                .as_str()
                .is_some_and(|name| RAW_JSON_EXTENSIONS.contains(&name))
        });
    }
    let root: gltf::json::Root = serde_json::from_value(validated)?;
    let document = gltf::Document::from_json(root)?;

    Ok(ParsedAsset {
        document,
        blob,
        json,
    })
}

impl GltfImporter {
    pub fn new(fs: Arc<dyn FileSystem>, factory: Arc<dyn SceneTypeFactory>) -> Self {
        Self { fs, factory }
    }

    pub fn load(
        &self,
        file_name: impl AsRef<Path>,
        texture_cache: &dyn TextureCache,
        options: &ImportOptions,
        stats: &SceneLoadingStats,
        executor: Option<&Handle>,
    ) -> Result<SceneImportResult, ImportError> {
        let file_name = file_name.as_ref();
        let result = self.load_inner(file_name, texture_cache, options, stats, executor);
        match &result {
            Ok(result) => log::info!(
                "Loaded {:?}: {} meshes, {} materials, {} nodes",
                file_name,
                result.meshes.len(),
                result.materials.len(),
                result.graph.len()
            ),
            Err(err) => log::error!("Couldn't load glTF file {:?}: {}", file_name, err),
        }
        result
    }

    fn load_inner(
        &self,
        file_name: &Path,
        texture_cache: &dyn TextureCache,
        options: &ImportOptions,
        stats: &SceneLoadingStats,
        executor: Option<&Handle>,
    ) -> Result<SceneImportResult, ImportError> {
        let data = self
            .fs
            .read_file(file_name)
            .map_err(|source| ImportError::Io {
                path: file_name.to_path_buf(),
                source,
            })?;

        let ParsedAsset {
            document,
            blob,
            json,
        } = parse_asset(&data)?;

        stats.add_total(
            document.materials().len()
                + document.meshes().len()
                + document.nodes().len()
                + document.animations().len(),
        );

        let buffers = load_buffers(
            &document,
            blob,
            file_name,
            self.fs.as_ref(),
            options.max_inline_data_size,
        )?;
        log::info!("Loaded {} buffers for {:?}", buffers.len(), file_name);

        let model_file_name = file_name.to_string_lossy();
        let mut textures = TextureResolver::new(
            &document,
            &json,
            &buffers,
            file_name,
            self.fs.as_ref(),
            texture_cache,
            executor,
            options,
        );
        let materials = load_materials(
            &mut textures,
            self.factory.as_ref(),
            &model_file_name,
            options,
        );
        stats.add_loaded(materials.len());

        let geometry = assemble_geometry(
            &document,
            &buffers,
            &materials,
            self.factory.as_ref(),
            options,
        )?;
        stats.add_loaded(geometry.meshes.len());

        let mut built = build_graph(
            &document,
            file_name,
            &geometry.meshes,
            &buffers,
            self.factory.as_ref(),
        )?;
        stats.add_loaded(document.nodes().len());

        let animations =
            load_animations(&document, &mut built.graph, &built.node_ids, &buffers)?;
        stats.add_loaded(document.animations().len());

        if options.force_rebuild_tangents {
            self.write_rebuilt_buffers(file_name, &buffers, geometry.rebuilt_buffers);
        }

        Ok(SceneImportResult {
            graph: built.graph,
            buffers: geometry.buffers,
            meshes: geometry.meshes,
            materials,
            cameras: built.cameras,
            lights: built.lights,
            animations,
        })
    }

    /// Writes every buffer next to the asset as `<stem>.buffer<N>.bin`, with rebuilt tangents patched in.
    fn write_rebuilt_buffers(
        &self,
        file_name: &Path,
        buffers: &[Blob],
        rebuilt_buffers: Vec<Option<Vec<u8>>>,
    ) {
        let stem = file_name
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let directory = file_name.parent().unwrap_or(Path::new(""));

        for (index, (buffer, rebuilt)) in buffers.iter().zip(rebuilt_buffers).enumerate() {
            let path: PathBuf = directory.join(format!("{}.buffer{}.bin", stem, index));
            let data = rebuilt.as_deref().unwrap_or(buffer.as_slice());
            match self.fs.write_file(&path, data) {
                Ok(()) => log::info!("Wrote {:?}", path),
                Err(err) => log::warn!("Couldn't write {:?}: {}", path, err),
            }
        }
    }
}
