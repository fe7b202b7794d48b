use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use gltf_scene_import::{
    scene::{DefaultSceneTypeFactory, SceneLeaf},
    vfs::NativeFileSystem,
    ConfigFileLoader, DeferredTextureCache, GltfImporter, ImportOptions, SceneImportResult,
    SceneLoadingStats,
};

#[derive(Parser)]
#[command(name = "import_scene")]
#[command(about = "Imports a glTF scene and prints what it contains")]
struct Cli {
    /// glTF or GLB file
    #[arg(short, long)]
    input: PathBuf,

    /// JSON file with import options, created with the defaults if missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Load textures on a tokio runtime instead of after the import
    #[arg(long = "async")]
    use_async: bool,
}

fn print_summary(result: &SceneImportResult, textures: &DeferredTextureCache) {
    let graph = &result.graph;
    let mut mesh_instances = 0;
    let mut skinned_instances = 0;
    for id in graph.walk() {
        match graph.leaf(id) {
            Some(SceneLeaf::MeshInstance(_)) => mesh_instances += 1,
            Some(SceneLeaf::SkinnedMeshInstance(_)) => skinned_instances += 1,
            _ => {}
        }
    }

    println!("Scene '{}'", graph.node(graph.root()).name);
    println!("  nodes:              {}", graph.len());
    println!("  meshes:             {}", result.meshes.len());
    println!("  mesh instances:     {}", mesh_instances);
    println!("  skinned instances:  {}", skinned_instances);
    println!("  materials:          {}", result.materials.len());
    println!("  textures:           {}", textures.len());
    println!("  cameras:            {}", result.cameras.len());
    println!("  lights:             {}", result.lights.len());
    println!("  animations:         {}", result.animations.len());
    println!("  indices:            {}", result.buffers.index_data.len());
    println!("  vertices:           {}", result.buffers.position_data.len());
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let options = match &cli.config {
        Some(path) => ConfigFileLoader::new(path).get_or_load_config()?.clone(),
        None => ImportOptions::default(),
    };

    let fs = Arc::new(NativeFileSystem::new());
    let importer = GltfImporter::new(fs.clone(), Arc::new(DefaultSceneTypeFactory));
    let textures = DeferredTextureCache::new(fs);
    let stats = SceneLoadingStats::default();

    let result = if cli.use_async {
        let runtime = tokio::runtime::Runtime::new()?;
        let result = importer.load(&cli.input, &textures, &options, &stats, Some(runtime.handle()));
        let loaded = runtime.block_on(textures.wait_for_async_loads());
        log::info!("Loaded {} textures asynchronously", loaded);
        result
    } else {
        let result = importer.load(&cli.input, &textures, &options, &stats, None);
        let loaded = textures.process_deferred();
        log::info!("Loaded {} deferred textures", loaded);
        result
    }
    .with_context(|| format!("Failed to import {:?}", cli.input))?;

    print_summary(&result, &textures);
    Ok(())
}
