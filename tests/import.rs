use std::{
    path::Path,
    sync::{atomic::Ordering, Arc},
};

use base64::Engine;
use gltf_scene_import::{
    scene::{
        AnimationAttribute, BufferRange, CameraProjection, DefaultSceneTypeFactory, ImageContainer,
        InterpolationMode, LightKind, MaterialDomain, MeshType, PrimitiveType, SceneLeaf,
        TextureReference,
    },
    vfs::MemoryFileSystem,
    DeferredTextureCache, GltfImporter, ImportError, ImportOptions, SceneImportResult,
    SceneLoadingStats,
};
use serde_json::{json, Value};
use ultraviolet::{Mat4, Vec3, Vec4};

const TRIANGLE: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// Collects binary data, buffer views and accessors for one test asset.
#[derive(Default)]
struct AssetBuilder {
    data: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl AssetBuilder {
    fn push_view(&mut self, bytes: &[u8]) -> usize {
        while self.data.len() % 4 != 0 {
            self.data.push(0);
        }
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": self.data.len(),
            "byteLength": bytes.len(),
        }));
        self.data.extend_from_slice(bytes);
        self.views.len() - 1
    }

    fn push_accessor(&mut self, accessor: Value) -> usize {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn floats(&mut self, values: &[f32], kind: &str) -> usize {
        let width = match kind {
            "SCALAR" => 1,
            "VEC2" => 2,
            "VEC3" => 3,
            "VEC4" => 4,
            "MAT4" => 16,
            _ => panic!("unknown accessor type {}", kind),
        };
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes);

        let mut accessor = json!({
            "bufferView": view,
            "componentType": 5126,
            "count": values.len() / width,
            "type": kind,
        });
        if width <= 3 {
            let mut min = vec![f32::MAX; width];
            let mut max = vec![f32::MIN; width];
            for element in values.chunks(width) {
                for (c, value) in element.iter().enumerate() {
                    min[c] = min[c].min(*value);
                    max[c] = max[c].max(*value);
                }
            }
            accessor["min"] = json!(min);
            accessor["max"] = json!(max);
        }
        self.push_accessor(accessor)
    }

    fn u16s(&mut self, values: &[u16], kind: &str, count: usize) -> usize {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes);
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": 5123,
            "count": count,
            "type": kind,
        }))
    }

    fn u8s(&mut self, values: &[u8]) -> usize {
        let view = self.push_view(values);
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": 5121,
            "count": values.len(),
            "type": "SCALAR",
        }))
    }

    /// Completes the document and stores it, with its buffer, in the file system.
    fn store(self, fs: &MemoryFileSystem, path: &str, mut document: Value) {
        document["asset"] = json!({ "version": "2.0" });
        if !self.data.is_empty() {
            let bin_path = Path::new(path).with_extension("bin");
            let bin_name = bin_path.file_name().unwrap().to_str().unwrap().to_string();
            document["buffers"] = json!([{ "uri": bin_name, "byteLength": self.data.len() }]);
            document["bufferViews"] = json!(self.views);
            document["accessors"] = json!(self.accessors);
            fs.insert(&bin_path, self.data);
        }
        fs.insert(path, serde_json::to_vec(&document).unwrap());
    }
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0, 0, 0, 13]);
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&[0, 0, 0, 2, 0, 0, 0, 2]);
    bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
    bytes
}

fn import_with(
    fs: Arc<MemoryFileSystem>,
    path: &str,
    options: &ImportOptions,
) -> (Result<SceneImportResult, ImportError>, DeferredTextureCache) {
    let importer = GltfImporter::new(fs.clone(), Arc::new(DefaultSceneTypeFactory));
    let textures = DeferredTextureCache::new(fs);
    let stats = SceneLoadingStats::default();
    let result = importer.load(path, &textures, options, &stats, None);
    (result, textures)
}

fn import(fs: Arc<MemoryFileSystem>, path: &str) -> SceneImportResult {
    import_with(fs, path, &ImportOptions::default()).0.unwrap()
}

fn assert_offsets_are_consistent(result: &SceneImportResult) {
    for mesh in &result.meshes {
        assert!((mesh.vertex_offset + mesh.total_vertices) as usize <= result.buffers.position_data.len());
        assert!((mesh.index_offset + mesh.total_indices) as usize <= result.buffers.index_data.len());
        for geometry in &mesh.geometries {
            assert!(geometry.vertex_offset_in_mesh + geometry.num_vertices <= mesh.total_vertices);
            assert!(geometry.index_offset_in_mesh + geometry.num_indices <= mesh.total_indices);
        }
    }
}

fn triangle_asset(fs: &MemoryFileSystem, path: &str, extra: impl FnOnce(&mut Value)) {
    let mut builder = AssetBuilder::default();
    let positions = builder.floats(&TRIANGLE, "VEC3");
    let indices = builder.u16s(&[0, 1, 2], "SCALAR", 3);

    let mut document = json!({
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Triangle", "mesh": 0 }],
        "meshes": [{
            "name": "TriangleMesh",
            "primitives": [{ "attributes": { "POSITION": positions }, "indices": indices, "material": 0 }]
        }],
        "materials": [{
            "name": "Red",
            "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 1.0] }
        }]
    });
    extra(&mut document);
    builder.store(fs, path, document);
}

#[test]
fn one_triangle_scene() {
    let fs = Arc::new(MemoryFileSystem::new());
    triangle_asset(&fs, "models/triangle.gltf", |_| {});

    let result = import(fs, "models/triangle.gltf");

    assert_eq!(result.meshes.len(), 1);
    let mesh = &result.meshes[0];
    assert_eq!(mesh.name, "TriangleMesh");
    assert_eq!(mesh.mesh_type, MeshType::Triangles);
    assert_eq!(mesh.geometries.len(), 1);
    assert_eq!(mesh.geometries[0].num_indices, 3);
    assert_eq!(mesh.geometries[0].num_vertices, 3);
    assert_eq!(mesh.geometries[0].primitive_type, PrimitiveType::Triangles);
    assert_eq!(mesh.indices(), &[0, 1, 2]);
    assert_eq!(mesh.positions()[1], Vec3::new(1.0, 0.0, 0.0));
    assert!(mesh.object_space_bounds.contains(Vec3::new(0.5, 0.5, 0.0)));
    assert!(Arc::ptr_eq(mesh.buffers.as_ref().unwrap(), &result.buffers));

    let material = mesh.geometries[0].material.as_ref().unwrap();
    assert_eq!(material.name, "Red");
    assert_eq!(material.domain, MaterialDomain::Opaque);
    assert_eq!(material.base_or_diffuse_color, Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(material.opacity, 1.0);
    assert_eq!(material.material_index_in_model, 0);

    let graph = &result.graph;
    let root = graph.node(graph.root());
    assert_eq!(root.name, "triangle.gltf");
    assert_eq!(root.children().len(), 1);
    let child = graph.node(root.children()[0]);
    assert_eq!(child.name, "Triangle");
    assert!(matches!(child.leaf(), Some(SceneLeaf::MeshInstance(instance)) if Arc::ptr_eq(&instance.mesh, mesh)));

    assert_offsets_are_consistent(&result);
    // Without normals there is nothing to build tangents from
    assert_eq!(result.buffers.tangent_data, vec![0; 3]);
    assert!(result.buffers.radius_data.is_empty());
    assert!(result.buffers.joint_data.is_empty());
}

#[test]
fn stats_count_every_object() {
    let fs = Arc::new(MemoryFileSystem::new());
    triangle_asset(&fs, "triangle.gltf", |_| {});

    let importer = GltfImporter::new(fs.clone(), Arc::new(DefaultSceneTypeFactory));
    let textures = DeferredTextureCache::new(fs);
    let stats = SceneLoadingStats::default();
    importer
        .load("triangle.gltf", &textures, &ImportOptions::default(), &stats, None)
        .unwrap();

    assert_eq!(stats.objects_total.load(Ordering::Relaxed), 3);
    assert_eq!(stats.objects_loaded.load(Ordering::Relaxed), 3);
}

#[test]
fn camera_and_light_on_a_mesh_node_get_child_nodes() {
    let fs = Arc::new(MemoryFileSystem::new());
    triangle_asset(&fs, "scene.gltf", |document| {
        document["nodes"][0]["camera"] = json!(0);
        document["nodes"][0]["extensions"] = json!({ "KHR_lights_punctual": { "light": 0 } });
        document["nodes"].as_array_mut().unwrap().push(json!({ "camera": 1 }));
        document["scenes"][0]["nodes"] = json!([0, 1]);
        document["cameras"] = json!([
            { "type": "perspective", "perspective": { "yfov": 0.8, "znear": 0.1 } },
            { "type": "orthographic", "orthographic": { "xmag": 1.0, "ymag": 2.0, "znear": 0.1, "zfar": 10.0 } }
        ]);
        document["extensionsUsed"] = json!(["KHR_lights_punctual"]);
        document["extensions"] = json!({
            "KHR_lights_punctual": {
                "lights": [{
                    "type": "spot",
                    "color": [1.0, 0.5, 0.0],
                    "intensity": 3.0,
                    "spot": { "innerConeAngle": 0.0, "outerConeAngle": std::f32::consts::FRAC_PI_4 }
                }]
            }
        });
    });

    let result = import(fs, "scene.gltf");
    let graph = &result.graph;

    let node = graph.find_by_name("Triangle").unwrap();
    assert!(matches!(graph.leaf(node), Some(SceneLeaf::MeshInstance(_))));

    let children = graph.node(node).children();
    assert_eq!(children.len(), 2);
    let Some(SceneLeaf::Camera(camera)) = graph.leaf(children[0]) else {
        panic!("expected a camera leaf");
    };
    assert_eq!(camera.name, "Camera1");
    assert!(matches!(
        &camera.projection,
        CameraProjection::Perspective(perspective) if perspective.z_far.is_none() && perspective.vertical_fov == 0.8
    ));
    let Some(SceneLeaf::Light(light)) = graph.leaf(children[1]) else {
        panic!("expected a light leaf");
    };
    assert_eq!(light.color, Vec3::new(1.0, 0.5, 0.0));
    match light.kind {
        LightKind::Spot { intensity, outer_angle, .. } => {
            assert_eq!(intensity, 3.0);
            assert!((outer_angle - 45.0).abs() < 1e-3);
        }
        ref other => panic!("expected a spot light, got {:?}", other),
    }

    // The second camera sits directly on its own node
    let second = graph.node(graph.root()).children()[1];
    let Some(SceneLeaf::Camera(second_camera)) = graph.leaf(second) else {
        panic!("expected a camera leaf");
    };
    assert_eq!(second_camera.name, "Camera2");

    assert_eq!(result.cameras.len(), 2);
    assert!(Arc::ptr_eq(&result.cameras[0], camera));
    assert_eq!(result.lights.len(), 1);
}

#[test]
fn meshes_share_one_buffer_group() {
    let fs = Arc::new(MemoryFileSystem::new());
    let mut builder = AssetBuilder::default();
    let first_positions = builder.floats(&TRIANGLE, "VEC3");
    let u8_indices = builder.u8s(&[2, 1, 0]);
    let quad_positions = builder.floats(
        &[0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0],
        "VEC3",
    );
    let line_positions = builder.floats(&[0.0, 0.0, 0.0, 0.0, 0.0, 5.0], "VEC3");

    let document = json!({
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [{ "mesh": 0 }, { "mesh": 1 }],
        "meshes": [
            { "primitives": [{ "attributes": { "POSITION": first_positions }, "indices": u8_indices, "material": 0 }] },
            { "primitives": [
                { "attributes": { "POSITION": quad_positions }, "material": 0 },
                { "attributes": { "POSITION": line_positions }, "mode": 1 },
                { "attributes": { "POSITION": line_positions }, "mode": 0 }
            ] }
        ],
        "materials": [{ "pbrMetallicRoughness": {} }]
    });
    builder.store(&fs, "scene.gltf", document);

    let result = import(fs, "scene.gltf");
    assert_offsets_are_consistent(&result);
    assert_eq!(result.buffers.position_data.len(), 3 + 4 + 2);
    assert_eq!(result.buffers.index_data.len(), 3 + 4 + 2);

    let first = &result.meshes[0];
    assert_eq!(first.indices(), &[2, 1, 0]);

    // Points are skipped, lines turn the mesh into curves
    let second = &result.meshes[1];
    assert_eq!(second.index_offset, 3);
    assert_eq!(second.vertex_offset, 3);
    assert_eq!(second.geometries.len(), 2);
    assert_eq!(second.mesh_type, MeshType::CurvePolytubes);
    assert_eq!(second.indices(), &[0, 1, 2, 3, 0, 1]);
    assert_eq!(second.geometries[1].index_offset_in_mesh, 4);
    assert_eq!(second.geometries[1].vertex_offset_in_mesh, 4);
    assert_eq!(second.geometries[1].primitive_type, PrimitiveType::Lines);
    assert!(second.object_space_bounds.contains(Vec3::new(0.0, 0.0, 5.0)));

    let missing = second.geometries[1].material.as_ref().unwrap();
    assert_eq!(missing.name, "(empty)");
    assert_eq!(missing.material_index_in_model, -1);
}

#[test]
fn tangents_are_generated_from_uvs() {
    let fs = Arc::new(MemoryFileSystem::new());
    let mut builder = AssetBuilder::default();
    let positions = builder.floats(&TRIANGLE, "VEC3");
    let normals = builder.floats(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0], "VEC3");
    let uvs = builder.floats(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0], "VEC2");

    builder.store(
        &fs,
        "scene.gltf",
        json!({
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions, "NORMAL": normals, "TEXCOORD_0": uvs } }] }]
        }),
    );

    let result = import(fs, "scene.gltf");
    for (&packed, &uv) in result
        .buffers
        .tangent_data
        .iter()
        .zip(&result.buffers.texcoord1_data)
    {
        let tangent = gltf_scene_import::scene::snorm8_to_vector(packed);
        assert!((tangent[0] - 1.0).abs() < 0.01);
        assert!(tangent[3] == 1.0 || tangent[3] == -1.0);
        assert!(uv.x >= 0.0 && uv.y >= 0.0);
    }
}

#[test]
fn rebuilt_tangents_are_written_next_to_the_asset() {
    let fs = Arc::new(MemoryFileSystem::new());
    let mut builder = AssetBuilder::default();
    let positions = builder.floats(&TRIANGLE, "VEC3");
    let normals = builder.floats(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0], "VEC3");
    let tangents = builder.floats(&[0.0; 12], "VEC4");
    let uvs = builder.floats(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0], "VEC2");

    builder.store(
        &fs,
        "models/scene.gltf",
        json!({
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "primitives": [{ "attributes": {
                "POSITION": positions, "NORMAL": normals, "TANGENT": tangents, "TEXCOORD_0": uvs
            } }] }]
        }),
    );

    let options = ImportOptions {
        force_rebuild_tangents: true,
        ..Default::default()
    };
    let (result, _) = import_with(fs.clone(), "models/scene.gltf", &options);
    result.unwrap();

    let original = fs.get("models/scene.bin").unwrap();
    let rebuilt = fs.get("models/scene.buffer0.bin").unwrap();
    assert_eq!(original.len(), rebuilt.len());
    assert_ne!(original.as_slice(), rebuilt.as_slice());
}

#[test]
fn mismatched_attribute_counts_fail() {
    let fs = Arc::new(MemoryFileSystem::new());
    let mut builder = AssetBuilder::default();
    let positions = builder.floats(&TRIANGLE, "VEC3");
    let normals = builder.floats(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0], "VEC3");

    builder.store(
        &fs,
        "scene.gltf",
        json!({
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "name": "Broken", "primitives": [{ "attributes": { "POSITION": positions, "NORMAL": normals } }] }]
        }),
    );

    let (result, _) = import_with(fs, "scene.gltf", &ImportOptions::default());
    assert!(matches!(
        result,
        Err(ImportError::AttributeCountMismatch { expected: 3, found: 2, .. })
    ));
}

#[test]
fn missing_files_fail() {
    let fs = Arc::new(MemoryFileSystem::new());
    let (result, _) = import_with(fs.clone(), "nothing.gltf", &ImportOptions::default());
    assert!(matches!(result, Err(ImportError::Io { .. })));

    fs.insert("broken.gltf", b"{ not json".to_vec());
    let (result, _) = import_with(fs, "broken.gltf", &ImportOptions::default());
    assert!(result.is_err());
}

#[test]
fn materials_map_workflows_and_domains() {
    let fs = Arc::new(MemoryFileSystem::new());
    let document = json!({
        "materials": [
            {
                "name": "Glass",
                "alphaMode": "BLEND",
                "pbrMetallicRoughness": { "baseColorFactor": [1.0, 1.0, 1.0, 0.5] },
                "extensions": { "KHR_materials_transmission": { "transmissionFactor": 0.75 } }
            },
            { "name": "Blend", "alphaMode": "BLEND", "pbrMetallicRoughness": {} },
            {
                "name": "SpecGloss",
                "alphaMode": "MASK",
                "alphaCutoff": 0.25,
                "doubleSided": true,
                "emissiveFactor": [0.0, 2.0, 4.0],
                "extensions": {
                    "KHR_materials_pbrSpecularGlossiness": {
                        "diffuseFactor": [0.5, 0.5, 0.5, 0.25],
                        "specularFactor": [0.1, 0.2, 0.3],
                        "glossinessFactor": 0.75
                    },
                    "KHR_materials_emissive_strength": { "emissiveStrength": 2.0 }
                }
            },
            {
                "name": "Skin",
                "extensions": {
                    "NV_materials_subsurface": { "transmissionColor": [1.0, 0.5, 0.25], "scale": 3.0 },
                    "NV_materials_hair": { "melanin": 0.8 }
                }
            }
        ]
    });
    AssetBuilder::default().store(&fs, "materials.gltf", document);

    let result = import(fs, "materials.gltf");
    let [glass, blend, spec_gloss, skin] = &result.materials[..] else {
        panic!("expected four materials");
    };

    assert_eq!(glass.domain, MaterialDomain::TransmissiveAlphaBlended);
    assert_eq!(glass.transmission_factor, 0.75);
    assert_eq!(glass.opacity, 0.5);
    assert_eq!(blend.domain, MaterialDomain::AlphaBlended);

    assert!(spec_gloss.use_specular_gloss_model);
    assert_eq!(spec_gloss.domain, MaterialDomain::AlphaTested);
    assert_eq!(spec_gloss.alpha_cutoff, 0.25);
    assert!(spec_gloss.double_sided);
    assert!((spec_gloss.roughness - 0.25).abs() < 1e-6);
    assert_eq!(spec_gloss.opacity, 0.25);
    assert_eq!(spec_gloss.base_or_diffuse_color, Vec3::broadcast(0.5));
    assert_eq!(spec_gloss.emissive_color, Vec3::new(0.0, 0.5, 1.0));
    assert_eq!(spec_gloss.emissive_intensity, 8.0);

    // No pbrMetallicRoughness block, so the defaults stay
    assert_eq!(skin.base_or_diffuse_color, Vec3::one());
    assert_eq!(skin.emissive_intensity, 1.0);
    assert!(skin.enable_subsurface_scattering);
    assert_eq!(skin.subsurface.transmission_color, Vec3::new(1.0, 0.5, 0.25));
    assert_eq!(skin.subsurface.scattering_color, Vec3::zero());
    assert_eq!(skin.subsurface.scale, 3.0);
    assert!(skin.enable_hair);
    assert_eq!(skin.hair.melanin, 0.8);
    assert_eq!(skin.hair.ior, 0.0);
}

#[test]
fn swizzle_options_merge_on_a_shared_image() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert("textures/albedo.png", png_bytes());
    let document = json!({
        "images": [{ "uri": "textures/albedo.png" }, { "uri": "textures/mask%20map.png" }],
        "textures": [
            {
                "source": 0,
                "extensions": { "NV_texture_swizzle": { "options": [{ "source": 1, "channels": [0] }] } }
            },
            {
                "source": 0,
                "extensions": { "NV_texture_swizzle": { "options": [{ "source": 1, "channels": [-1, 2] }] } }
            }
        ],
        "materials": [
            { "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } },
            { "pbrMetallicRoughness": { "baseColorTexture": { "index": 1 } } }
        ]
    });
    AssetBuilder::default().store(&fs, "scene.gltf", document);

    let (result, textures) = import_with(fs, "scene.gltf", &ImportOptions::default());
    let result = result.unwrap();

    let first = result.materials[0].base_or_diffuse_texture.as_ref().unwrap();
    let second = result.materials[1].base_or_diffuse_texture.as_ref().unwrap();
    assert!(Arc::ptr_eq(first, second));
    assert_eq!(textures.len(), 1);

    let options = first.swizzle_options();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].num_channels, 2);
    assert_eq!(options[0].channels, [0, 2, -1, -1]);
    assert_eq!(
        options[0].source,
        TextureReference::Path("textures/mask map.png".into())
    );

    assert_eq!(textures.process_deferred(), 1);
    assert!(first.is_loaded());
}

#[test]
fn dds_files_replace_referenced_images() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert("textures/albedo.png", png_bytes());
    fs.insert("textures/albedo.dds", b"DDS \x7c\x00\x00\x00".to_vec());
    let document = json!({
        "images": [{ "uri": "textures/albedo.png" }],
        "textures": [{ "source": 0 }],
        "materials": [{ "normalTexture": { "index": 0, "scale": 0.5, "extensions": {
            "KHR_texture_transform": { "scale": [4.0, 2.0] }
        } } }]
    });
    AssetBuilder::default().store(&fs, "scene.gltf", document);

    let result = import(fs.clone(), "scene.gltf");
    let material = &result.materials[0];
    let normal = material.normal_texture.as_ref().unwrap();
    assert_eq!(Path::new(&normal.path), Path::new("textures/albedo.dds"));
    assert_eq!(material.normal_texture_scale, 0.5);
    assert_eq!(material.normal_texture_transform_scale, ultraviolet::Vec2::new(4.0, 2.0));

    let options = ImportOptions {
        search_for_dds: false,
        ..Default::default()
    };
    let (result, _) = import_with(fs, "scene.gltf", &options);
    let normal = result.unwrap().materials[0].normal_texture.clone().unwrap();
    assert_eq!(Path::new(&normal.path), Path::new("textures/albedo.png"));
}

#[test]
fn base64_images_load_from_memory() {
    let fs = Arc::new(MemoryFileSystem::new());
    let uri = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png_bytes())
    );
    let document = json!({
        "images": [{ "uri": uri }],
        "textures": [{ "source": 0 }],
        "materials": [{ "emissiveTexture": { "index": 0 } }]
    });
    AssetBuilder::default().store(&fs, "models/inline.gltf", document);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let importer = GltfImporter::new(fs.clone(), Arc::new(DefaultSceneTypeFactory));
    let textures = DeferredTextureCache::new(fs);
    let stats = SceneLoadingStats::default();
    let result = importer
        .load(
            "models/inline.gltf",
            &textures,
            &ImportOptions::default(),
            &stats,
            Some(runtime.handle()),
        )
        .unwrap();

    let texture = result.materials[0].emissive_texture.clone().unwrap();
    assert_eq!(texture.path, "inline.gltf[0]");
    assert_eq!(texture.mime_type, "image/png");

    assert_eq!(runtime.block_on(textures.wait_for_async_loads()), 1);
    let data = texture.data().unwrap();
    assert_eq!(data.container, ImageContainer::Png);
    assert!(data.srgb);
    assert_eq!(data.data.as_slice(), png_bytes().as_slice());
}

#[test]
fn skins_and_animations() {
    let fs = Arc::new(MemoryFileSystem::new());
    let mut builder = AssetBuilder::default();
    let positions = builder.floats(&TRIANGLE, "VEC3");
    let joints = builder.u16s(&[0, 1, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0], "VEC4", 3);
    let weights = builder.floats(
        &[0.5, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        "VEC4",
    );
    let mut matrices = Vec::new();
    for translation in [0.0, -1.0] {
        matrices.extend_from_slice(&[
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, translation, 0.0,
            1.0,
        ]);
    }
    let inverse_bind_matrices = builder.floats(&matrices, "MAT4");
    let times = builder.floats(&[0.0, 1.0], "SCALAR");
    let rotations = builder.floats(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0], "VEC4");
    let translations = builder.floats(&[0.0, 0.0, 0.0, 0.0, 2.0, 0.0], "VEC3");
    let weight_values = builder.floats(&[0.0, 1.0], "SCALAR");

    builder.store(
        &fs,
        "rig.gltf",
        json!({
            "scene": 0,
            "scenes": [{ "nodes": [0, 1] }],
            "nodes": [
                { "name": "Body", "mesh": 0, "skin": 0 },
                { "name": "Hip", "children": [2], "translation": [0.0, 1.0, 0.0] },
                { "name": "Knee" }
            ],
            "meshes": [{ "primitives": [{ "attributes": {
                "POSITION": positions, "JOINTS_0": joints, "WEIGHTS_0": weights
            } }] }],
            "skins": [{ "joints": [1, 2], "inverseBindMatrices": inverse_bind_matrices }],
            "animations": [
                {
                    "name": "Walk",
                    "samplers": [
                        { "input": times, "output": rotations },
                        { "input": times, "output": translations, "interpolation": "STEP" }
                    ],
                    "channels": [
                        { "sampler": 0, "target": { "node": 2, "path": "rotation" } },
                        { "sampler": 1, "target": { "node": 1, "path": "translation" } }
                    ]
                },
                {
                    "name": "Morph",
                    "samplers": [{ "input": times, "output": weight_values }],
                    "channels": [{ "sampler": 0, "target": { "node": 0, "path": "weights" } }]
                }
            ]
        }),
    );

    let result = import(fs, "rig.gltf");
    let graph = &result.graph;
    let body = graph.find_by_name("Body").unwrap();
    let hip = graph.find_by_name("Hip").unwrap();
    let knee = graph.find_by_name("Knee").unwrap();

    assert!(result.meshes[0].is_skin_prototype);
    assert_eq!(result.buffers.joint_data[0], [0, 1, 0, 0]);
    assert_eq!(result.buffers.weight_data[0].x, 0.5);

    let Some(SceneLeaf::SkinnedMeshInstance(skinned)) = graph.leaf(body) else {
        panic!("expected a skinned mesh instance");
    };
    assert_eq!(skinned.joints.len(), 2);
    assert_eq!(skinned.joints[0].node, hip);
    assert_eq!(skinned.joints[1].node, knee);
    assert_eq!(skinned.joints[1].inverse_bind_matrix.cols[3].y, -1.0);
    assert!(matches!(
        graph.leaf(hip),
        Some(SceneLeaf::SkinnedMeshReference { instance }) if *instance == body
    ));
    assert_eq!(graph.node(hip).transform.position, Vec3::new(0.0, 1.0, 0.0));

    // The morph weight animation has no usable channel
    assert_eq!(result.animations.len(), 1);
    let container = graph.find_by_name("Animations").unwrap();
    assert_eq!(graph.node(container).children().len(), 1);
    let walk_node = graph.node(container).children()[0];
    assert_eq!(graph.node(walk_node).name, "Walk");

    let walk = &result.animations[0];
    assert_eq!(walk.duration(), 1.0);
    let channels = walk.channels();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].attribute, AnimationAttribute::Rotation);
    assert_eq!(channels[0].sampler.mode(), InterpolationMode::Slerp);
    assert_eq!(channels[0].target, knee);
    assert_eq!(channels[1].attribute, AnimationAttribute::Translation);
    assert_eq!(channels[1].sampler.mode(), InterpolationMode::Step);

    let mut animated = result.graph.clone();
    walk.apply(&mut animated, 1.0);
    assert_eq!(animated.node(hip).transform.position, Vec3::new(0.0, 2.0, 0.0));
}

fn glb(json: &Value, bin: &[u8]) -> Vec<u8> {
    let mut json_chunk = serde_json::to_vec(json).unwrap();
    while json_chunk.len() % 4 != 0 {
        json_chunk.push(b' ');
    }
    let mut bin_chunk = bin.to_vec();
    while bin_chunk.len() % 4 != 0 {
        bin_chunk.push(0);
    }

    let length = 12 + 8 + json_chunk.len() + 8 + bin_chunk.len();
    let mut data = Vec::with_capacity(length);
    data.extend_from_slice(b"glTF");
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&(length as u32).to_le_bytes());
    data.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    data.extend_from_slice(b"JSON");
    data.extend_from_slice(&json_chunk);
    data.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
    data.extend_from_slice(b"BIN\0");
    data.extend_from_slice(&bin_chunk);
    data
}

#[test]
fn binary_gltf_with_embedded_image() {
    let mut builder = AssetBuilder::default();
    let positions = builder.floats(&TRIANGLE, "VEC3");
    let image_view = builder.push_view(&png_bytes());

    let document = json!({
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": builder.data.len() }],
        "bufferViews": builder.views,
        "accessors": builder.accessors,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions }, "material": 0 }] }],
        "images": [{ "name": "Albedo", "bufferView": image_view, "mimeType": "image/png" }],
        "textures": [{ "source": 0 }],
        "materials": [{
            "pbrMetallicRoughness": {
                "baseColorTexture": { "index": 0 },
                "metallicRoughnessTexture": { "index": 0 }
            }
        }]
    });

    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert("scene.glb", glb(&document, &builder.data));

    let (result, textures) = import_with(fs, "scene.glb", &ImportOptions::default());
    let result = result.unwrap();
    assert_eq!(result.meshes[0].total_vertices, 3);
    assert_eq!(result.graph.node(result.graph.root()).name, "scene.glb");

    let material = &result.materials[0];
    let base = material.base_or_diffuse_texture.as_ref().unwrap();
    let metal_rough = material.metal_rough_or_specular_texture.as_ref().unwrap();
    // Both slots use the same texture object, so the first load wins
    assert!(Arc::ptr_eq(base, metal_rough));
    assert_eq!(base.path, "Albedo");

    assert_eq!(textures.process_deferred(), 1);
    assert_eq!(base.data().unwrap().data.as_slice(), png_bytes().as_slice());
}

#[test]
fn required_vendor_extensions_do_not_block_the_import() {
    let fs = Arc::new(MemoryFileSystem::new());
    triangle_asset(&fs, "vendor.gltf", |document| {
        let extensions = json!(["MSFT_texture_dds", "NV_texture_swizzle", "KHR_texture_transform"]);
        document["extensionsUsed"] = extensions.clone();
        document["extensionsRequired"] = extensions;
    });
    let result = import(fs.clone(), "vendor.gltf");
    assert_eq!(result.meshes.len(), 1);

    triangle_asset(&fs, "unknown.gltf", |document| {
        document["extensionsUsed"] = json!(["EXT_not_a_real_extension"]);
        document["extensionsRequired"] = json!(["EXT_not_a_real_extension"]);
    });
    let (result, _) = import_with(fs, "unknown.gltf", &ImportOptions::default());
    assert!(matches!(result, Err(ImportError::Gltf(_))));
}

#[test]
fn skinned_nodes_keep_their_camera_and_light() {
    let fs = Arc::new(MemoryFileSystem::new());
    let mut builder = AssetBuilder::default();
    let positions = builder.floats(&TRIANGLE, "VEC3");
    let joints = builder.u16s(&[0, 1, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0], "VEC4", 3);
    let weights = builder.floats(
        &[0.5, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        "VEC4",
    );
    // One matrix for two joints
    let inverse_bind_matrices = builder.floats(
        &[
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, -1.0, 0.0, 1.0,
        ],
        "MAT4",
    );

    builder.store(
        &fs,
        "rig.gltf",
        json!({
            "extensionsUsed": ["KHR_lights_punctual"],
            "extensions": { "KHR_lights_punctual": { "lights": [{ "type": "point", "intensity": 2.0 }] } },
            "scenes": [{ "nodes": [0, 1, 2] }],
            "nodes": [
                { "name": "Body", "mesh": 0, "skin": 0, "camera": 0,
                  "extensions": { "KHR_lights_punctual": { "light": 0 } } },
                { "name": "Hip", "children": [3] },
                { "name": "Prop", "mesh": 1, "skin": 0, "camera": 0 },
                { "name": "Knee" }
            ],
            "meshes": [
                { "primitives": [{ "attributes": {
                    "POSITION": positions, "JOINTS_0": joints, "WEIGHTS_0": weights
                } }] },
                { "primitives": [{ "attributes": { "POSITION": positions } }] }
            ],
            "skins": [{ "joints": [1, 3], "inverseBindMatrices": inverse_bind_matrices }],
            "cameras": [{ "type": "perspective", "perspective": { "yfov": 1.0, "znear": 0.1 } }]
        }),
    );

    let result = import(fs, "rig.gltf");
    let graph = &result.graph;
    let body = graph.find_by_name("Body").unwrap();
    let prop = graph.find_by_name("Prop").unwrap();

    let Some(SceneLeaf::SkinnedMeshInstance(skinned)) = graph.leaf(body) else {
        panic!("expected a skinned mesh instance");
    };
    assert_eq!(skinned.joints[0].inverse_bind_matrix.cols[3].y, -1.0);
    assert_eq!(skinned.joints[1].inverse_bind_matrix, Mat4::identity());

    let body_children = graph.node(body).children();
    assert_eq!(body_children.len(), 2);
    assert!(matches!(
        graph.leaf(body_children[0]),
        Some(SceneLeaf::Camera(camera)) if camera.name == "Camera1"
    ));
    assert!(matches!(graph.leaf(body_children[1]), Some(SceneLeaf::Light(_))));

    // The mesh has no joints, so the skin falls back to a plain instance
    assert!(matches!(graph.leaf(prop), Some(SceneLeaf::MeshInstance(_))));
    let prop_children = graph.node(prop).children();
    assert_eq!(prop_children.len(), 1);
    assert!(matches!(graph.leaf(prop_children[0]), Some(SceneLeaf::Camera(_))));
}

#[test]
fn morph_targets_use_asset_sized_frames() {
    let fs = Arc::new(MemoryFileSystem::new());
    let mut builder = AssetBuilder::default();
    let still = builder.floats(&TRIANGLE, "VEC3");
    let morphing = builder.floats(&TRIANGLE, "VEC3");
    let deltas = builder.floats(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0], "VEC3");

    builder.store(
        &fs,
        "morph.gltf",
        json!({
            "scenes": [{ "nodes": [0, 1] }],
            "nodes": [{ "mesh": 0 }, { "mesh": 1 }],
            "meshes": [
                { "primitives": [{ "attributes": { "POSITION": still } }] },
                { "primitives": [{ "attributes": { "POSITION": morphing }, "targets": [{ "POSITION": deltas }] }] }
            ]
        }),
    );

    let result = import(fs, "morph.gltf");
    let buffers = &result.buffers;

    assert_eq!(
        buffers.morph_target_buffer_range,
        vec![BufferRange {
            byte_offset: 0,
            byte_size: 6 * 16,
        }]
    );
    assert_eq!(buffers.morph_target_data.len(), 6);
    assert!(buffers.morph_target_data[..3].iter().all(|delta| *delta == Vec4::zero()));
    assert!(buffers.morph_target_data[3..]
        .iter()
        .all(|delta| *delta == Vec4::new(0.0, 0.0, 1.0, 0.0)));

    assert!(!result.meshes[0].is_morph_target_animation_mesh);
    assert_eq!(result.meshes[0].object_space_bounds.max.z, 0.0);
    assert!(result.meshes[1].is_morph_target_animation_mesh);
    assert_eq!(result.meshes[1].object_space_bounds.max.z, 1.0);
}

fn curve_asset(fs: &MemoryFileSystem, path: &str, radius_on_every_primitive: bool) {
    let mut builder = AssetBuilder::default();
    let positions = builder.floats(&[0.0, 0.0, 0.0, 0.0, 0.0, 5.0], "VEC3");
    let radius = builder.floats(&[0.5, 2.0], "SCALAR");

    let mut second = json!({ "attributes": { "POSITION": positions }, "mode": 3 });
    if radius_on_every_primitive {
        second["attributes"]["_RADIUS"] = json!(radius);
    }
    builder.store(
        fs,
        path,
        json!({
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "primitives": [
                { "attributes": { "POSITION": positions, "_RADIUS": radius }, "mode": 1 },
                second
            ] }]
        }),
    );
}

#[test]
fn curve_radius_grows_the_bounds() {
    let fs = Arc::new(MemoryFileSystem::new());
    curve_asset(&fs, "curves.gltf", true);

    let result = import(fs, "curves.gltf");
    let mesh = &result.meshes[0];
    assert_eq!(mesh.mesh_type, MeshType::CurvePolytubes);
    assert_eq!(mesh.geometries[1].primitive_type, PrimitiveType::LineStrip);
    assert_eq!(result.buffers.radius_data, vec![0.5, 2.0, 0.5, 2.0]);

    let bounds = mesh.geometries[0].object_space_bounds;
    assert_eq!(bounds.max.z, 7.0);
    assert_eq!(bounds.min.x, -2.0);
    assert_eq!(bounds.min.z, -0.5);
}

#[test]
fn curve_radius_is_dropped_when_a_primitive_lacks_it() {
    let fs = Arc::new(MemoryFileSystem::new());
    curve_asset(&fs, "curves.gltf", false);

    let result = import(fs, "curves.gltf");
    assert!(result.buffers.radius_data.is_empty());
    assert_eq!(result.meshes[0].geometries[1].object_space_bounds.max.z, 5.0);
}

#[test]
fn cubic_spline_keyframes_read_three_values() {
    let fs = Arc::new(MemoryFileSystem::new());
    let mut builder = AssetBuilder::default();
    let times = builder.floats(&[0.0, 1.0], "SCALAR");
    let values = builder.floats(
        &[
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, // in, value, out
            0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ],
        "VEC3",
    );
    builder.store(
        &fs,
        "spline.gltf",
        json!({
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": "Mover" }],
            "animations": [{
                "name": "Glide",
                "samplers": [{ "input": times, "output": values, "interpolation": "CUBICSPLINE" }],
                "channels": [{ "sampler": 0, "target": { "node": 0, "path": "translation" } }]
            }]
        }),
    );

    let result = import(fs, "spline.gltf");
    assert_eq!(result.animations.len(), 1);
    let glide = &result.animations[0];
    let sampler = &glide.channels()[0].sampler;
    assert_eq!(sampler.mode(), InterpolationMode::HermiteSpline);

    let keyframes = sampler.keyframes();
    assert_eq!(keyframes.len(), 2);
    assert_eq!(keyframes[0].value, Vec4::new(1.0, 0.0, 0.0, 0.0));
    assert_eq!(keyframes[0].out_tangent, Vec4::new(0.0, 1.0, 0.0, 0.0));
    assert_eq!(keyframes[1].in_tangent, Vec4::new(0.0, 0.0, 1.0, 0.0));
    assert_eq!(keyframes[1].value, Vec4::new(2.0, 0.0, 0.0, 0.0));

    // A single animation hangs directly off the root
    let graph = &result.graph;
    assert!(graph.find_by_name("Animations").is_none());
    let node = graph.find_by_name("Glide").unwrap();
    assert_eq!(graph.node(node).parent(), Some(graph.root()));
}

#[test]
fn deep_node_chains_are_walked() {
    const DEPTH: usize = 5000;
    let nodes: Vec<Value> = (0..DEPTH)
        .map(|i| {
            let mut node = json!({ "name": format!("Node{}", i), "translation": [1.0, 0.0, 0.0] });
            if i + 1 < DEPTH {
                node["children"] = json!([i + 1]);
            }
            node
        })
        .collect();

    let fs = Arc::new(MemoryFileSystem::new());
    AssetBuilder::default().store(
        &fs,
        "chain.gltf",
        json!({ "scenes": [{ "nodes": [0] }], "nodes": nodes }),
    );

    let result = import(fs, "chain.gltf");
    let graph = &result.graph;
    assert_eq!(graph.len(), DEPTH + 1);

    let deepest = graph.find_by_name(&format!("Node{}", DEPTH - 1)).unwrap();
    assert!(graph.node(deepest).children().is_empty());
    assert_eq!(graph.world_matrix(deepest).cols[3].x, DEPTH as f32);
}

#[test]
fn unusable_channels_are_skipped() {
    let fs = Arc::new(MemoryFileSystem::new());
    let mut builder = AssetBuilder::default();
    let integer_times = builder.u16s(&[0, 1], "SCALAR", 2);
    let times = builder.floats(&[0.0, 1.0], "SCALAR");
    let translations = builder.floats(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0], "VEC3");

    builder.store(
        &fs,
        "broken.gltf",
        json!({
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": "Visible" }, { "name": "Offstage" }],
            "animations": [
                {
                    "name": "IntegerTimes",
                    "samplers": [{ "input": integer_times, "output": translations }],
                    "channels": [{ "sampler": 0, "target": { "node": 0, "path": "translation" } }]
                },
                {
                    "name": "OutsideTheScene",
                    "samplers": [{ "input": times, "output": translations }],
                    "channels": [{ "sampler": 0, "target": { "node": 1, "path": "translation" } }]
                }
            ]
        }),
    );

    let result = import(fs, "broken.gltf");
    assert!(result.animations.is_empty());

    let graph = &result.graph;
    assert!(graph.find_by_name("Offstage").is_none());
    let container = graph.find_by_name("Animations").unwrap();
    assert!(graph.node(container).children().is_empty());
}

#[test]
fn image_views_outside_the_buffer_are_ignored() {
    let fs = Arc::new(MemoryFileSystem::new());
    let mut builder = AssetBuilder::default();
    let view = builder.push_view(&png_bytes());
    builder.views[view]["byteOffset"] = json!(u64::MAX - 2);

    builder.store(
        &fs,
        "scene.gltf",
        json!({
            "images": [{ "bufferView": view, "mimeType": "image/png" }],
            "textures": [{ "source": 0 }],
            "materials": [{ "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } }]
        }),
    );

    let (result, textures) = import_with(fs, "scene.gltf", &ImportOptions::default());
    let result = result.unwrap();
    assert!(result.materials[0].base_or_diffuse_texture.is_none());
    assert!(textures.is_empty());
}
