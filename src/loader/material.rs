use std::sync::Arc;

use serde_json::Value;
use ultraviolet::{Vec2, Vec3};

use crate::{
    config_loader::ImportOptions,
    scene::{Material, MaterialDomain, SceneTypeFactory},
};

use super::{
    extensions::{parse_material_extensions, parse_texture_transform},
    texture::TextureResolver,
};

const SPECULAR_GLOSSINESS: &str = "KHR_materials_pbrSpecularGlossiness";

fn has_transform(texture_info: &Value) -> bool {
    parse_texture_transform(texture_info).is_some()
}

fn warn_unsupported_transforms(name: &str, raw: &Value) {
    let slots = [
        &raw["pbrMetallicRoughness"]["baseColorTexture"],
        &raw["pbrMetallicRoughness"]["metallicRoughnessTexture"],
        &raw["extensions"][SPECULAR_GLOSSINESS]["diffuseTexture"],
        &raw["extensions"][SPECULAR_GLOSSINESS]["specularGlossinessTexture"],
        &raw["occlusionTexture"],
        &raw["emissiveTexture"],
    ];
    if slots.into_iter().any(has_transform) {
        log::warn!(
            "Material '{}' uses texture transforms, which are only supported for the normal texture scale",
            name
        );
    }
}

fn load_material(
    textures: &mut TextureResolver<'_>,
    factory: &dyn SceneTypeFactory,
    model_file_name: &str,
    options: &ImportOptions,
    gltf_material: &gltf::Material<'_>,
    index: usize,
) -> Material {
    let json = textures.json;
    let raw = &json["materials"][index];

    let mut material = factory.create_material();
    material.name = gltf_material.name().unwrap_or_default().to_string();
    material.model_file_name = model_file_name.to_string();
    material.material_index_in_model = index as i32;

    let specular_glossiness = gltf_material.pbr_specular_glossiness();
    if let Some(pbr) = &specular_glossiness {
        material.use_specular_gloss_model = true;
        material.base_or_diffuse_texture = pbr
            .diffuse_texture()
            .and_then(|info| textures.resolve_texture(&info.texture(), true));
        material.metal_rough_or_specular_texture = pbr
            .specular_glossiness_texture()
            .and_then(|info| textures.resolve_texture(&info.texture(), true));

        let [r, g, b, a] = pbr.diffuse_factor();
        material.base_or_diffuse_color = Vec3::new(r, g, b);
        material.specular_color = Vec3::from(pbr.specular_factor());
        material.roughness = 1.0 - pbr.glossiness_factor();
        material.opacity = a;
    } else if raw.get("pbrMetallicRoughness").is_some() {
        let pbr = gltf_material.pbr_metallic_roughness();
        material.base_or_diffuse_texture = pbr
            .base_color_texture()
            .and_then(|info| textures.resolve_texture(&info.texture(), true));
        material.metal_rough_or_specular_texture = pbr
            .metallic_roughness_texture()
            .and_then(|info| textures.resolve_texture(&info.texture(), false));

        let [r, g, b, a] = pbr.base_color_factor();
        material.base_or_diffuse_color = Vec3::new(r, g, b);
        material.metalness = pbr.metallic_factor();
        material.roughness = pbr.roughness_factor();
        material.opacity = a;
    }

    let transmission = gltf_material.transmission();
    if let Some(transmission) = &transmission {
        if specular_glossiness.is_some() {
            log::warn!(
                "Material '{}' uses the specular-glossiness model together with transmission, which is not supported",
                material.name
            );
        }
        material.transmission_texture = transmission
            .transmission_texture()
            .and_then(|info| textures.resolve_texture(&info.texture(), false));
        material.transmission_factor = transmission.transmission_factor();
    }

    material.emissive_texture = gltf_material
        .emissive_texture()
        .and_then(|info| textures.resolve_texture(&info.texture(), true));
    let emissive = Vec3::from(gltf_material.emissive_factor());
    let intensity = emissive.component_max();
    if intensity > 0.0 {
        material.emissive_color = emissive / intensity;
        material.emissive_intensity = intensity;
    } else {
        material.emissive_color = emissive;
        material.emissive_intensity = 1.0;
    }
    if let Some(strength) = gltf_material.emissive_strength() {
        material.emissive_intensity *= strength;
    }

    if let Some(normal) = gltf_material.normal_texture() {
        material.normal_texture = textures.resolve_texture(&normal.texture(), false);
        material.normal_texture_scale = normal.scale();
    }
    if let Some(occlusion) = gltf_material.occlusion_texture() {
        material.occlusion_texture = textures.resolve_texture(&occlusion.texture(), false);
        material.occlusion_strength = occlusion.strength();
    }

    material.alpha_cutoff = gltf_material.alpha_cutoff().unwrap_or(0.5);
    material.double_sided = gltf_material.double_sided();

    material.normal_texture_transform_scale = match parse_texture_transform(&raw["normalTexture"]) {
        Some(transform) => {
            if !transform.is_scale_only() {
                log::warn!(
                    "Material '{}' rotates or offsets its normal texture, only the scale is supported",
                    material.name
                );
            }
            Vec2::from(transform.scale)
        }
        None => Vec2::one(),
    };
    warn_unsupported_transforms(&material.name, raw);

    material.domain = MaterialDomain::from_alpha_mode(gltf_material.alpha_mode(), transmission.is_some());

    let extensions = parse_material_extensions(
        raw.get("extensions"),
        options.material_extension_size_limit,
    );
    if let Some(subsurface) = extensions.subsurface {
        material.enable_subsurface_scattering = true;
        material.subsurface.transmission_color = Vec3::from(subsurface.transmission_color);
        material.subsurface.scattering_color = Vec3::from(subsurface.scattering_color);
        material.subsurface.scale = subsurface.scale;
        material.subsurface.anisotropy = subsurface.anisotropy;
        material.subsurface_transmission_texture = subsurface
            .transmission_color_texture
            .and_then(|info| textures.resolve_texture_index(info.index, true));
    }
    if let Some(hair) = extensions.hair {
        material.enable_hair = true;
        material.hair.base_color = Vec3::from(hair.base_color);
        material.hair.melanin = hair.melanin;
        material.hair.melanin_redness = hair.melanin_redness;
        material.hair.longitudinal_roughness = hair.longitudinal_roughness;
        material.hair.azimuthal_roughness = hair.azimuthal_roughness;
        material.hair.ior = hair.ior;
        material.hair.cuticle_angle = hair.cuticle_angle;
        material.hair.diffuse_reflection_weight = hair.diffuse_reflection_weight;
        material.hair.diffuse_reflection_tint = Vec3::from(hair.diffuse_reflection_tint);
    }

    material
}

/// Builds one material per glTF material, in document order.
pub fn load_materials(
    textures: &mut TextureResolver<'_>,
    factory: &dyn SceneTypeFactory,
    model_file_name: &str,
    options: &ImportOptions,
) -> Vec<Arc<Material>> {
    let document = textures.document;
    document
        .materials()
        .enumerate()
        .map(|(index, gltf_material)| {
            let material = load_material(
                textures,
                factory,
                model_file_name,
                options,
                &gltf_material,
                index,
            );
            log::debug!("Loaded material '{}'", material.name);
            Arc::new(material)
        })
        .collect()
}
