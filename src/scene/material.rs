use std::sync::Arc;

use ultraviolet::{Vec2, Vec3};

use super::LoadedTexture;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MaterialDomain {
    #[default]
    Opaque,
    AlphaTested,
    AlphaBlended,
    Transmissive,
    TransmissiveAlphaTested,
    TransmissiveAlphaBlended,
}

impl MaterialDomain {
    pub fn from_alpha_mode(alpha_mode: gltf::material::AlphaMode, transmission: bool) -> Self {
        use gltf::material::AlphaMode;
        match (alpha_mode, transmission) {
            (AlphaMode::Opaque, false) => MaterialDomain::Opaque,
            (AlphaMode::Opaque, true) => MaterialDomain::Transmissive,
            (AlphaMode::Mask, false) => MaterialDomain::AlphaTested,
            (AlphaMode::Mask, true) => MaterialDomain::TransmissiveAlphaTested,
            (AlphaMode::Blend, false) => MaterialDomain::AlphaBlended,
            (AlphaMode::Blend, true) => MaterialDomain::TransmissiveAlphaBlended,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubsurfaceParams {
    pub transmission_color: Vec3,
    pub scattering_color: Vec3,
    pub scale: f32,
    pub anisotropy: f32,
}

impl Default for SubsurfaceParams {
    fn default() -> Self {
        Self {
            transmission_color: Vec3::broadcast(0.5),
            scattering_color: Vec3::broadcast(0.5),
            scale: 1.0,
            anisotropy: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HairParams {
    pub base_color: Vec3,
    pub melanin: f32,
    pub melanin_redness: f32,
    pub longitudinal_roughness: f32,
    pub azimuthal_roughness: f32,
    pub diffuse_reflection_weight: f32,
    pub diffuse_reflection_tint: Vec3,
    pub ior: f32,
    /// In degrees.
    pub cuticle_angle: f32,
}

impl Default for HairParams {
    fn default() -> Self {
        Self {
            base_color: Vec3::one(),
            melanin: 0.5,
            melanin_redness: 0.5,
            longitudinal_roughness: 0.25,
            azimuthal_roughness: 0.6,
            diffuse_reflection_weight: 0.0,
            diffuse_reflection_tint: Vec3::zero(),
            ior: 1.55,
            cuticle_angle: 3.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub model_file_name: String,
    /// Index of the material in the source file, or -1 for generated materials.
    pub material_index_in_model: i32,
    pub domain: MaterialDomain,
    pub use_specular_gloss_model: bool,

    pub base_or_diffuse_texture: Option<Arc<LoadedTexture>>,
    pub metal_rough_or_specular_texture: Option<Arc<LoadedTexture>>,
    pub normal_texture: Option<Arc<LoadedTexture>>,
    pub emissive_texture: Option<Arc<LoadedTexture>>,
    pub occlusion_texture: Option<Arc<LoadedTexture>>,
    pub transmission_texture: Option<Arc<LoadedTexture>>,
    /// glTF has no opacity texture, but other importers fill it.
    pub opacity_texture: Option<Arc<LoadedTexture>>,

    pub base_or_diffuse_color: Vec3,
    pub specular_color: Vec3,
    pub emissive_color: Vec3,
    pub emissive_intensity: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub opacity: f32,
    pub alpha_cutoff: f32,
    pub transmission_factor: f32,
    pub normal_texture_scale: f32,
    pub occlusion_strength: f32,
    pub normal_texture_transform_scale: Vec2,
    pub double_sided: bool,

    pub enable_subsurface_scattering: bool,
    pub subsurface: SubsurfaceParams,
    pub subsurface_transmission_texture: Option<Arc<LoadedTexture>>,
    pub enable_hair: bool,
    pub hair: HairParams,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            model_file_name: String::new(),
            material_index_in_model: -1,
            domain: MaterialDomain::Opaque,
            use_specular_gloss_model: false,
            base_or_diffuse_texture: None,
            metal_rough_or_specular_texture: None,
            normal_texture: None,
            emissive_texture: None,
            occlusion_texture: None,
            transmission_texture: None,
            opacity_texture: None,
            base_or_diffuse_color: Vec3::one(),
            specular_color: Vec3::zero(),
            emissive_color: Vec3::zero(),
            emissive_intensity: 1.0,
            metalness: 0.0,
            roughness: 0.0,
            opacity: 1.0,
            alpha_cutoff: 0.5,
            transmission_factor: 0.0,
            normal_texture_scale: 1.0,
            occlusion_strength: 1.0,
            normal_texture_transform_scale: Vec2::one(),
            double_sided: false,
            enable_subsurface_scattering: false,
            subsurface: SubsurfaceParams::default(),
            subsurface_transmission_texture: None,
            enable_hair: false,
            hair: HairParams::default(),
        }
    }
}

impl Material {
    /// Used by geometry that doesn't reference a material.
    pub fn missing_material() -> Self {
        Self {
            name: "(empty)".to_string(),
            ..Default::default()
        }
    }
}
