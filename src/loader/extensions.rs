//! Vendor and Khronos extension blocks that the `gltf` crate doesn't expose.
//!
//! Malformed extensions never fail the import, they are logged and replaced by defaults.

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::error::ExtensionError;

pub const MSFT_TEXTURE_DDS: &str = "MSFT_texture_dds";
pub const NV_TEXTURE_SWIZZLE: &str = "NV_texture_swizzle";
pub const NV_MATERIALS_SUBSURFACE: &str = "NV_materials_subsurface";
pub const NV_MATERIALS_HAIR: &str = "NV_materials_hair";
pub const KHR_TEXTURE_TRANSFORM: &str = "KHR_texture_transform";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SwizzleOption {
    /// Image index
    pub source: usize,
    pub channels: Vec<i32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureExtensions {
    /// Image index of the DDS version of the texture
    pub dds_image: Option<usize>,
    pub swizzle_options: Vec<SwizzleOption>,
}

#[derive(Deserialize)]
struct DdsJson {
    source: Option<usize>,
}

#[derive(Deserialize)]
struct SwizzleJson {
    #[serde(default)]
    options: Vec<SwizzleOptionJson>,
}

#[derive(Deserialize)]
struct SwizzleOptionJson {
    source: usize,
    #[serde(default)]
    channels: Vec<i32>,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TextureInfoJson {
    pub index: usize,
}

/// Missing keys are zero.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SubsurfaceExtension {
    pub transmission_color_texture: Option<TextureInfoJson>,
    pub transmission_color: [f32; 3],
    pub scattering_color: [f32; 3],
    pub scale: f32,
    pub anisotropy: f32,
}

/// Missing keys are zero.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HairExtension {
    pub base_color: [f32; 3],
    pub melanin: f32,
    pub melanin_redness: f32,
    pub longitudinal_roughness: f32,
    pub azimuthal_roughness: f32,
    pub ior: f32,
    pub cuticle_angle: f32,
    pub diffuse_reflection_weight: f32,
    pub diffuse_reflection_tint: [f32; 3],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialExtensions {
    pub subsurface: Option<SubsurfaceExtension>,
    pub hair: Option<HairExtension>,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TextureTransform {
    pub offset: [f32; 2],
    pub rotation: f32,
    pub scale: [f32; 2],
    pub tex_coord: Option<u32>,
}

impl Default for TextureTransform {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            rotation: 0.0,
            scale: [1.0, 1.0],
            tex_coord: None,
        }
    }
}

impl TextureTransform {
    pub fn is_scale_only(&self) -> bool {
        self.rotation == 0.0 && self.offset == [0.0, 0.0]
    }
}

fn parse_extension<T: DeserializeOwned>(
    name: &'static str,
    value: &Value,
    limit: usize,
) -> Result<T, ExtensionError> {
    let size = serde_json::to_string(value)
        .map_err(|source| ExtensionError::Malformed { name, source })?
        .len();
    if size > limit {
        return Err(ExtensionError::TooLarge { name, size, limit });
    }
    if !value.is_object() {
        return Err(ExtensionError::NotAnObject { name });
    }
    serde_json::from_value(value.clone()).map_err(|source| ExtensionError::Malformed { name, source })
}

fn warn_and_default<T: Default>(result: Result<T, ExtensionError>) -> T {
    result.unwrap_or_else(|err| {
        log::warn!("{}, ignoring it", err);
        T::default()
    })
}

fn check_image(name: &'static str, index: usize, image_count: usize) -> Result<usize, ExtensionError> {
    if index < image_count {
        Ok(index)
    } else {
        Err(ExtensionError::ImageOutOfRange {
            name,
            index,
            count: image_count,
        })
    }
}

/// Parses the `extensions` object of a glTF texture.
pub fn parse_texture_extensions(
    extensions: Option<&Value>,
    image_count: usize,
    limit: usize,
) -> TextureExtensions {
    let Some(extensions) = extensions else {
        return TextureExtensions::default();
    };

    let dds_image = extensions.get(MSFT_TEXTURE_DDS).and_then(|value| {
        let result = parse_extension::<DdsJson>(MSFT_TEXTURE_DDS, value, limit).and_then(|dds| {
            dds.source
                .map(|index| check_image(MSFT_TEXTURE_DDS, index, image_count))
                .transpose()
        });
        warn_and_default(result)
    });

    let swizzle_options = extensions
        .get(NV_TEXTURE_SWIZZLE)
        .map(|value| {
            let result = parse_extension::<SwizzleJson>(NV_TEXTURE_SWIZZLE, value, limit)
                .and_then(|swizzle| {
                    swizzle
                        .options
                        .into_iter()
                        .map(|option| {
                            if option.channels.len() > 4 {
                                return Err(ExtensionError::TooManyChannels(option.channels.len()));
                            }
                            Ok(SwizzleOption {
                                source: check_image(NV_TEXTURE_SWIZZLE, option.source, image_count)?,
                                channels: option.channels,
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()
                });
            warn_and_default(result)
        })
        .unwrap_or_default();

    TextureExtensions {
        dds_image,
        swizzle_options,
    }
}

/// Parses the `extensions` object of a glTF material.
pub fn parse_material_extensions(extensions: Option<&Value>, limit: usize) -> MaterialExtensions {
    let Some(extensions) = extensions else {
        return MaterialExtensions::default();
    };

    let subsurface = extensions.get(NV_MATERIALS_SUBSURFACE).and_then(|value| {
        parse_extension(NV_MATERIALS_SUBSURFACE, value, limit)
            .map_err(|err| log::warn!("{}, ignoring it", err))
            .ok()
    });
    let hair = extensions.get(NV_MATERIALS_HAIR).and_then(|value| {
        parse_extension(NV_MATERIALS_HAIR, value, limit)
            .map_err(|err| log::warn!("{}, ignoring it", err))
            .ok()
    });

    MaterialExtensions { subsurface, hair }
}

/// Reads `KHR_texture_transform` from a texture info object like `normalTexture`.
pub fn parse_texture_transform(texture_info: &Value) -> Option<TextureTransform> {
    let value = texture_info.get("extensions")?.get(KHR_TEXTURE_TRANSFORM)?;
    serde_json::from_value(value.clone())
        .map_err(|err| log::warn!("{} is malformed: {}, ignoring it", KHR_TEXTURE_TRANSFORM, err))
        .ok()
}
