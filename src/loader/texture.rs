use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::Value;
use tokio::runtime::Handle;

use crate::{
    config_loader::ImportOptions,
    scene::{InlineData, LoadedTexture, TextureReference, TextureSwizzle},
    texture_cache::TextureCache,
    vfs::{normalize_path, Blob, FileSystem},
};

use super::{
    extensions::parse_texture_extensions,
    uri::{decode_data_uri, is_data_uri, percent_decode},
};

#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy)]
struct ImageKey {
    index: usize,
}

#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy)]
struct TextureKey {
    index: usize,
}

/// Turns glTF images and textures into texture cache records.
/// Every image and every texture is only resolved once per import.
pub struct TextureResolver<'a> {
    pub(super) document: &'a gltf::Document,
    pub(super) json: &'a Value,
    buffers: &'a [Blob],
    file_name: &'a Path,
    fs: &'a dyn FileSystem,
    texture_cache: &'a dyn TextureCache,
    executor: Option<&'a Handle>,
    options: &'a ImportOptions,
    inline_data: HashMap<ImageKey, Arc<InlineData>>,
    images: HashMap<ImageKey, Option<Arc<LoadedTexture>>>,
    textures: HashMap<TextureKey, Option<Arc<LoadedTexture>>>,
}

impl<'a> TextureResolver<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        document: &'a gltf::Document,
        json: &'a Value,
        buffers: &'a [Blob],
        file_name: &'a Path,
        fs: &'a dyn FileSystem,
        texture_cache: &'a dyn TextureCache,
        executor: Option<&'a Handle>,
        options: &'a ImportOptions,
    ) -> Self {
        Self {
            document,
            json,
            buffers,
            file_name,
            fs,
            texture_cache,
            executor,
            options,
            inline_data: HashMap::new(),
            images: HashMap::new(),
            textures: HashMap::new(),
        }
    }

    fn image(&self, index: usize) -> Option<gltf::Image<'a>> {
        self.document.images().nth(index)
    }

    fn inline_name(&self, image: &gltf::Image<'_>) -> String {
        match image.name() {
            Some(name) => name.to_string(),
            None => {
                let file_name = self
                    .file_name
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{}[{}]", file_name, image.index())
            }
        }
    }

    fn image_path(&self, uri: &str, search_for_dds: bool) -> PathBuf {
        let directory = self.file_name.parent().unwrap_or(Path::new(""));
        let path = normalize_path(&directory.join(percent_decode(uri)));

        if search_for_dds {
            let dds_path = path.with_extension("dds");
            if dds_path != path && self.fs.file_exists(&dds_path) {
                log::debug!("Using {:?} instead of {:?}", dds_path, path);
                return dds_path;
            }
        }
        path
    }

    /// Finds the bytes or the file behind a glTF image.
    pub fn resolve_image_source(
        &mut self,
        image: &gltf::Image<'_>,
        search_for_dds: bool,
    ) -> TextureReference {
        let key = ImageKey {
            index: image.index(),
        };
        if let Some(data) = self.inline_data.get(&key) {
            return TextureReference::Inline(data.clone());
        }

        let (buffer, mime_type) = match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let start = view.offset();
                let buffer = start.checked_add(view.length()).and_then(|end| {
                    self.buffers
                        .get(view.buffer().index())
                        .and_then(|buffer| buffer.slice(start..end))
                });
                match buffer {
                    Some(buffer) => (buffer, mime_type.to_string()),
                    None => {
                        log::warn!(
                            "Image {} points outside of its buffer, ignoring.",
                            image.index()
                        );
                        return TextureReference::None;
                    }
                }
            }
            gltf::image::Source::Uri { uri, mime_type } if is_data_uri(uri) => {
                match decode_data_uri(uri, self.options.max_inline_data_size) {
                    Ok(data) => {
                        let mime_type = mime_type
                            .map(str::to_string)
                            .or_else(|| data_uri_mime_type(uri))
                            .unwrap_or_default();
                        (Blob::new(data), mime_type)
                    }
                    Err(err) => {
                        log::warn!("{} for image {}, ignoring.", err, image.index());
                        return TextureReference::None;
                    }
                }
            }
            gltf::image::Source::Uri { uri, .. } => {
                return TextureReference::Path(self.image_path(uri, search_for_dds));
            }
        };

        let data = Arc::new(InlineData {
            buffer,
            name: self.inline_name(image),
            mime_type,
        });
        self.inline_data.insert(key, data.clone());
        TextureReference::Inline(data)
    }

    fn load_image(
        &mut self,
        image: &gltf::Image<'_>,
        srgb: bool,
        search_for_dds: bool,
    ) -> Option<Arc<LoadedTexture>> {
        let key = ImageKey {
            index: image.index(),
        };
        if let Some(texture) = self.images.get(&key) {
            return texture.clone();
        }

        let texture = match self.resolve_image_source(image, search_for_dds) {
            TextureReference::Inline(data) => match self.executor {
                Some(executor) => self.texture_cache.load_texture_from_memory_async(
                    &data.buffer,
                    &data.name,
                    &data.mime_type,
                    srgb,
                    executor,
                ),
                None => self.texture_cache.load_texture_from_memory_deferred(
                    &data.buffer,
                    &data.name,
                    &data.mime_type,
                    srgb,
                ),
            },
            TextureReference::Path(path) => match self.executor {
                Some(executor) => self
                    .texture_cache
                    .load_texture_from_file_async(&path, srgb, executor),
                None => self.texture_cache.load_texture_from_file_deferred(&path, srgb),
            },
            TextureReference::None => None,
        };

        self.images.insert(key, texture.clone());
        texture
    }

    /// Loads a glTF texture, preferring its DDS image, and applies its swizzle options.
    pub fn resolve_texture(
        &mut self,
        texture: &gltf::Texture<'_>,
        srgb: bool,
    ) -> Option<Arc<LoadedTexture>> {
        let key = TextureKey {
            index: texture.index(),
        };
        if let Some(loaded) = self.textures.get(&key) {
            return loaded.clone();
        }

        let extensions = parse_texture_extensions(
            self.json["textures"][texture.index()].get("extensions"),
            self.document.images().len(),
            self.options.texture_extension_size_limit,
        );

        let mut loaded = extensions
            .dds_image
            .and_then(|index| self.image(index))
            .and_then(|image| self.load_image(&image, srgb, false));
        if loaded.is_none() {
            loaded = self.load_image(&texture.source(), srgb, self.options.search_for_dds);
        }

        if !extensions.swizzle_options.is_empty() {
            let options = extensions
                .swizzle_options
                .iter()
                .map(|option| {
                    let source = match self.image(option.source) {
                        Some(image) => self.resolve_image_source(&image, false),
                        None => TextureReference::None,
                    };
                    let mut channels = [-1; 4];
                    channels[..option.channels.len()].copy_from_slice(&option.channels);
                    TextureSwizzle {
                        source,
                        num_channels: option.channels.len(),
                        channels,
                    }
                })
                .collect();

            let texture = loaded.get_or_insert_with(|| Arc::new(LoadedTexture::empty()));
            texture.merge_swizzle_options(options);
        }

        self.textures.insert(key, loaded.clone());
        loaded
    }

    pub fn resolve_texture_index(&mut self, index: usize, srgb: bool) -> Option<Arc<LoadedTexture>> {
        match self.document.textures().nth(index) {
            Some(texture) => self.resolve_texture(&texture, srgb),
            None => {
                log::warn!("Texture {} doesn't exist, ignoring.", index);
                None
            }
        }
    }
}

fn data_uri_mime_type(uri: &str) -> Option<String> {
    let header = uri.strip_prefix("data:")?.split(',').next()?;
    let mime_type = header.split(';').next()?;
    (!mime_type.is_empty()).then(|| mime_type.to_string())
}
