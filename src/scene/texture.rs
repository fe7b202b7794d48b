use std::{
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex, RwLock},
};

use crate::vfs::Blob;

/// Image bytes that live in memory, either a view into a loaded buffer or a decoded data URI.
#[derive(Debug)]
pub struct InlineData {
    pub buffer: Blob,
    pub name: String,
    pub mime_type: String,
}

/// Where the pixels of an image come from.
#[derive(Clone, Debug, Default)]
pub enum TextureReference {
    #[default]
    None,
    Path(PathBuf),
    Inline(Arc<InlineData>),
}

impl TextureReference {
    pub fn is_none(&self) -> bool {
        matches!(self, TextureReference::None)
    }
}

/// Paths are compared by value, inline data by identity.
impl PartialEq for TextureReference {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TextureReference::None, TextureReference::None) => true,
            (TextureReference::Path(a), TextureReference::Path(b)) => a == b,
            (TextureReference::Inline(a), TextureReference::Inline(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for TextureReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureReference::None => write!(f, "<none>"),
            TextureReference::Path(path) => write!(f, "{}", path.display()),
            TextureReference::Inline(data) => write!(f, "{}", data.name),
        }
    }
}

/// Describes how one source image feeds channels of the final texture.
/// A channel of -1 means "don't care".
#[derive(Clone, Debug, PartialEq)]
pub struct TextureSwizzle {
    pub source: TextureReference,
    pub num_channels: usize,
    pub channels: [i32; 4],
}

impl Default for TextureSwizzle {
    fn default() -> Self {
        Self {
            source: TextureReference::None,
            num_channels: 0,
            channels: [-1; 4],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextureAlphaMode {
    #[default]
    Unknown,
    Straight,
    Premultiplied,
    Opaque,
    Custom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageContainer {
    Png,
    Jpeg,
    Dds,
    Ktx2,
    Unknown,
}

impl ImageContainer {
    /// Detects the container from the magic bytes, falling back to the MIME type.
    pub fn sniff(bytes: &[u8], mime_type: &str) -> Self {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            ImageContainer::Png
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            ImageContainer::Jpeg
        } else if bytes.starts_with(b"DDS ") {
            ImageContainer::Dds
        } else if bytes.starts_with(b"\xABKTX 20\xBB\r\n\x1A\n") {
            ImageContainer::Ktx2
        } else {
            match mime_type {
                "image/png" => ImageContainer::Png,
                "image/jpeg" => ImageContainer::Jpeg,
                "image/vnd-ms.dds" | "image/dds" => ImageContainer::Dds,
                "image/ktx2" => ImageContainer::Ktx2,
                _ => ImageContainer::Unknown,
            }
        }
    }
}

/// What the texture cache produced for a texture. Decoding happens further down the pipeline.
#[derive(Debug)]
pub struct TextureData {
    pub data: Blob,
    pub container: ImageContainer,
    pub srgb: bool,
}

#[derive(Default)]
struct TextureState {
    data: Option<Arc<TextureData>>,
    alpha_mode: TextureAlphaMode,
    original_bits_per_pixel: u32,
}

/// A texture cache record. The data is filled in later, possibly on another thread.
pub struct LoadedTexture {
    pub path: String,
    pub mime_type: String,
    state: RwLock<TextureState>,
    swizzle_options: Mutex<Vec<TextureSwizzle>>,
}

impl LoadedTexture {
    pub fn new(path: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime_type: mime_type.into(),
            state: Default::default(),
            swizzle_options: Default::default(),
        }
    }

    /// A texture without an image, used to carry swizzle options.
    pub fn empty() -> Self {
        Self::new("", "")
    }

    pub fn is_loaded(&self) -> bool {
        self.read_state().data.is_some()
    }

    pub fn data(&self) -> Option<Arc<TextureData>> {
        self.read_state().data.clone()
    }

    pub fn alpha_mode(&self) -> TextureAlphaMode {
        self.read_state().alpha_mode
    }

    pub fn original_bits_per_pixel(&self) -> u32 {
        self.read_state().original_bits_per_pixel
    }

    pub fn set_loaded(
        &self,
        data: TextureData,
        alpha_mode: TextureAlphaMode,
        original_bits_per_pixel: u32,
    ) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.data = Some(Arc::new(data));
        state.alpha_mode = alpha_mode;
        state.original_bits_per_pixel = original_bits_per_pixel;
    }

    pub fn swizzle_options(&self) -> Vec<TextureSwizzle> {
        self.swizzle_options
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Merges swizzle options coming from another glTF texture that shares this image.
    pub fn merge_swizzle_options(&self, incoming: Vec<TextureSwizzle>) {
        let mut options = self
            .swizzle_options
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if options.is_empty() {
            *options = incoming;
            return;
        }

        if options.len() != incoming.len() {
            log::warn!(
                "Different glTF texture objects are using the same image '{}' but different numbers of swizzle options. Ignoring the second swizzle definition.",
                self.path
            );
            return;
        }

        for (existing, incoming) in options.iter_mut().zip(incoming) {
            if existing.source != incoming.source {
                log::warn!(
                    "Different glTF texture objects are using the same image '{}' but different swizzle sources '{}' and '{}'. Ignoring the second swizzle definition.",
                    self.path,
                    existing.source,
                    incoming.source
                );
                break;
            }

            existing.num_channels = existing.num_channels.max(incoming.num_channels);
            for (channel, value) in incoming
                .channels
                .iter()
                .enumerate()
                .take(incoming.num_channels)
            {
                if *value >= 0 {
                    existing.channels[channel] = *value;
                }
            }
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, TextureState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for LoadedTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedTexture")
            .field("path", &self.path)
            .field("mime_type", &self.mime_type)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swizzle(source: &str, channels: [i32; 4], num_channels: usize) -> TextureSwizzle {
        TextureSwizzle {
            source: TextureReference::Path(source.into()),
            num_channels,
            channels,
        }
    }

    #[test]
    fn compatible_swizzles_merge() {
        let texture = LoadedTexture::new("packed.png", "image/png");
        texture.merge_swizzle_options(vec![swizzle("a.png", [0, -1, -1, -1], 1)]);
        texture.merge_swizzle_options(vec![swizzle("a.png", [-1, 2, -1, -1], 2)]);

        let options = texture.swizzle_options();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].num_channels, 2);
        assert_eq!(options[0].channels, [0, 2, -1, -1]);
    }

    #[test]
    fn conflicting_sources_stop_merging() {
        let texture = LoadedTexture::new("packed.png", "image/png");
        texture.merge_swizzle_options(vec![
            swizzle("a.png", [0, -1, -1, -1], 1),
            swizzle("b.png", [1, -1, -1, -1], 1),
        ]);
        texture.merge_swizzle_options(vec![
            swizzle("c.png", [3, -1, -1, -1], 1),
            swizzle("b.png", [-1, 2, -1, -1], 2),
        ]);

        let options = texture.swizzle_options();
        assert_eq!(options[0].channels, [0, -1, -1, -1]);
        assert_eq!(options[1].channels, [1, -1, -1, -1]);
    }

    #[test]
    fn different_option_counts_are_ignored() {
        let texture = LoadedTexture::new("packed.png", "image/png");
        texture.merge_swizzle_options(vec![swizzle("a.png", [0, -1, -1, -1], 1)]);
        texture.merge_swizzle_options(vec![
            swizzle("a.png", [1, -1, -1, -1], 1),
            swizzle("b.png", [1, -1, -1, -1], 1),
        ]);

        assert_eq!(texture.swizzle_options(), vec![swizzle("a.png", [0, -1, -1, -1], 1)]);
    }

    #[test]
    fn inline_references_compare_by_identity() {
        let data = Arc::new(InlineData {
            buffer: Blob::new(vec![1, 2, 3]),
            name: "image".into(),
            mime_type: "image/png".into(),
        });
        let same = TextureReference::Inline(data.clone());
        let copy = TextureReference::Inline(Arc::new(InlineData {
            buffer: data.buffer.clone(),
            name: data.name.clone(),
            mime_type: data.mime_type.clone(),
        }));

        assert_eq!(TextureReference::Inline(data), same);
        assert_ne!(same, copy);
    }
}
