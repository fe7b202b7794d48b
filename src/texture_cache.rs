use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use tokio::{runtime::Handle, task::JoinHandle};

use crate::{
    scene::{ImageContainer, LoadedTexture, TextureAlphaMode, TextureData},
    vfs::{Blob, FileSystem},
};

/// The texture loading interface the importer talks to.
///
/// The deferred functions only register the texture, the caller decides when to load it.
/// The async functions start loading right away on the given runtime.
/// Every function returns immediately with a shared record that is filled in later.
pub trait TextureCache: Send + Sync {
    fn load_texture_from_file_deferred(&self, path: &Path, srgb: bool)
        -> Option<Arc<LoadedTexture>>;

    fn load_texture_from_file_async(
        &self,
        path: &Path,
        srgb: bool,
        executor: &Handle,
    ) -> Option<Arc<LoadedTexture>>;

    fn load_texture_from_memory_deferred(
        &self,
        data: &Blob,
        name: &str,
        mime_type: &str,
        srgb: bool,
    ) -> Option<Arc<LoadedTexture>>;

    fn load_texture_from_memory_async(
        &self,
        data: &Blob,
        name: &str,
        mime_type: &str,
        srgb: bool,
        executor: &Handle,
    ) -> Option<Arc<LoadedTexture>>;
}

enum TextureSource {
    File(PathBuf),
    Memory(Blob),
}

struct PendingLoad {
    texture: Arc<LoadedTexture>,
    source: TextureSource,
    srgb: bool,
}

/// A texture cache that deduplicates textures by path or name and reads their bytes,
/// either when [`DeferredTextureCache::process_deferred`] is called or on a tokio runtime.
pub struct DeferredTextureCache {
    fs: Arc<dyn FileSystem>,
    textures: Mutex<HashMap<String, Arc<LoadedTexture>>>,
    pending: Mutex<Vec<PendingLoad>>,
    in_flight: Mutex<Vec<JoinHandle<bool>>>,
}

impl DeferredTextureCache {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            textures: Default::default(),
            pending: Default::default(),
            in_flight: Default::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.textures.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<Arc<LoadedTexture>> {
        self.textures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Loads everything that was requested through the deferred functions.
    /// Returns the number of textures that were loaded successfully.
    pub fn process_deferred(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        pending
            .into_iter()
            .filter(|load| finish_load(self.fs.as_ref(), load))
            .count()
    }

    /// Waits for the loads started by the async functions.
    /// Returns the number of textures that were loaded successfully.
    pub async fn wait_for_async_loads(&self) -> usize {
        let handles =
            std::mem::take(&mut *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()));
        let mut loaded = 0;
        for handle in handles {
            match handle.await {
                Ok(true) => loaded += 1,
                Ok(false) => {}
                Err(err) => log::error!("Texture loading task failed: {}", err),
            }
        }
        loaded
    }

    /// Returns the cached texture, or a new record and true if it wasn't cached yet.
    fn get_or_create(&self, key: &str, mime_type: &str) -> (Arc<LoadedTexture>, bool) {
        let mut textures = self.textures.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(texture) = textures.get(key) {
            return (texture.clone(), false);
        }
        let texture = Arc::new(LoadedTexture::new(key, mime_type));
        textures.insert(key.to_string(), texture.clone());
        (texture, true)
    }

    fn request_file(&self, path: &Path, srgb: bool) -> Option<(Arc<LoadedTexture>, Option<PendingLoad>)> {
        if !self.fs.file_exists(path) {
            log::warn!("Texture file {:?} doesn't exist", path);
            return None;
        }

        let key = path.to_string_lossy();
        let (texture, created) = self.get_or_create(&key, "");
        let load = created.then(|| PendingLoad {
            texture: texture.clone(),
            source: TextureSource::File(path.to_path_buf()),
            srgb,
        });
        Some((texture, load))
    }

    fn request_memory(
        &self,
        data: &Blob,
        name: &str,
        mime_type: &str,
        srgb: bool,
    ) -> (Arc<LoadedTexture>, Option<PendingLoad>) {
        let (texture, created) = self.get_or_create(name, mime_type);
        let load = created.then(|| PendingLoad {
            texture: texture.clone(),
            source: TextureSource::Memory(data.clone()),
            srgb,
        });
        (texture, load)
    }

    fn defer(&self, load: Option<PendingLoad>) {
        if let Some(load) = load {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(load);
        }
    }

    fn spawn(&self, load: Option<PendingLoad>, executor: &Handle) {
        if let Some(load) = load {
            let fs = self.fs.clone();
            let handle = executor.spawn_blocking(move || finish_load(fs.as_ref(), &load));
            self.in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(handle);
        }
    }
}

impl TextureCache for DeferredTextureCache {
    fn load_texture_from_file_deferred(
        &self,
        path: &Path,
        srgb: bool,
    ) -> Option<Arc<LoadedTexture>> {
        let (texture, load) = self.request_file(path, srgb)?;
        self.defer(load);
        Some(texture)
    }

    fn load_texture_from_file_async(
        &self,
        path: &Path,
        srgb: bool,
        executor: &Handle,
    ) -> Option<Arc<LoadedTexture>> {
        let (texture, load) = self.request_file(path, srgb)?;
        self.spawn(load, executor);
        Some(texture)
    }

    fn load_texture_from_memory_deferred(
        &self,
        data: &Blob,
        name: &str,
        mime_type: &str,
        srgb: bool,
    ) -> Option<Arc<LoadedTexture>> {
        let (texture, load) = self.request_memory(data, name, mime_type, srgb);
        self.defer(load);
        Some(texture)
    }

    fn load_texture_from_memory_async(
        &self,
        data: &Blob,
        name: &str,
        mime_type: &str,
        srgb: bool,
        executor: &Handle,
    ) -> Option<Arc<LoadedTexture>> {
        let (texture, load) = self.request_memory(data, name, mime_type, srgb);
        self.spawn(load, executor);
        Some(texture)
    }
}

fn finish_load(fs: &dyn FileSystem, load: &PendingLoad) -> bool {
    let data = match &load.source {
        TextureSource::File(path) => match fs.read_file(path) {
            Ok(data) => data,
            Err(err) => {
                log::warn!("Couldn't read texture {:?}: {}", path, err);
                return false;
            }
        },
        TextureSource::Memory(data) => data.clone(),
    };

    let container = ImageContainer::sniff(&data, &load.texture.mime_type);
    let (alpha_mode, bits_per_pixel) = describe_image(container, &data);
    log::debug!(
        "Loaded texture '{}' ({:?}, {} bytes)",
        load.texture.path,
        container,
        data.len()
    );

    load.texture.set_loaded(
        TextureData {
            data,
            container,
            srgb: load.srgb,
        },
        alpha_mode,
        bits_per_pixel,
    );
    true
}

/// Reads what can be known without decoding the pixels.
fn describe_image(container: ImageContainer, data: &[u8]) -> (TextureAlphaMode, u32) {
    match container {
        ImageContainer::Png if data.len() >= 26 => {
            // IHDR is always the first chunk
            let bit_depth = data[24] as u32;
            let (channels, alpha_mode) = match data[25] {
                0 => (1, TextureAlphaMode::Opaque),
                2 => (3, TextureAlphaMode::Opaque),
                3 => (1, TextureAlphaMode::Unknown),
                4 => (2, TextureAlphaMode::Straight),
                6 => (4, TextureAlphaMode::Straight),
                _ => (0, TextureAlphaMode::Unknown),
            };
            (alpha_mode, bit_depth * channels)
        }
        ImageContainer::Jpeg => (TextureAlphaMode::Opaque, 24),
        _ => (TextureAlphaMode::Unknown, 0),
    }
}
