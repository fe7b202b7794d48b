pub mod config_loader;
pub mod error;
pub mod loader;
pub mod scene;
pub mod texture_cache;
pub mod transform;
pub mod vfs;

pub use config_loader::{ConfigFileLoader, ImportOptions};
pub use error::{ExtensionError, ImportError};
pub use loader::{GltfImporter, SceneImportResult, SceneLoadingStats};
pub use texture_cache::{DeferredTextureCache, TextureCache};
