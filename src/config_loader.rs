use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Tunables of the glTF importer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ImportOptions {
    /// Look for a `.dds` file next to every referenced image and prefer it when it exists.
    pub search_for_dds: bool,
    /// Recompute tangents even when the asset has them, and write the patched
    /// buffers next to the asset as `<name>.buffer<N>.bin`.
    pub force_rebuild_tangents: bool,
    /// Upper bound for a decoded data URI, in bytes.
    pub max_inline_data_size: usize,
    pub texture_extension_size_limit: usize,
    pub material_extension_size_limit: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            search_for_dds: true,
            force_rebuild_tangents: false,
            max_inline_data_size: 256 * 1024 * 1024,
            texture_extension_size_limit: 2048,
            material_extension_size_limit: 1024,
        }
    }
}

impl ImportOptions {
    pub fn from_str(value: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(value)?)
    }
}

/// Loads the import options from a JSON file, and writes the defaults if the file doesn't exist yet.
pub struct ConfigFileLoader {
    pub path: PathBuf,
    config: Option<ImportOptions>,
}

impl ConfigFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: None,
        }
    }

    pub fn load_config(&mut self) -> anyhow::Result<&mut ImportOptions> {
        let config = match std::fs::read_to_string(&self.path) {
            Ok(content) => ImportOptions::from_str(&content)
                .with_context(|| format!("Invalid import options in {:?}", self.path))?,
            Err(_) => {
                log::info!("No import options at {:?}, writing the defaults", self.path);
                self.config = Some(ImportOptions::default());
                self.save_config()?;
                ImportOptions::default()
            }
        };
        Ok(self.config.insert(config))
    }

    pub fn get_or_load_config(&mut self) -> anyhow::Result<&mut ImportOptions> {
        if let Some(config) = self.config.take() {
            return Ok(self.config.insert(config));
        }
        self.load_config()
    }

    pub fn save_config(&self) -> anyhow::Result<()> {
        if let Some(config) = &self.config {
            let content = serde_json::to_string_pretty(config)?;
            std::fs::write(&self.path, content)
                .with_context(|| format!("Couldn't write {:?}", self.path))?;
        }
        Ok(())
    }
}
