use std::path::PathBuf;

use thiserror::Error;

/// An error that aborts the import of a glTF file. No scene is produced.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Couldn't read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Couldn't parse glTF file: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("Couldn't parse the glTF JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to load buffer {index}: {reason}")]
    BufferLoad { index: usize, reason: String },
    #[error("Accessor {accessor} used as {usage} has an unsupported layout {layout}")]
    UnsupportedAccessor {
        accessor: usize,
        usage: &'static str,
        layout: String,
    },
    #[error("Accessor {accessor} reads past the end of its buffer")]
    AccessorOutOfBounds { accessor: usize },
    #[error("Mesh '{mesh}' has {found} {attribute} values, expected {expected}")]
    AttributeCountMismatch {
        mesh: String,
        attribute: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("A primitive of mesh '{mesh}' has no positions")]
    MissingPositions { mesh: String },
}

/// A malformed vendor extension. The importer logs these and continues with defaults.
#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("Extension {name} is {size} bytes, the limit is {limit}")]
    TooLarge {
        name: &'static str,
        size: usize,
        limit: usize,
    },
    #[error("Extension {name} is not a JSON object")]
    NotAnObject { name: &'static str },
    #[error("Extension {name} is malformed: {source}")]
    Malformed {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Extension {name} references image {index}, but there are only {count}")]
    ImageOutOfRange {
        name: &'static str,
        index: usize,
        count: usize,
    },
    #[error("Swizzle option has {0} channels, at most 4 are supported")]
    TooManyChannels(usize),
}
