use std::path::Path;

use crate::{
    error::ImportError,
    vfs::{normalize_path, Blob, FileSystem},
};

use super::uri::{decode_data_uri, is_data_uri, percent_decode};

/// Loads every buffer of the document, from the GLB binary chunk, a data URI or a file.
pub fn load_buffers(
    document: &gltf::Document,
    binary_chunk: Option<Vec<u8>>,
    file_name: &Path,
    fs: &dyn FileSystem,
    max_inline_data_size: usize,
) -> Result<Vec<Blob>, ImportError> {
    let directory = file_name.parent().unwrap_or(Path::new(""));
    let mut binary_chunk = binary_chunk.map(Blob::new);

    let mut buffers = Vec::with_capacity(document.buffers().len());
    for buffer in document.buffers() {
        let index = buffer.index();
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => binary_chunk.take().ok_or(ImportError::BufferLoad {
                index,
                reason: "the file has no binary chunk".to_string(),
            })?,
            gltf::buffer::Source::Uri(uri) if is_data_uri(uri) => {
                decode_data_uri(uri, max_inline_data_size)
                    .map(Blob::new)
                    .map_err(|err| ImportError::BufferLoad {
                        index,
                        reason: err.to_string(),
                    })?
            }
            gltf::buffer::Source::Uri(uri) => {
                let path = normalize_path(&directory.join(percent_decode(uri)));
                fs.read_file(&path).map_err(|source| ImportError::Io { path, source })?
            }
        };

        if data.len() < buffer.length() {
            return Err(ImportError::BufferLoad {
                index,
                reason: format!(
                    "expected {} bytes, but only {} are available",
                    buffer.length(),
                    data.len()
                ),
            });
        }
        log::debug!("Loaded buffer {} ({} bytes)", index, data.len());
        buffers.push(data);
    }

    Ok(buffers)
}
