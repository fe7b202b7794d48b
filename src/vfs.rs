use std::{
    collections::HashMap,
    fmt,
    io,
    ops::{Deref, Range},
    path::{Component, Path, PathBuf},
    sync::{Arc, RwLock},
};

/// An immutable, reference counted byte buffer.
/// A blob can be a view into a larger blob, in which case it keeps the whole allocation alive.
#[derive(Clone)]
pub struct Blob {
    data: Arc<[u8]>,
    range: Range<usize>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data: data.into(),
            range: 0..len,
        }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }

    /// Creates a view of a sub-range. Returns `None` if the range doesn't fit.
    pub fn slice(&self, range: Range<usize>) -> Option<Blob> {
        if range.start > range.end || range.end > self.len() {
            return None;
        }
        Some(Self {
            data: self.data.clone(),
            range: (self.range.start + range.start)..(self.range.start + range.end),
        })
    }

    /// True if both blobs are views of the same allocation.
    pub fn shares_storage_with(&self, other: &Blob) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for Blob {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("range", &self.range)
            .field("storage_len", &self.data.len())
            .finish()
    }
}

pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &Path) -> io::Result<Blob>;
    fn file_exists(&self, path: &Path) -> bool;
    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// Reads files from disk, optionally relative to a base directory.
#[derive(Default, Debug, Clone)]
pub struct NativeFileSystem {
    base_path: Option<PathBuf>,
}

impl NativeFileSystem {
    pub fn new() -> Self {
        Self { base_path: None }
    }

    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: Some(base_path.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_path {
            Some(base_path) => base_path.join(path),
            None => path.to_path_buf(),
        }
    }
}

impl FileSystem for NativeFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<Blob> {
        std::fs::read(self.resolve(path)).map(Blob::new)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        std::fs::write(self.resolve(path), data)
    }
}

/// An in-memory file system. Paths are normalized, so `a/./b/../c` and `a/c` are the same file.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: RwLock<HashMap<PathBuf, Blob>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&self, path: impl AsRef<Path>, data: impl Into<Blob>) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(normalize_path(path.as_ref()), data.into());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Blob> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.get(&normalize_path(path.as_ref())).cloned()
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<Blob> {
        self.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not in the memory file system", path.display()),
            )
        })
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.insert(path, data.to_vec());
        Ok(())
    }
}

/// Lexically normalizes a path by folding `.` and `..` components. Does not touch the disk.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
