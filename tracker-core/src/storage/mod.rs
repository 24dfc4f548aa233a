//! Storage capabilities
//!
//! Local storage mode writes the primary log through a [`DataStorage`], and the
//! backup path prefers an [`AppendStorage`] when one is configured. Two
//! implementations ship with the crate:
//!
//! - [`InMemoryStorage`]: a map of named strings, for tests and embedding
//! - [`FileStorage`]: one file per name inside a directory

mod local_log;

pub use local_log::merge_local_log;

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::error::{Result, TrackerError};

/// Named key/value text storage
pub trait DataStorage: Send + Sync {
    fn exists(&self, name: &str) -> Result<bool>;

    fn load(&self, name: &str) -> Result<String>;

    fn save(&self, name: &str, data: &str) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Storage that can append without reading first
pub trait AppendStorage: Send + Sync {
    fn append(&self, name: &str, data: &str) -> Result<()>;
}

/// In-memory storage
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    files: RwLock<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of `name`, if it was ever written
    pub fn get(&self, name: &str) -> Option<String> {
        self.files.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.files.write().clear();
    }
}

impl DataStorage for InMemoryStorage {
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.files.read().contains_key(name))
    }

    fn load(&self, name: &str) -> Result<String> {
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TrackerError::Storage {
                reason: format!("'{}' not found", name),
            })
    }

    fn save(&self, name: &str, data: &str) -> Result<()> {
        self.files.write().insert(name.to_string(), data.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl AppendStorage for InMemoryStorage {
    fn append(&self, name: &str, data: &str) -> Result<()> {
        self.files
            .write()
            .entry(name.to_string())
            .or_default()
            .push_str(data);
        Ok(())
    }
}

/// File-based storage
///
/// Each name maps to a file directly inside the storage directory.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    /// Create a new file storage in the given directory
    pub fn new<P: Into<PathBuf>>(directory: P) -> Result<Self> {
        let dir = directory.into();
        std::fs::create_dir_all(&dir).map_err(|e| TrackerError::Io {
            message: format!("Failed to create storage directory: {}", e),
        })?;
        Ok(Self { directory: dir })
    }

    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !plain {
            return Err(TrackerError::Storage {
                reason: format!("invalid file name '{}'", name),
            });
        }
        Ok(self.directory.join(name))
    }
}

impl DataStorage for FileStorage {
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.path(name)?.is_file())
    }

    fn load(&self, name: &str) -> Result<String> {
        let path = self.path(name)?;
        std::fs::read_to_string(&path).map_err(|e| TrackerError::Io {
            message: format!("Failed to read {}: {}", path.display(), e),
        })
    }

    fn save(&self, name: &str, data: &str) -> Result<()> {
        let path = self.path(name)?;
        std::fs::write(&path, data).map_err(|e| TrackerError::Io {
            message: format!("Failed to write {}: {}", path.display(), e),
        })
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

impl AppendStorage for FileStorage {
    fn append(&self, name: &str, data: &str) -> Result<()> {
        let path = self.path(name)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TrackerError::Io {
                message: format!("Failed to open file: {}", e),
            })?;

        file.write_all(data.as_bytes()).map_err(|e| TrackerError::Io {
            message: format!("Failed to write: {}", e),
        })
    }
}
