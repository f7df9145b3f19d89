//! Filesystem storage backend.
//!
//! A local directory stands in for the bucket. Keys map to relative paths
//! below the root; ACLs have no filesystem equivalent and are ignored.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::{CopyOptions, ObjectStore, StorageError, StorageResult};

const TEMP_SUFFIX: &str = ".relman-tmp";

/// Filesystem-based object store
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Create a store rooted at `root`. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path, refusing keys that would escape the root.
    fn key_to_path(&self, op: &'static str, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StorageError::backend(op, key, "invalid key"));
        }
        Ok(self.root.join(relative))
    }

    fn path_to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    /// Write through a sibling temp file so readers never see a partial object.
    fn write_atomic(&self, op: &'static str, key: &str, path: &Path, content: &[u8]) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::backend(op, key, e))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(TEMP_SUFFIX);
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, content).map_err(|e| StorageError::backend(op, key, e))?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StorageError::backend(op, key, e)
        })
    }
}

fn map_io(op: &'static str, key: &str, err: io::Error) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound {
            key: key.to_string(),
        }
    } else {
        StorageError::backend(op, key, err)
    }
}

impl ObjectStore for FilesystemStore {
    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        if !self.root.is_dir() {
            return Err(StorageError::backend(
                "list",
                prefix,
                format!("{} is not a directory", self.root.display()),
            ));
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| StorageError::backend("list", prefix, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = self.path_to_key(entry.path()) else {
                continue;
            };
            if key.ends_with(TEMP_SUFFIX) {
                continue;
            }
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        debug!(prefix = %prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }

    fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path("get", key)?;
        fs::read(&path).map_err(|e| map_io("get", key, e))
    }

    fn put(&self, key: &str, content: &[u8], _options: &CopyOptions) -> StorageResult<()> {
        let path = self.key_to_path("put", key)?;
        self.write_atomic("put", key, &path, content)
    }

    fn copy(&self, source: &str, dest: &str, _options: &CopyOptions) -> StorageResult<()> {
        let from = self.key_to_path("copy", source)?;
        let to = self.key_to_path("copy", dest)?;
        let content = fs::read(&from).map_err(|e| map_io("copy", source, e))?;
        self.write_atomic("copy", dest, &to, &content)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path("delete", key)?;
        fs::remove_file(&path).map_err(|e| map_io("delete", key, e))
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
