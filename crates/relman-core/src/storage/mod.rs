//! Object storage backends.
//!
//! Release artifacts and update manifests live in a flat keyspace
//! ("bucket") addressed by `/`-separated keys. The promotion engine only
//! needs five operations, captured by [`ObjectStore`].

pub mod filesystem;
pub mod memory;

use thiserror::Error;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

/// Errors returned by object stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The key does not exist
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Any other backend failure
    #[error("{op} {key} failed: {reason}")]
    Backend {
        op: &'static str,
        key: String,
        reason: String,
    },
}

impl StorageError {
    pub fn backend(op: &'static str, key: &str, reason: impl ToString) -> Self {
        Self::Backend {
            op,
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Access control applied to written objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acl {
    #[default]
    Private,
    PublicRead,
}

/// Options for writes and copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyOptions {
    pub acl: Acl,
}

impl CopyOptions {
    /// Options for objects served to end users.
    pub fn public_read() -> Self {
        Self {
            acl: Acl::PublicRead,
        }
    }
}

/// Storage backend trait
pub trait ObjectStore: Send + Sync {
    /// List every key starting with `prefix`, sorted ascending
    fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Retrieve content by key
    fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Store content under the given key, replacing any existing object
    fn put(&self, key: &str, content: &[u8], options: &CopyOptions) -> StorageResult<()>;

    /// Copy one object to another key within the store
    fn copy(&self, source: &str, dest: &str, options: &CopyOptions) -> StorageResult<()>;

    /// Delete content by key
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Human readable location, for logs
    fn describe(&self) -> String;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        (**self).list(prefix)
    }

    fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, content: &[u8], options: &CopyOptions) -> StorageResult<()> {
        (**self).put(key, content, options)
    }

    fn copy(&self, source: &str, dest: &str, options: &CopyOptions) -> StorageResult<()> {
        (**self).copy(source, dest, options)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        (**self).list(prefix)
    }

    fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, content: &[u8], options: &CopyOptions) -> StorageResult<()> {
        (**self).put(key, content, options)
    }

    fn copy(&self, source: &str, dest: &str, options: &CopyOptions) -> StorageResult<()> {
        (**self).copy(source, dest, options)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
