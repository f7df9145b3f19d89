//! In-memory object store.
//!
//! Used by tests and dry runs. Counts mutating calls and can be told to
//! fail specific operations.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use super::{Acl, CopyOptions, ObjectStore, StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredObject {
    content: Vec<u8>,
    acl: Acl,
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    fail_copy_sources: RwLock<HashSet<String>>,
    fail_deletes: RwLock<HashSet<String>>,
    puts: AtomicUsize,
    copies: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with objects.
    pub fn with_objects<K, V>(objects: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let store = Self::new();
        for (key, content) in objects {
            store.insert(key, content);
        }
        store
    }

    /// Insert an object without counting it as a put.
    pub fn insert(&self, key: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.into(),
                StoredObject {
                    content: content.into(),
                    acl: Acl::Private,
                },
            );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Current content of an object, if present.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|o| o.content.clone())
    }

    /// ACL recorded with an object, if present.
    pub fn acl(&self, key: &str) -> Option<Acl> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|o| o.acl)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Number of successful puts.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of successful copies.
    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    /// Number of successful deletes.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Puts plus copies.
    pub fn writes(&self) -> usize {
        self.puts() + self.copies()
    }

    /// Make every copy whose source is `key` fail.
    pub fn fail_copy_from(&self, key: impl Into<String>) {
        self.fail_copy_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into());
    }

    /// Make every delete of `key` fail.
    pub fn fail_delete(&self, key: impl Into<String>) {
        self.fail_deletes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into());
    }

    fn injected(set: &RwLock<HashSet<String>>, key: &str) -> bool {
        set.read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl ObjectStore for MemoryStore {
    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.object(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })
    }

    fn put(&self, key: &str, content: &[u8], options: &CopyOptions) -> StorageResult<()> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                StoredObject {
                    content: content.to_vec(),
                    acl: options.acl,
                },
            );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn copy(&self, source: &str, dest: &str, options: &CopyOptions) -> StorageResult<()> {
        if Self::injected(&self.fail_copy_sources, source) {
            return Err(StorageError::backend("copy", source, "injected failure"));
        }
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let content = objects
            .get(source)
            .map(|o| o.content.clone())
            .ok_or_else(|| StorageError::NotFound {
                key: source.to_string(),
            })?;
        objects.insert(
            dest.to_string(),
            StoredObject {
                content,
                acl: options.acl,
            },
        );
        self.copies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        if Self::injected(&self.fail_deletes, key) {
            return Err(StorageError::backend("delete", key, "injected failure"));
        }
        let removed = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match removed {
            Some(_) => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_not_counted() {
        let store = MemoryStore::with_objects([("a", "1"), ("b", "2")]);
        assert_eq!(store.keys(), vec!["a", "b"]);
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn test_copy_records_acl_and_counts() {
        let store = MemoryStore::with_objects([("src", "x")]);
        store.copy("src", "dst", &CopyOptions::public_read()).unwrap();
        assert_eq!(store.object("dst").unwrap(), b"x");
        assert_eq!(store.acl("dst"), Some(Acl::PublicRead));
        assert_eq!(store.copies(), 1);
    }

    #[test]
    fn test_copy_missing_source_is_not_counted() {
        let store = MemoryStore::new();
        let err = store.copy("src", "dst", &CopyOptions::default()).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.copies(), 0);
    }

    #[test]
    fn test_injected_copy_failure() {
        let store = MemoryStore::with_objects([("src", "x")]);
        store.fail_copy_from("src");
        let err = store.copy("src", "dst", &CopyOptions::default()).unwrap_err();
        assert!(matches!(err, StorageError::Backend { op: "copy", .. }));
        assert!(!store.contains("dst"));
    }

    #[test]
    fn test_injected_delete_failure() {
        let store = MemoryStore::with_objects([("a", "x")]);
        store.fail_delete("a");
        assert!(store.delete("a").is_err());
        assert!(store.contains("a"));
        assert_eq!(store.deletes(), 0);
    }

    #[test]
    fn test_list_prefix() {
        let store = MemoryStore::with_objects([("darwin/a", "1"), ("darwinx", "2"), ("linux/a", "3")]);
        assert_eq!(store.list("darwin/").unwrap(), vec!["darwin/a"]);
    }

    #[test]
    fn test_works_through_reference() {
        fn write_through<S: ObjectStore>(store: S) {
            store.put("k", b"v", &CopyOptions::default()).unwrap();
        }

        let store = MemoryStore::new();
        write_through(&store);
        assert_eq!(store.puts(), 1);
    }
}
