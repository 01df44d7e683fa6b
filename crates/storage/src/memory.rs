use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::backend::{validate_context, validate_key, StorageBackend};
use crate::document::Document;
use crate::errors::StorageError;
use crate::value::Value;

/// In-memory [`StorageBackend`] for tests and embedding.
///
/// Follows the same contract as the file store, including the
/// uninitialized-use check; the directory passed to `initialize` is ignored.
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    initialized: AtomicBool,
    key_separator: Option<char>,
    contexts: DashMap<String, Document>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_separator(mut self, separator: Option<char>) -> Self {
        self.key_separator = separator;
        self
    }

    fn ensure_initialized(&self) -> Result<(), StorageError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::uninitialized("MemoryContextStore"))
        }
    }

    fn check(&self, context: &str, key: Option<&str>) -> Result<(), StorageError> {
        self.ensure_initialized()?;
        validate_context(context)?;
        if let Some(key) = key {
            validate_key(key, self.key_separator)?;
        }
        Ok(())
    }
}

impl StorageBackend for MemoryContextStore {
    fn initialize(&self, _base_dir: &Path) -> Result<(), StorageError> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn save(&self, context: &str, key: &str, value: Value) -> Result<(), StorageError> {
        self.check(context, Some(key))?;
        value.validate()?;
        self.contexts
            .entry(context.to_string())
            .or_insert_with(|| Document::new(self.key_separator))
            .set(key, value);
        Ok(())
    }

    fn load(&self, context: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.check(context, Some(key))?;
        Ok(self.contexts.get(context).and_then(|doc| doc.get(key).cloned()))
    }

    fn exists(&self, context: &str, key: &str) -> Result<bool, StorageError> {
        self.check(context, Some(key))?;
        Ok(self.contexts.get(context).is_some_and(|doc| doc.contains(key)))
    }

    fn delete(&self, context: &str) -> Result<(), StorageError> {
        self.check(context, None)?;
        self.contexts.remove(context);
        Ok(())
    }

    fn delete_key(&self, context: &str, key: &str) -> Result<(), StorageError> {
        self.check(context, Some(key))?;
        if let Some(mut doc) = self.contexts.get_mut(context) {
            doc.remove(key);
        }
        Ok(())
    }

    fn list_contexts(&self) -> Result<HashSet<String>, StorageError> {
        self.ensure_initialized()?;
        Ok(self.contexts.iter().map(|e| e.key().clone()).collect())
    }

    fn list_keys(&self, context: &str) -> Result<HashSet<String>, StorageError> {
        self.check(context, None)?;
        Ok(self.contexts.get(context).map(|doc| doc.keys()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emptied_context_is_still_listed() -> Result<(), anyhow::Error> {
        let store = MemoryContextStore::new();
        store.initialize(Path::new("unused"))?;
        store.save("c", "k", Value::from(1))?;
        store.delete_key("c", "k")?;

        // same as an emptied document on disk: the context remains until deleted
        assert!(store.list_contexts()?.contains("c"));
        assert!(store.list_keys("c")?.is_empty());
        Ok(())
    }
}
