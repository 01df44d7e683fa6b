use std::collections::HashSet;
use std::fmt;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::fs;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::backend::{validate_context, validate_key, StorageBackend};
use crate::codec::{DocumentCodec, JsonCodec};
use crate::document::Document;
use crate::errors::StorageError;
use crate::value::Value;

pub const DEFAULT_STORAGE_DIR_NAME: &str = "storage";

/// File-backed [`StorageBackend`]: one document per context.
///
/// Context `c` lives in `<data_folder>/<storage_dir_name>/<c>.<ext>`, where the
/// extension comes from the configured codec. Nothing is cached between
/// calls, so external edits to a document are visible on the next operation.
/// Mutations of one context are serialized by a per-context lock; different
/// contexts proceed in parallel.
pub struct FileContextStore {
    storage_dir_name: String,
    codec: Arc<dyn DocumentCodec>,
    key_separator: Option<char>,
    base_dir: RwLock<Option<PathBuf>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Default for FileContextStore {
    fn default() -> Self {
        Self {
            storage_dir_name: DEFAULT_STORAGE_DIR_NAME.to_string(),
            codec: Arc::new(JsonCodec),
            key_separator: None,
            base_dir: RwLock::new(None),
            locks: DashMap::new(),
        }
    }
}

impl fmt::Debug for FileContextStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileContextStore")
            .field("storage_dir_name", &self.storage_dir_name)
            .field("codec", &self.codec.name())
            .field("key_separator", &self.key_separator)
            .field("base_dir", &*self.base_dir.read())
            .finish()
    }
}

impl FileContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the sub-directory created under the data folder. Defaults to `"storage"`.
    pub fn with_storage_dir_name(mut self, name: impl Into<String>) -> Self {
        self.storage_dir_name = name.into();
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn DocumentCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Treat keys as paths into nested mappings, split on `separator`.
    pub fn with_key_separator(mut self, separator: Option<char>) -> Self {
        self.key_separator = separator;
        self
    }

    pub fn storage_dir_name(&self) -> &str {
        &self.storage_dir_name
    }

    pub fn codec(&self) -> &dyn DocumentCodec {
        self.codec.as_ref()
    }

    /// Resolved storage directory, once initialized.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.base_dir.read().clone()
    }

    fn require_base_dir(&self) -> Result<PathBuf, StorageError> {
        self.base_dir
            .read()
            .clone()
            .ok_or_else(|| StorageError::uninitialized("FileContextStore"))
    }

    fn context_path(&self, context: &str) -> Result<PathBuf, StorageError> {
        let base = self.require_base_dir()?;
        validate_context(context)?;
        Ok(base.join(format!("{context}.{}", self.codec.extension())))
    }

    fn context_lock(&self, context: &str) -> Arc<Mutex<()>> {
        self.locks.entry(context.to_string()).or_default().clone()
    }

    fn read_document(&self, path: &Path) -> Result<Option<Document>, StorageError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(format!("failed to read {}", path.display()), e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Some(Document::new(self.key_separator)));
        }
        let value = self.codec.decode(&bytes)?;
        Document::from_value(value, self.key_separator).map(Some)
    }

    /// Replace the document on disk; the new content is written next to it
    /// and renamed over the old file.
    fn write_document(&self, path: &Path, doc: &Document) -> Result<(), StorageError> {
        let bytes = self.codec.encode(&doc.to_value())?;
        let tmp = path.with_extension(format!("{}.tmp", self.codec.extension()));
        fs::write(&tmp, bytes).map_err(|e| StorageError::io(format!("failed to write {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(StorageError::io(format!("failed to replace {}", path.display()), e));
        }
        Ok(())
    }
}

impl StorageBackend for FileContextStore {
    fn initialize(&self, data_folder: &Path) -> Result<(), StorageError> {
        let base = data_folder.join(&self.storage_dir_name);
        fs::create_dir_all(&base)
            .map_err(|e| StorageError::io(format!("cannot create storage directory {}", base.display()), e))?;
        let previous = self.base_dir.write().replace(base.clone());
        if let Some(prev) = previous.filter(|p| p != &base) {
            warn!(event = "reinitialize", old = %prev.display(), new = %base.display(), "storage directory changed");
        }
        info!(event = "initialize", path = %base.display(), codec = self.codec.name(), "file storage ready");
        Ok(())
    }

    fn save(&self, context: &str, key: &str, value: Value) -> Result<(), StorageError> {
        let path = self.context_path(context)?;
        validate_key(key, self.key_separator)?;
        value.validate()?;

        let lock = self.context_lock(context);
        let _guard = lock.lock();
        let mut doc = self.read_document(&path)?.unwrap_or_else(|| Document::new(self.key_separator));
        doc.set(key, value);
        self.write_document(&path, &doc)?;
        debug!(event = "save", context, key, path = %path.display(), "value saved");
        Ok(())
    }

    fn load(&self, context: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.context_path(context)?;
        validate_key(key, self.key_separator)?;
        Ok(self.read_document(&path)?.and_then(|doc| doc.get(key).cloned()))
    }

    fn exists(&self, context: &str, key: &str) -> Result<bool, StorageError> {
        let path = self.context_path(context)?;
        validate_key(key, self.key_separator)?;
        Ok(self.read_document(&path)?.is_some_and(|doc| doc.contains(key)))
    }

    fn delete(&self, context: &str) -> Result<(), StorageError> {
        let path = self.context_path(context)?;
        let lock = self.context_lock(context);
        let _guard = lock.lock();
        let result = match fs::remove_file(&path) {
            Ok(()) => {
                info!(event = "delete_context", context, path = %path.display(), "context removed");
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(format!("failed to remove {}", path.display()), e)),
        };
        // Drop the registry entry unless another caller holds a clone of it
        // (one reference is the registry, one is `lock`).
        self.locks.remove_if(context, |_, l| Arc::strong_count(l) <= 2);
        result
    }

    fn delete_key(&self, context: &str, key: &str) -> Result<(), StorageError> {
        let path = self.context_path(context)?;
        validate_key(key, self.key_separator)?;

        let lock = self.context_lock(context);
        let _guard = lock.lock();
        let Some(mut doc) = self.read_document(&path)? else {
            return Ok(());
        };
        if doc.remove(key).is_some() {
            self.write_document(&path, &doc)?;
            debug!(event = "delete_key", context, key, "key removed");
        }
        Ok(())
    }

    fn list_contexts(&self) -> Result<HashSet<String>, StorageError> {
        let base = self.require_base_dir()?;
        let entries = match fs::read_dir(&base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                warn!(event = "list_contexts", path = %base.display(), "storage directory missing");
                return Ok(HashSet::new());
            }
            Err(e) => return Err(StorageError::io(format!("failed to list {}", base.display()), e)),
        };

        let suffix = format!(".{}", self.codec.extension());
        let mut contexts = HashSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(format!("failed to list {}", base.display()), e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| StorageError::io(format!("failed to stat {}", entry.path().display()), e))?
                .is_file();
            if !is_file {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some(context) = name.strip_suffix(&suffix).filter(|c| validate_context(c).is_ok()) {
                contexts.insert(context.to_string());
            }
        }
        Ok(contexts)
    }

    fn list_keys(&self, context: &str) -> Result<HashSet<String>, StorageError> {
        let path = self.context_path(context)?;
        Ok(self.read_document(&path)?.map(|doc| doc.keys()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TomlCodec;
    use crate::errors::ErrorKind;
    use uuid::Uuid;

    fn temp_data_folder() -> PathBuf {
        std::env::temp_dir().join(format!("file_context_store_{}", Uuid::new_v4()))
    }

    #[test]
    fn initialize_creates_storage_directory() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new();
        assert!(store.base_dir().is_none());

        store.initialize(&tmp)?;
        let base = store.base_dir().expect("base dir set");
        assert_eq!(base, tmp.join("storage"));
        assert!(base.is_dir());

        // calling again is harmless
        store.initialize(&tmp)?;

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn documents_are_named_after_contexts() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new().with_storage_dir_name("data");
        store.initialize(&tmp)?;
        store.save("players", "alice", Value::from(42))?;

        let file = tmp.join("data").join("players.json");
        assert!(file.is_file());
        let on_disk: serde_json::Value = serde_json::from_slice(&fs::read(&file)?)?;
        assert_eq!(on_disk, serde_json::json!({"alice": 42}));

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn external_edits_are_visible() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new();
        store.initialize(&tmp)?;
        store.save("warps", "spawn", Value::from("0,64,0"))?;

        let file = tmp.join("storage").join("warps.json");
        fs::write(&file, br#"{"spawn": "1,70,1", "mine": "5,12,9"}"#)?;

        assert_eq!(store.load("warps", "spawn")?, Some(Value::from("1,70,1")));
        assert!(store.exists("warps", "mine")?);

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn malformed_document_is_an_encoding_error() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new();
        store.initialize(&tmp)?;
        fs::write(tmp.join("storage").join("broken.json"), b"{ nope")?;

        let err = store.load("broken", "k").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        let err = store.save("broken", "k", Value::from(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn empty_file_reads_as_empty_context() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new();
        store.initialize(&tmp)?;
        fs::write(tmp.join("storage").join("blank.json"), b"\n")?;

        assert!(store.list_keys("blank")?.is_empty());
        assert_eq!(store.load("blank", "k")?, None);
        assert!(store.list_contexts()?.contains("blank"));

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn listing_ignores_foreign_files_and_directories() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new();
        store.initialize(&tmp)?;
        store.save("a", "k", Value::from(true))?;
        let base = tmp.join("storage");
        fs::write(base.join("notes.txt"), b"x")?;
        fs::create_dir(base.join("nested.json"))?;

        assert_eq!(store.list_contexts()?, HashSet::from(["a".to_string()]));

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn listing_skips_names_that_are_not_valid_contexts() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new();
        store.initialize(&tmp)?;
        store.save("kept", "k", Value::from(1))?;
        let base = tmp.join("storage");
        fs::write(base.join(" .json"), b"{}")?;
        fs::write(base.join("..json"), b"{}")?;
        fs::write(base.join(".json"), b"{}")?;

        let contexts = store.list_contexts()?;
        assert_eq!(contexts, HashSet::from(["kept".to_string()]));
        for context in &contexts {
            assert!(store.list_keys(context).is_ok());
        }

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn null_entries_written_externally_read_as_unset() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new();
        store.initialize(&tmp)?;
        let file = tmp.join("storage").join("c.json");
        fs::write(&file, br#"{"a": 1, "b": null}"#)?;

        assert_eq!(store.load("c", "a")?, Some(Value::from(1)));
        assert_eq!(store.load("c", "b")?, None);
        assert!(!store.exists("c", "b")?);
        assert_eq!(store.list_keys("c")?, HashSet::from(["a".to_string()]));

        store.save("c", "x", Value::from(2))?;
        let on_disk: serde_json::Value = serde_json::from_slice(&fs::read(&file)?)?;
        assert_eq!(on_disk, serde_json::json!({"a": 1, "x": 2}));

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn deleted_contexts_release_their_locks() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new();
        store.initialize(&tmp)?;
        for i in 0..100 {
            let context = format!("session{i}");
            store.save(&context, "k", Value::from(i))?;
            store.delete(&context)?;
        }
        store.delete("never-created")?;
        assert_eq!(store.locks.len(), 0);

        store.save("live", "k", Value::from(1))?;
        assert_eq!(store.locks.len(), 1);

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn record_marker_key_is_rejected_and_context_stays_usable() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new();
        store.initialize(&tmp)?;
        store.save("c", "other", Value::from(1))?;

        let err = store.save("c", "==", Value::from("x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_eq!(store.load("c", "other")?, Some(Value::from(1)));
        store.save("c", "again", Value::from(2))?;
        assert_eq!(store.list_keys("c")?, HashSet::from(["other".to_string(), "again".to_string()]));

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn toml_codec_uses_its_own_extension() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new().with_codec(Arc::new(TomlCodec));
        store.initialize(&tmp)?;
        store.save("settings", "volume", Value::from(7))?;

        assert!(tmp.join("storage").join("settings.toml").is_file());
        assert_eq!(store.load("settings", "volume")?, Some(Value::from(7)));
        assert_eq!(store.list_contexts()?, HashSet::from(["settings".to_string()]));

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn dotted_keys_nest_in_the_document() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new().with_key_separator(Some('.'));
        store.initialize(&tmp)?;
        store.save("players", "alice.score", Value::from(10))?;
        store.save("players", "alice.rank", Value::from("gold"))?;

        assert_eq!(store.list_keys("players")?, HashSet::from(["alice".to_string()]));
        assert_eq!(store.load("players", "alice.score")?, Some(Value::from(10)));
        let on_disk: serde_json::Value =
            serde_json::from_slice(&fs::read(tmp.join("storage").join("players.json"))?)?;
        assert_eq!(on_disk, serde_json::json!({"alice": {"rank": "gold", "score": 10}}));

        store.delete_key("players", "alice.score")?;
        assert!(!store.exists("players", "alice.score")?);
        assert!(store.exists("players", "alice.rank")?);

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }

    #[test]
    fn unrepresentable_value_leaves_document_untouched() -> Result<(), anyhow::Error> {
        let tmp = temp_data_folder();
        let store = FileContextStore::new();
        store.initialize(&tmp)?;
        store.save("stats", "ok", Value::from(1.5))?;

        let err = store.save("stats", "bad", Value::Float(f64::INFINITY)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert_eq!(store.list_keys("stats")?, HashSet::from(["ok".to_string()]));

        let _ = fs::remove_dir_all(&tmp);
        Ok(())
    }
}
