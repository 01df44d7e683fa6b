use std::collections::HashSet;
use std::path::Path;

use crate::errors::StorageError;
use crate::value::{Storable, Value, RECORD_TYPE_KEY};

/// Backend-agnostic persistence for named values.
///
/// Values live under a two-level address: a `context` (a namespace, e.g. a
/// file or a table) and a `key` inside it. `initialize` must succeed before
/// any other call; implementations reject earlier calls with an
/// [`ErrorKind::Uninitialized`](crate::ErrorKind::Uninitialized) error.
///
/// Absence of data is never an error: missing contexts and keys surface as
/// `None`, `false` or an empty set.
pub trait StorageBackend: Send + Sync {
    /// Prepare the backend under `base_dir` (e.g. create directories).
    fn initialize(&self, base_dir: &Path) -> Result<(), StorageError>;

    /// Store `value` under `key`, creating the context if needed and
    /// replacing any previous value.
    fn save(&self, context: &str, key: &str, value: Value) -> Result<(), StorageError>;

    fn load(&self, context: &str, key: &str) -> Result<Option<Value>, StorageError>;

    fn exists(&self, context: &str, key: &str) -> Result<bool, StorageError>;

    /// Remove a context and everything in it. Missing contexts are ignored.
    fn delete(&self, context: &str) -> Result<(), StorageError>;

    /// Unset one key, leaving the rest of the context intact.
    fn delete_key(&self, context: &str, key: &str) -> Result<(), StorageError>;

    fn list_contexts(&self) -> Result<HashSet<String>, StorageError>;

    fn list_keys(&self, context: &str) -> Result<HashSet<String>, StorageError>;
}

/// Typed helpers available on every backend.
pub trait StorageBackendExt: StorageBackend {
    fn save_record<T: Storable>(&self, context: &str, key: &str, value: &T) -> Result<(), StorageError> {
        self.save(context, key, Value::record(value))
    }

    /// Load a record of type `T`; values of any other shape read as `None`.
    fn load_record<T: Storable>(&self, context: &str, key: &str) -> Result<Option<T>, StorageError> {
        match self.load(context, key)? {
            Some(value) => value.into_record(),
            None => Ok(None),
        }
    }
}

impl<B: StorageBackend + ?Sized> StorageBackendExt for B {}

/// Reject context identifiers that could escape the storage directory.
pub fn validate_context(context: &str) -> Result<(), StorageError> {
    if context.trim().is_empty() {
        return Err(StorageError::invalid_argument("context must not be empty"));
    }
    if context == "." || context == ".." {
        return Err(StorageError::invalid_argument(format!("context `{context}` is a directory reference")));
    }
    if context.chars().any(|c| c == '/' || c == '\\' || c == '\0') {
        return Err(StorageError::invalid_argument(format!(
            "context `{}` contains a path separator or NUL",
            context.escape_debug()
        )));
    }
    Ok(())
}

/// Keys must be non-empty and must not be the record marker; with a
/// separator, the same holds for every path segment.
pub fn validate_key(key: &str, separator: Option<char>) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::invalid_argument("key must not be empty"));
    }
    let mut segments: Box<dyn Iterator<Item = &str>> = match separator {
        Some(sep) => Box::new(key.split(sep)),
        None => Box::new(std::iter::once(key)),
    };
    if segments.any(|s| s == RECORD_TYPE_KEY) {
        return Err(StorageError::invalid_argument(format!("key `{key}` uses the reserved name `{RECORD_TYPE_KEY}`")));
    }
    if let Some(sep) = separator {
        if key.split(sep).any(str::is_empty) {
            return Err(StorageError::invalid_argument(format!("key `{key}` has an empty path segment")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn traversal_contexts_are_rejected() {
        for bad in ["", "  ", ".", "..", "../etc", "a/b", "a\\b", "nul\0byte", "/abs"] {
            let err = validate_context(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "context {bad:?}");
        }
    }

    #[test]
    fn ordinary_contexts_pass() {
        for ok in ["players", "warps.v2", "..hidden", "über", "a b"] {
            assert!(validate_context(ok).is_ok(), "context {ok:?}");
        }
    }

    #[test]
    fn key_segments() {
        assert!(validate_key("a.b", Some('.')).is_ok());
        assert!(validate_key("a..b", Some('.')).is_err());
        assert!(validate_key(".a", Some('.')).is_err());
        assert!(validate_key("a..b", None).is_ok());
        assert!(validate_key("", None).is_err());
    }

    #[test]
    fn record_marker_is_not_a_key() {
        for (key, sep) in [("==", None), ("==", Some('.')), ("home.==", Some('.')), ("==.x", Some('.'))] {
            let err = validate_key(key, sep).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "key {key:?}");
        }
        assert!(validate_key("a.==", None).is_ok());
        assert!(validate_key("===", Some('.')).is_ok());
    }
}
