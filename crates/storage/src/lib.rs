//! Backend-agnostic storage of named values.
//! - `StorageBackend` is the contract callers program against.
//! - `FileContextStore` keeps one document per context on disk.
//! - `MemoryContextStore` implements the same contract in memory.
//! - `stream` offers codec-parameterized helpers for single values.

pub mod backend;
pub mod codec;
pub mod document;
pub mod errors;
pub mod file_store;
pub mod memory;
pub mod stream;
pub mod value;

pub use backend::{validate_context, validate_key, StorageBackend, StorageBackendExt};
pub use codec::{codec_for, DocumentCodec, JsonCodec, TomlCodec};
pub use errors::{ErrorKind, StorageError};
pub use file_store::{FileContextStore, DEFAULT_STORAGE_DIR_NAME};
pub use memory::MemoryContextStore;
pub use value::{Record, Storable, Value, RECORD_TYPE_KEY};
