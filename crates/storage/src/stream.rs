//! Stateless helpers for writing a single value to a stream or file.
//!
//! Every function takes the codec explicitly; nothing here holds state.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::codec::DocumentCodec;
use crate::errors::StorageError;
use crate::value::{Storable, Value};

pub fn save_to_writer<W: Write>(codec: &dyn DocumentCodec, value: &Value, mut writer: W) -> Result<(), StorageError> {
    let bytes = codec.encode(value)?;
    writer
        .write_all(&bytes)
        .and_then(|_| writer.flush())
        .map_err(|e| StorageError::io("failed to write value to stream", e))
}

pub fn load_from_reader<R: Read>(codec: &dyn DocumentCodec, mut reader: R) -> Result<Value, StorageError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| StorageError::io("failed to read value from stream", e))?;
    codec.decode(&bytes)
}

/// Read a record of type `T`.
///
/// A payload that is not a `T` record (another type, or a plain value) is
/// reported as `Ok(None)` rather than an error.
pub fn load_record_from_reader<T: Storable, R: Read>(
    codec: &dyn DocumentCodec,
    reader: R,
) -> Result<Option<T>, StorageError> {
    load_from_reader(codec, reader)?.into_record()
}

pub fn save_to_file(codec: &dyn DocumentCodec, value: &Value, path: impl AsRef<Path>) -> Result<(), StorageError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| StorageError::io(format!("failed to create {}", path.display()), e))?;
    save_to_writer(codec, value, BufWriter::new(file))
}

pub fn load_from_file(codec: &dyn DocumentCodec, path: impl AsRef<Path>) -> Result<Value, StorageError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| StorageError::io(format!("failed to open {}", path.display()), e))?;
    load_from_reader(codec, BufReader::new(file))
}
