//! Document encodings.
//!
//! A codec turns a [`Value`] into bytes and back. The file store uses the
//! codec's extension to name context documents, so every codec must own a
//! distinct extension.

use std::sync::Arc;

use crate::errors::{ErrorKind, StorageError};
use crate::value::Value;

pub trait DocumentCodec: Send + Sync {
    /// Short identifier used in configuration (`"json"`, `"toml"`).
    fn name(&self) -> &'static str;

    /// File extension without the leading dot.
    fn extension(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, StorageError>;

    fn decode(&self, bytes: &[u8]) -> Result<Value, StorageError>;
}

/// Pretty-printed JSON. JSON is a subset of YAML 1.2, so documents stay
/// readable by YAML tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl DocumentCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, StorageError> {
        check_representable(value, false)?;
        let mut bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StorageError::encoding("failed to encode JSON document", e))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::encoding("failed to parse JSON document", e))
    }
}

/// TOML documents. Only mappings can be encoded at the top level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlCodec;

impl DocumentCodec for TomlCodec {
    fn name(&self) -> &'static str {
        "toml"
    }

    fn extension(&self) -> &'static str {
        "toml"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, StorageError> {
        check_representable(value, true)?;
        if !matches!(value, Value::Mapping(_) | Value::Record(_)) {
            return Err(StorageError::new(
                ErrorKind::Encoding,
                format!("TOML documents must be mappings, got {}", value.type_label()),
            ));
        }
        let text = toml::to_string_pretty(value)
            .map_err(|e| StorageError::encoding("failed to encode TOML document", e))?;
        Ok(text.into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, StorageError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::encoding("TOML document is not valid UTF-8", e))?;
        toml::from_str(text).map_err(|e| StorageError::encoding("failed to parse TOML document", e))
    }
}

/// Resolve a codec by its configuration name.
pub fn codec_for(name: &str) -> Result<Arc<dyn DocumentCodec>, StorageError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(Arc::new(JsonCodec)),
        "toml" => Ok(Arc::new(TomlCodec)),
        other => Err(StorageError::invalid_argument(format!("unknown document format `{other}`"))),
    }
}

fn check_representable(value: &Value, allow_non_finite: bool) -> Result<(), StorageError> {
    value.validate()?;
    if allow_non_finite {
        Ok(())
    } else {
        check_finite(value)
    }
}

fn check_finite(value: &Value) -> Result<(), StorageError> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(StorageError::new(
            ErrorKind::Encoding,
            format!("non-finite float {f} cannot be represented"),
        )),
        Value::Sequence(items) => items.iter().try_for_each(check_finite),
        Value::Mapping(m) => m.values().try_for_each(check_finite),
        Value::Record(r) => r.fields.values().try_for_each(check_finite),
        _ => Ok(()),
    }
}
