use std::collections::{BTreeMap, HashSet};

use crate::errors::{ErrorKind, StorageError};
use crate::value::Value;

/// In-memory form of one context document.
///
/// With a key separator configured, keys address nested mappings
/// (`"home.world"` → `{"home": {"world": ..}}`); otherwise keys are opaque.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: BTreeMap<String, Value>,
    separator: Option<char>,
}

impl Document {
    pub fn new(separator: Option<char>) -> Self {
        Self { entries: BTreeMap::new(), separator }
    }

    /// Wrap a decoded document value. The top level must be a mapping.
    pub fn from_value(value: Value, separator: Option<char>) -> Result<Self, StorageError> {
        match value {
            Value::Mapping(entries) => Ok(Self { entries, separator }),
            other => Err(StorageError::new(
                ErrorKind::Encoding,
                format!("document root must be a mapping, found {}", other.type_label()),
            )),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Mapping(self.entries.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = self.split(key);
        let first = parts.next()?;
        let mut current = self.entries.get(first)?;
        for part in parts {
            current = current.as_mapping()?.get(part)?;
        }
        Some(current)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key`, replacing any scalar that sits where an intermediate mapping is needed.
    pub fn set(&mut self, key: &str, value: Value) {
        let parts: Vec<&str> = self.split(key).collect();
        let Some((last, parents)) = parts.split_last() else {
            return;
        };
        let mut map = &mut self.entries;
        for part in parents {
            let slot = map.entry((*part).to_string()).or_insert_with(|| Value::Mapping(BTreeMap::new()));
            if slot.as_mapping().is_none() {
                *slot = Value::Mapping(BTreeMap::new());
            }
            map = match slot {
                Value::Mapping(m) => m,
                _ => return,
            };
        }
        map.insert((*last).to_string(), value);
    }

    /// Unset `key`; mappings left empty by the removal are pruned.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let parts: Vec<&str> = self.split(key).collect();
        remove_path(&mut self.entries, &parts)
    }

    /// Top-level keys only; nested structure is not flattened.
    pub fn keys(&self) -> HashSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn split<'k>(&self, key: &'k str) -> Box<dyn Iterator<Item = &'k str> + 'k> {
        match self.separator {
            Some(sep) => Box::new(key.split(sep)),
            None => Box::new(std::iter::once(key)),
        }
    }
}

fn remove_path(map: &mut BTreeMap<String, Value>, parts: &[&str]) -> Option<Value> {
    match parts {
        [] => None,
        [leaf] => map.remove(*leaf),
        [head, rest @ ..] => {
            let child = map.get_mut(*head)?.as_mapping_mut()?;
            let removed = remove_path(child, rest);
            if removed.is_some() && child.is_empty() {
                map.remove(*head);
            }
            removed
        }
    }
}
