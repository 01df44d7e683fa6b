//! Closed value model for everything a context document can hold.
//!
//! The store never interprets values; it only round-trips them through the
//! configured [`DocumentCodec`](crate::codec::DocumentCodec). Self-describing
//! types implement [`Storable`] and are persisted as a [`Record`]: a mapping
//! tagged with the reserved [`RECORD_TYPE_KEY`] entry.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{ErrorKind, StorageError};

/// Marker key identifying a serialized [`Record`] inside a mapping.
pub const RECORD_TYPE_KEY: &str = "==";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(BTreeMap<String, Value>),
    Record(Record),
}

/// A value produced by a [`Storable`] type: a type tag plus named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

/// Encode/decode pair for a self-describing type.
pub trait Storable: Sized {
    /// Tag written next to the fields; must be unique per type.
    const TYPE_NAME: &'static str;

    fn to_fields(&self) -> BTreeMap<String, Value>;

    fn from_fields(fields: &BTreeMap<String, Value>) -> Result<Self, StorageError>;
}

impl Record {
    pub fn new(type_name: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self { type_name: type_name.into(), fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field lookup that reports a missing field as an encoding error.
    pub fn require(&self, field: &str) -> Result<&Value, StorageError> {
        self.fields.get(field).ok_or_else(|| {
            StorageError::encoding(
                format!("record `{}` is missing field `{field}`", self.type_name),
                "missing field",
            )
        })
    }
}

impl Value {
    pub fn record<T: Storable>(value: &T) -> Self {
        Value::Record(Record::new(T::TYPE_NAME, value.to_fields()))
    }

    /// Decode a record of type `T`.
    ///
    /// Returns `Ok(None)` when the value is not a record or is a record of
    /// another type, so callers can treat unknown payloads as absent.
    pub fn into_record<T: Storable>(&self) -> Result<Option<T>, StorageError> {
        match self {
            Value::Record(r) if r.type_name == T::TYPE_NAME => T::from_fields(&r.fields).map(Some),
            _ => Ok(None),
        }
    }

    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::Record(_) => "record",
        }
    }

    /// Reject values that would read back in a different shape: a mapping or
    /// record using [`RECORD_TYPE_KEY`] as an ordinary key.
    pub fn validate(&self) -> Result<(), StorageError> {
        match self {
            Value::Sequence(items) => items.iter().try_for_each(Value::validate),
            Value::Mapping(m) => {
                if m.contains_key(RECORD_TYPE_KEY) {
                    return Err(StorageError::new(
                        ErrorKind::Encoding,
                        format!("mapping uses the reserved key `{RECORD_TYPE_KEY}`"),
                    ));
                }
                m.values().try_for_each(Value::validate)
            }
            Value::Record(r) => {
                if r.fields.contains_key(RECORD_TYPE_KEY) {
                    return Err(StorageError::new(
                        ErrorKind::Encoding,
                        format!("record `{}` uses the reserved field name `{RECORD_TYPE_KEY}`", r.type_name),
                    ));
                }
                r.fields.values().try_for_each(Value::validate)
            }
            _ => Ok(()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats here, mirroring how numeric documents are read back.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "<{}>", self.type_label()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self { Value::Integer(i64::from(v)) }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(v: BTreeMap<String, T>) -> Self {
        Value::Mapping(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(v: HashMap<String, T>) -> Self {
        Value::Mapping(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Sequence(items) => serializer.collect_seq(items),
            Value::Mapping(m) => serializer.collect_map(m),
            Value::Record(r) => {
                let mut map = serializer.serialize_map(Some(r.fields.len() + 1))?;
                map.serialize_entry(RECORD_TYPE_KEY, &r.type_name)?;
                for (k, v) in &r.fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean, number, string, sequence or mapping")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(match i64::try_from(v) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Float(v as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Err(E::invalid_type(de::Unexpected::Unit, &self))
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Err(E::invalid_type(de::Unexpected::Option, &self))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut entries = BTreeMap::new();
        // null entries read as unset keys
        while let Some((k, v)) = map.next_entry::<String, Option<Value>>()? {
            if let Some(v) = v {
                entries.insert(k, v);
            }
        }
        match entries.remove(RECORD_TYPE_KEY) {
            Some(Value::String(type_name)) => Ok(Value::Record(Record { type_name, fields: entries })),
            Some(other) => {
                entries.insert(RECORD_TYPE_KEY.to_string(), other);
                Ok(Value::Mapping(entries))
            }
            None => Ok(Value::Mapping(entries)),
        }
    }
}
