use bson::spec::BinarySubtype;
use bson::Bson;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use super::FieldMap;
use crate::error::OrmError;
use crate::oid::ObjectId;

/// A store primitive. The closed set of kinds a [`FieldMap`] may hold;
/// absence is modelled as `Option<Value>` rather than a variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Boolean(bool),
    Binary(Vec<u8>),
    ObjectId(ObjectId),
    DateTime(DateTime<Utc>),
    Map(FieldMap),
    /// Absent elements keep their position.
    Array(Vec<Option<Value>>),
}

impl Value {
    /// Name of the kind, for error messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::Binary(_) => "binary",
            Value::ObjectId(_) => "objectId",
            Value::DateTime(_) => "datetime",
            Value::Map(_) => "map",
            Value::Array(_) => "array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::Int32(n) => Some(f64::from(*n)),
            Value::Int64(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<ObjectId> {
        match self {
            Value::ObjectId(oid) => Some(*oid),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Strict conversion used while encoding. `key` is the dotted path used in
    /// the error when `bson` holds a kind outside the primitive set.
    pub(crate) fn from_bson(key: &str, bson: Bson) -> Result<Option<Value>, OrmError> {
        let unsupported = || OrmError::UnsupportedFieldType {
            key: key.to_string(),
        };

        let value = match bson {
            Bson::Null | Bson::Undefined => return Ok(None),
            Bson::String(s) => Value::String(s),
            Bson::Int32(n) => Value::Int32(n),
            Bson::Int64(n) => Value::Int64(n),
            Bson::Double(n) => Value::Double(n),
            Bson::Boolean(b) => Value::Boolean(b),
            Bson::Binary(binary) => Value::Binary(binary.bytes),
            Bson::ObjectId(oid) => Value::ObjectId(oid.into()),
            Bson::DateTime(dt) => Value::DateTime(
                Utc.timestamp_millis_opt(dt.timestamp_millis())
                    .single()
                    .ok_or_else(unsupported)?,
            ),
            Bson::Document(doc) => {
                let mut map = FieldMap::with_capacity(doc.len());
                for (k, v) in doc {
                    let path = format!("{}.{}", key, k);
                    let value = Value::from_bson(&path, v)?;
                    map.set(k, value);
                }
                Value::Map(map)
            }
            Bson::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let path = format!("{}.{}", key, i);
                    values.push(Value::from_bson(&path, item)?);
                }
                Value::Array(values)
            }
            _ => return Err(unsupported()),
        };

        Ok(Some(value))
    }

    /// Lenient conversion used when reading stored documents. Kinds outside
    /// the primitive set degrade instead of failing.
    pub(crate) fn from_stored_bson(bson: Bson) -> Option<Value> {
        let value = match bson {
            Bson::Null | Bson::Undefined | Bson::MinKey | Bson::MaxKey => return None,
            Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::String(s),
            Bson::JavaScriptCodeWithScope(code) => Value::String(code.code),
            Bson::RegularExpression(regex) => {
                Value::String(format!("/{}/{}", regex.pattern, regex.options))
            }
            Bson::Decimal128(d) => Value::String(format!("{:?}", d)),
            Bson::Timestamp(ts) => {
                Value::Int64((i64::from(ts.time) << 32) | i64::from(ts.increment))
            }
            Bson::Int32(n) => Value::Int32(n),
            Bson::Int64(n) => Value::Int64(n),
            Bson::Double(n) => Value::Double(n),
            Bson::Boolean(b) => Value::Boolean(b),
            Bson::Binary(binary) => Value::Binary(binary.bytes),
            Bson::ObjectId(oid) => Value::ObjectId(oid.into()),
            Bson::DateTime(dt) => match Utc.timestamp_millis_opt(dt.timestamp_millis()).single() {
                Some(dt) => Value::DateTime(dt),
                None => Value::Int64(dt.timestamp_millis()),
            },
            Bson::Document(doc) => Value::Map(FieldMap::from_document(doc)),
            Bson::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_stored_bson).collect())
            }
            _ => return None,
        };

        Some(value)
    }

    pub(crate) fn into_bson(self) -> Bson {
        match self {
            Value::String(s) => Bson::String(s),
            Value::Int32(n) => Bson::Int32(n),
            Value::Int64(n) => Bson::Int64(n),
            Value::Double(n) => Bson::Double(n),
            Value::Boolean(b) => Bson::Boolean(b),
            Value::Binary(bytes) => Bson::Binary(bson::Binary {
                subtype: BinarySubtype::Generic,
                bytes,
            }),
            Value::ObjectId(oid) => oid.into(),
            Value::DateTime(dt) => {
                Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis()))
            }
            Value::Map(map) => Bson::Document(map.to_document()),
            Value::Array(items) => Bson::Array(
                items
                    .into_iter()
                    .map(|item| item.map_or(Bson::Null, Value::into_bson))
                    .collect(),
            ),
        }
    }

    /// True if this value is, or nests, a timestamp.
    pub(crate) fn contains_datetime(&self) -> bool {
        match self {
            Value::DateTime(_) => true,
            Value::Map(map) => map.iter().any(|(_, v)| v.is_some_and(Value::contains_datetime)),
            Value::Array(items) => items.iter().flatten().any(Value::contains_datetime),
            _ => false,
        }
    }

    /// Like [`into_bson`](Self::into_bson) but with timestamps as RFC 3339
    /// text, which is what `chrono`'s serde impls read.
    pub(crate) fn into_decodable_bson(self) -> Bson {
        match self {
            Value::DateTime(dt) => Bson::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Map(map) => {
                let mut doc = bson::Document::new();
                for (key, value) in map {
                    if let Some(value) = value {
                        doc.insert(key, value.into_decodable_bson());
                    }
                }
                Bson::Document(doc)
            }
            Value::Array(items) => Bson::Array(
                items
                    .into_iter()
                    .map(|item| item.map_or(Bson::Null, Value::into_decodable_bson))
                    .collect(),
            ),
            other => other.into_bson(),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Binary(bytes)
    }
}

impl From<ObjectId> for Value {
    fn from(oid: ObjectId) -> Self {
        Value::ObjectId(oid)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<FieldMap> for Value {
    fn from(map: FieldMap) -> Self {
        Value::Map(map)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items.into_iter().map(Some).collect())
    }
}
