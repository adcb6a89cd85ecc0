//! FieldMap - the ordered key/value form between records and stored documents.
//!
//! A record fills a [`FieldMap`] with its fields; the map then becomes a store
//! document, and the reverse on the way back. Every value must be one of the
//! store primitives in [`Value`]. Anything else is rejected at the key where
//! it appears with [`OrmError::UnsupportedFieldType`].
//!
//! ## Example
//!
//! ```ignore
//! let mut map = FieldMap::new();
//! map.insert("email", &user.email)?;
//! map.insert("nickname", &user.nickname)?; // Option::None -> absent
//!
//! let email: String = map.value("email")?;
//! let nickname: Option<String> = map.optional("nickname")?;
//! ```

mod value;

use std::fmt;

use bson::Document;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{DecodeError, OrmError, OrmResult};
use crate::oid::ObjectId;

pub use value::Value;

/// Key under which every document stores its identifier.
pub const ID_KEY: &str = "_id";

/// Ordered map from field name to an optional store primitive.
///
/// Keys are unique and keep insertion order. A key set to `None` is *absent*:
/// it is remembered here but dropped from the store document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, Option<Value>)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Set a raw entry. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: Option<Value>) {
        let key = key.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set a primitive directly.
    pub fn insert_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.set(key, Some(value.into()));
    }

    /// Serialize `value` and store it under `key`.
    ///
    /// `None`/unit serialize to an absent entry. Fails with
    /// [`OrmError::UnsupportedFieldType`] if the serialized form is not a store
    /// primitive (for example a `u64` above `i64::MAX`, a map with non-string
    /// keys, or a regex).
    pub fn insert<V: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &V,
    ) -> OrmResult<()> {
        let key = key.into();
        let bson = bson::to_bson(value).map_err(|e| {
            tracing::debug!(key = %key, error = %e, "value is not a store primitive");
            OrmError::UnsupportedFieldType { key: key.clone() }
        })?;
        let value = Value::from_bson(&key, bson)?;
        self.set(key, value);
        Ok(())
    }

    /// Store a timestamp as the store's native datetime (millisecond
    /// precision). `None` is absent.
    ///
    /// [`insert`](Self::insert) would go through `chrono`'s serde impls and
    /// store RFC 3339 text instead.
    pub fn insert_datetime(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Option<DateTime<Utc>>>,
    ) {
        self.set(key, value.into().map(Value::DateTime));
    }

    /// Store an identifier under `_id`.
    pub fn insert_oid(&mut self, oid: ObjectId) {
        self.insert_value(ID_KEY, oid);
    }

    /// The value for `key`; `None` when missing or absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_ref())
    }

    /// True if `key` has an entry, absent or not.
    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// True if `key` has an entry whose value is absent.
    pub fn is_absent(&self, key: &str) -> bool {
        matches!(self.entries.iter().find(|(k, _)| k == key), Some((_, None)))
    }

    pub fn remove(&mut self, key: &str) -> Option<Option<Value>> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    /// Deserialize the value for `key`.
    ///
    /// Fails with [`DecodeError::MissingField`] if the key is missing or
    /// absent; use [`optional`](Self::optional) for fields that may be.
    pub fn value<T: DeserializeOwned>(&self, key: &str) -> Result<T, DecodeError> {
        match self.get(key) {
            Some(value) => decode_value(key, value),
            None => Err(DecodeError::MissingField {
                key: key.to_string(),
            }),
        }
    }

    /// Deserialize the value for `key`, treating missing and absent as `None`.
    pub fn optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DecodeError> {
        self.get(key).map(|value| decode_value(key, value)).transpose()
    }

    /// The identifier stored under `_id`.
    pub fn oid(&self) -> Result<ObjectId, DecodeError> {
        match self.get(ID_KEY) {
            None => Err(DecodeError::MissingObjectId),
            Some(Value::ObjectId(oid)) => Ok(*oid),
            Some(other) => Err(DecodeError::UnexpectedType {
                key: ID_KEY.to_string(),
                message: format!("expected objectId, found {}", other.kind()),
            }),
        }
    }

    /// A new map holding only `keys` that have a present value, in this
    /// map's order.
    pub fn select(&self, keys: &[&str]) -> FieldMap {
        self.entries
            .iter()
            .filter(|(k, v)| v.is_some() && keys.contains(&k.as_str()))
            .cloned()
            .collect()
    }

    /// Convert to the store's document form, dropping absent entries.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        for (key, value) in &self.entries {
            if let Some(value) = value {
                document.insert(key.clone(), value.clone().into_bson());
            }
        }
        document
    }

    /// Read a stored document. Never fails: kinds outside the primitive set
    /// degrade (see [`Value`]) so one odd field cannot hide a whole document.
    pub fn from_document(document: Document) -> FieldMap {
        document
            .into_iter()
            .map(|(key, bson)| (key, Value::from_stored_bson(bson)))
            .collect()
    }

    /// Relaxed extended JSON, for logs and debugging.
    pub fn to_json(&self) -> serde_json::Value {
        bson::Bson::Document(self.to_document()).into_relaxed_extjson()
    }
}

/// Native kinds first, so `bson::DateTime` fields read back as stored. Values
/// holding timestamps get a second try with RFC 3339 text, which is what
/// `chrono`'s serde impls expect.
fn decode_value<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T, DecodeError> {
    let unexpected = |e: bson::de::Error| DecodeError::UnexpectedType {
        key: key.to_string(),
        message: e.to_string(),
    };

    match bson::from_bson(value.clone().into_bson()) {
        Ok(decoded) => Ok(decoded),
        Err(_) if value.contains_datetime() => {
            bson::from_bson(value.clone().into_decodable_bson()).map_err(unexpected)
        }
        Err(e) => Err(unexpected(e)),
    }
}

impl fmt::Display for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl FromIterator<(String, Option<Value>)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (key, value) in iter {
            map.set(key, value);
        }
        map
    }
}

impl IntoIterator for FieldMap {
    type Item = (String, Option<Value>);
    type IntoIter = std::vec::IntoIter<(String, Option<Value>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl From<Document> for FieldMap {
    fn from(document: Document) -> Self {
        FieldMap::from_document(document)
    }
}
