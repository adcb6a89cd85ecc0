//! Codec - record <-> field map <-> store document.

use bson::Document;

use crate::error::{DecodeError, OrmResult};
use crate::map::FieldMap;
use crate::model::{MapDecodable, Model};

/// Encode a record. The identifier (if any) comes first under `_id`, then the
/// record's own fields in the order it writes them.
pub fn encode<T: Model>(record: &T) -> OrmResult<FieldMap> {
    let mut map = FieldMap::new();
    if let Some(oid) = record.oid() {
        map.insert_oid(oid);
    }
    record.fill(&mut map)?;
    Ok(map)
}

/// Decode a record, surfacing the type's own construction error.
pub fn decode<T: MapDecodable>(map: &FieldMap) -> Result<T, DecodeError> {
    T::from_map(map)
}

/// Absent entries are dropped; the store never sees an explicit null from here.
pub fn to_store_document(map: &FieldMap) -> Document {
    map.to_document()
}

pub fn from_store_document(document: Document) -> FieldMap {
    FieldMap::from_document(document)
}

/// Encode straight to a store document.
pub fn encode_document<T: Model>(record: &T) -> OrmResult<Document> {
    encode(record).map(|map| to_store_document(&map))
}
