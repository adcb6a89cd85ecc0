//! Repository - typed CRUD over one collection.
//!
//! A `Repository<T, C>` binds the record type `T` to the collection handle
//! `C`. It holds no per-record state, so one instance can serve any number of
//! concurrent callers. Every write runs the record's [`Lifecycle`] hooks:
//! `will_save` before anything is encoded or sent, `did_save` after the store
//! confirmed the write.

mod find_result;

use std::marker::PhantomData;

use bson::Document;
use tracing::{debug, trace, warn};

use crate::codec;
use crate::driver::{Collection, Connector, Database, Update, UpdateReply};
use crate::error::{OrmError, OrmResult};
use crate::map::{FieldMap, ID_KEY};
use crate::model::Model;
use crate::oid::ObjectId;
use crate::pool::{Address, ConnectionPool};

pub use find_result::FindResult;

/// Typed repository for records of type `T` stored in collection `C`.
pub struct Repository<T, C> {
    collection: C,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C: Clone> Clone for Repository<T, C> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Model, C: Collection> Repository<T, C> {
    pub fn new(collection: C) -> Self {
        Self {
            collection,
            _marker: PhantomData,
        }
    }

    /// Resolve `name` on `address` through the pool, creating it if needed.
    pub async fn connect<K>(
        pool: &ConnectionPool<K>,
        address: &Address,
        name: &str,
    ) -> OrmResult<Self>
    where
        K: Connector,
        K::Database: Database<Collection = C>,
    {
        pool.repository_named(address, name).await
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub fn name(&self) -> &str {
        self.collection.name()
    }

    // ---- writes ----
    //
    // Writes borrow the record mutably. Hook changes, a generated identifier
    // and `did_save` land on the caller's value, and the record is still in
    // hand when the write fails.

    /// Insert a new record. An identifier is generated when the record has none;
    /// a pre-assigned one is kept.
    pub async fn insert(&self, record: &mut T) -> OrmResult<()> {
        record.will_save().map_err(OrmError::Hook)?;
        assign_oid(record);
        let document = codec::encode_document(record)?;

        debug!(collection = self.name(), document = %json(&document), "insert");
        let reply = self.collection.insert(vec![document]).await?;
        trace!(collection = self.name(), ?reply, "insert reply");
        if !reply.successful {
            return Err(OrmError::SaveFailed {
                message: reply.error_message,
            });
        }

        record.did_save();
        Ok(())
    }

    /// Insert a batch in one store call. Every `will_save` runs first; if any
    /// fails nothing is sent.
    pub async fn insert_many(&self, records: &mut [T]) -> OrmResult<()> {
        for record in records.iter_mut() {
            record.will_save().map_err(OrmError::Hook)?;
        }
        if records.is_empty() {
            return Ok(());
        }

        let mut documents = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            assign_oid(record);
            documents.push(codec::encode_document(record)?);
        }

        debug!(collection = self.name(), count = documents.len(), "insert_many");
        let reply = self.collection.insert(documents).await?;
        trace!(collection = self.name(), ?reply, "insert_many reply");
        if !reply.successful {
            return Err(OrmError::SaveFailed {
                message: reply.error_message,
            });
        }

        for record in records.iter_mut() {
            record.did_save();
        }
        Ok(())
    }

    /// Replace the document with the record's identifier, or insert it.
    pub async fn upsert(&self, record: &mut T) -> OrmResult<()> {
        record.will_save().map_err(OrmError::Hook)?;
        let oid = assign_oid(record);
        let document = codec::encode_document(record)?;

        self.write(oid, Update::Replace(document), true).await?;
        record.did_save();
        Ok(())
    }

    /// Replace the stored document. Fails with `NotFound` when nothing has the
    /// record's identifier.
    pub async fn update(&self, record: &mut T) -> OrmResult<()> {
        let oid = record.oid().ok_or(OrmError::MissingIdentifier)?;
        record.will_save().map_err(OrmError::Hook)?;
        let document = codec::encode_document(record)?;

        let reply = self.write(oid, Update::Replace(document), false).await?;
        if reply.matched_count == 0 {
            return Err(OrmError::not_found(self.name()));
        }
        record.did_save();
        Ok(())
    }

    /// Write only `fields` to the stored document; every other stored field
    /// stays as it is. A listed field whose value is absent (`None`) is
    /// removed from the stored document.
    ///
    /// Fields outside `fields` are not re-read, so the record may differ from
    /// the store; use [`reload`](Self::reload) to fetch the stored state.
    pub async fn update_fields(&self, record: &mut T, fields: &[&str]) -> OrmResult<()> {
        let oid = record.oid().ok_or(OrmError::MissingIdentifier)?;
        record.will_save().map_err(OrmError::Hook)?;
        let encoded = codec::encode(record)?;
        let set = codec::to_store_document(&encoded.select(fields));
        let unset = fields
            .iter()
            .filter(|key| **key != ID_KEY && encoded.is_absent(key))
            .map(|key| key.to_string())
            .collect();

        let reply = self.write(oid, Update::Set { set, unset }, false).await?;
        if reply.matched_count == 0 {
            return Err(OrmError::not_found(self.name()));
        }
        record.did_save();
        Ok(())
    }

    async fn write(&self, oid: ObjectId, update: Update, upsert: bool) -> OrmResult<UpdateReply> {
        let filter = by_oid(oid);
        debug!(
            collection = self.name(),
            filter = %json(&filter),
            upsert,
            partial = matches!(update, Update::Set { .. }),
            "update"
        );

        let reply = self.collection.update(filter, update, upsert).await?;
        trace!(collection = self.name(), ?reply, "update reply");
        if !reply.successful {
            return Err(OrmError::SaveFailed {
                message: reply.error_message,
            });
        }
        Ok(reply)
    }

    // ---- reads ----

    /// The first matching record, or `None`. Zero matches is not an error.
    pub async fn first(&self, filter: Document) -> OrmResult<Option<T>> {
        debug!(collection = self.name(), filter = %json(&filter), "find_one");
        let Some(document) = self.collection.find_one(filter).await? else {
            return Ok(None);
        };

        let map = codec::from_store_document(document);
        Ok(Some(codec::decode(&map)?))
    }

    /// The first matching record. Zero matches fails with `NotFound`.
    pub async fn required(&self, filter: Document) -> OrmResult<T> {
        self.first(filter)
            .await?
            .ok_or_else(|| OrmError::not_found(self.name()))
    }

    pub async fn required_oid(&self, oid: ObjectId) -> OrmResult<T> {
        self.required(by_oid(oid)).await
    }

    /// Look up by hex identifier. A malformed id fails before any I/O.
    pub async fn required_id(&self, id: &str) -> OrmResult<T> {
        self.required_oid(ObjectId::parse(id)?).await
    }

    /// Every matching document, decoded one by one. A document that does not
    /// decode goes to `failures` with its raw map; the rest still decode.
    pub async fn find(&self, filter: Document, skip: u64, limit: u64) -> OrmResult<FindResult<T>> {
        let maps = self.maps(filter, skip, limit).await?;

        let mut result = FindResult::new();
        for map in maps {
            match codec::decode::<T>(&map) {
                Ok(record) => result.successes.push(record),
                Err(error) => {
                    warn!(
                        collection = self.name(),
                        id = ?map.get(ID_KEY),
                        %error,
                        "skipping document that failed to decode"
                    );
                    result.failures.push((map, error));
                }
            }
        }
        Ok(result)
    }

    /// `find` with no filter.
    pub async fn all(&self, skip: u64, limit: u64) -> OrmResult<FindResult<T>> {
        self.find(Document::new(), skip, limit).await
    }

    /// Matching documents as undecoded field maps.
    pub async fn maps(&self, filter: Document, skip: u64, limit: u64) -> OrmResult<Vec<FieldMap>> {
        debug!(collection = self.name(), filter = %json(&filter), skip, limit, "find");
        let documents = self.collection.find(filter, skip, limit).await?;
        trace!(collection = self.name(), count = documents.len(), "find reply");
        Ok(documents
            .into_iter()
            .map(codec::from_store_document)
            .collect())
    }

    /// Fetch the stored state of `record`.
    pub async fn reload(&self, record: &T) -> OrmResult<T> {
        let oid = record.oid().ok_or(OrmError::MissingIdentifier)?;
        self.required_oid(oid).await
    }

    pub async fn count(&self, filter: Document) -> OrmResult<u64> {
        debug!(collection = self.name(), filter = %json(&filter), "count");
        Ok(self.collection.count(filter).await?)
    }

    pub async fn exists(&self, filter: Document) -> OrmResult<bool> {
        Ok(self.count(filter).await? > 0)
    }

    pub async fn exists_oid(&self, oid: ObjectId) -> OrmResult<bool> {
        self.exists(by_oid(oid)).await
    }

    pub async fn exists_id(&self, id: &str) -> OrmResult<bool> {
        self.exists_oid(ObjectId::parse(id)?).await
    }

    // ---- deletes ----

    /// Delete the stored document of a persisted record.
    pub async fn destroy(&self, record: &T) -> OrmResult<()> {
        let oid = record.oid().ok_or(OrmError::MissingIdentifier)?;
        self.destroy_oid(oid).await
    }

    /// Delete by identifier. Fails with `NotFound` when nothing was removed.
    pub async fn destroy_oid(&self, oid: ObjectId) -> OrmResult<()> {
        let filter = by_oid(oid);
        debug!(collection = self.name(), filter = %json(&filter), "remove");
        let removed = self.collection.remove(filter, 1).await?;
        trace!(collection = self.name(), removed, "remove reply");
        if removed == 0 {
            return Err(OrmError::not_found(self.name()));
        }
        Ok(())
    }

    pub async fn destroy_id(&self, id: &str) -> OrmResult<()> {
        self.destroy_oid(ObjectId::parse(id)?).await
    }

    /// Drop the whole collection.
    pub async fn drop_collection(&self) -> OrmResult<()> {
        debug!(collection = self.name(), "drop");
        Ok(self.collection.drop_collection().await?)
    }
}

impl<T, C: Collection> std::fmt::Debug for Repository<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &self.collection.name())
            .field("model", &std::any::type_name::<T>())
            .finish()
    }
}

fn assign_oid<T: Model>(record: &mut T) -> ObjectId {
    match record.oid() {
        Some(oid) => oid,
        None => {
            let oid = ObjectId::new();
            record.set_oid(oid);
            oid
        }
    }
}

fn by_oid(oid: ObjectId) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_KEY, oid);
    filter
}

fn json(document: &Document) -> serde_json::Value {
    bson::Bson::Document(document.clone()).into_relaxed_extjson()
}
