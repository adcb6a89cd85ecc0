use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use bson::{Bson, Document};

use super::filter;
use crate::driver::{Collection, DriverError, InsertReply, Update, UpdateReply};
use crate::map::ID_KEY;
use crate::oid::ObjectId;

pub(crate) type Registry = Arc<RwLock<BTreeMap<String, MemoryCollection>>>;

/// In-memory collection: documents in insertion order behind a `RwLock`.
///
/// Clone-friendly via Arc; clones are handles to the same documents.
#[derive(Clone)]
pub struct MemoryCollection {
    name: String,
    documents: Arc<RwLock<Vec<Document>>>,
    rejected_write: Arc<Mutex<Option<Option<String>>>>,
    registry: Weak<RwLock<BTreeMap<String, MemoryCollection>>>,
}

impl MemoryCollection {
    pub(crate) fn new(name: &str, registry: &Registry) -> Self {
        Self {
            name: name.to_string(),
            documents: Arc::new(RwLock::new(Vec::new())),
            rejected_write: Arc::new(Mutex::new(None)),
            registry: Arc::downgrade(registry),
        }
    }

    /// Make the next write reply unsuccessfully, with or without a message.
    pub fn reject_next_write(&self, message: Option<&str>) {
        if let Ok(mut rejected) = self.rejected_write.lock() {
            *rejected = Some(message.map(str::to_string));
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored document, bypassing any filter.
    pub fn snapshot(&self) -> Vec<Document> {
        self.documents
            .read()
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    /// Insert raw documents without any checks. Used to seed legacy data.
    pub fn seed(&self, documents: impl IntoIterator<Item = Document>) -> Result<(), DriverError> {
        self.register()?;
        self.write_documents("seed")?.extend(documents);
        Ok(())
    }

    fn take_rejection(&self) -> Option<Option<String>> {
        self.rejected_write.lock().ok().and_then(|mut r| r.take())
    }

    /// Writes recreate a dropped collection.
    fn register(&self) -> Result<(), DriverError> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        let mut registry = registry
            .write()
            .map_err(|_| DriverError::LockPoisoned("collection registry"))?;
        registry
            .entry(self.name.clone())
            .or_insert_with(|| self.clone());
        Ok(())
    }

    fn read_documents(
        &self,
        operation: &'static str,
    ) -> Result<std::sync::RwLockReadGuard<'_, Vec<Document>>, DriverError> {
        self.documents
            .read()
            .map_err(|_| DriverError::LockPoisoned(operation))
    }

    fn write_documents(
        &self,
        operation: &'static str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Document>>, DriverError> {
        self.documents
            .write()
            .map_err(|_| DriverError::LockPoisoned(operation))
    }

    fn duplicate_key(&self, id: &Bson) -> String {
        format!(
            "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: {} }}",
            self.name, id
        )
    }
}

fn document_id(document: &Document) -> Option<&Bson> {
    document.get(ID_KEY)
}

/// Equality fields of a filter, used to seed an upserted document.
fn filter_equalities(filter: &Document) -> Document {
    filter
        .iter()
        .filter(|(k, v)| {
            !k.contains('.')
                && !matches!(v, Bson::Document(d) if d.keys().any(|k| k.starts_with('$')))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(
        &self,
        filter: Document,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>, DriverError> {
        let documents = self.read_documents("find")?;
        let limit = if limit == 0 { usize::MAX } else { limit as usize };
        Ok(documents
            .iter()
            .filter(|doc| filter::matches(doc, &filter))
            .skip(skip as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>, DriverError> {
        let documents = self.read_documents("find_one")?;
        Ok(documents
            .iter()
            .find(|doc| filter::matches(doc, &filter))
            .cloned())
    }

    async fn insert(&self, documents: Vec<Document>) -> Result<InsertReply, DriverError> {
        if let Some(message) = self.take_rejection() {
            return Ok(InsertReply::failure(message));
        }

        self.register()?;
        let mut stored = self.write_documents("insert")?;

        let mut batch = Vec::with_capacity(documents.len());
        let mut identifiers = Vec::with_capacity(documents.len());
        for mut document in documents {
            let id = match document_id(&document) {
                Some(id) => id.clone(),
                None => {
                    let oid = ObjectId::new();
                    document.insert(ID_KEY, oid);
                    Bson::from(oid)
                }
            };

            let taken = stored
                .iter()
                .chain(batch.iter())
                .any(|existing| document_id(existing) == Some(&id));
            if taken {
                return Ok(InsertReply::failure(Some(self.duplicate_key(&id))));
            }

            if let Bson::ObjectId(oid) = &id {
                identifiers.push(ObjectId::from(*oid));
            }
            batch.push(document);
        }

        stored.extend(batch);
        Ok(InsertReply::success(identifiers))
    }

    async fn update(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
    ) -> Result<UpdateReply, DriverError> {
        if let Some(message) = self.take_rejection() {
            return Ok(UpdateReply {
                successful: false,
                error_message: message,
                ..UpdateReply::default()
            });
        }

        self.register()?;
        let mut stored = self.write_documents("update")?;

        if let Some(existing) = stored.iter_mut().find(|doc| filter::matches(doc, &filter)) {
            let before = existing.clone();
            match update {
                Update::Replace(replacement) => {
                    let mut next = Document::new();
                    if let Some(id) = document_id(existing) {
                        next.insert(ID_KEY, id.clone());
                    }
                    for (key, value) in replacement {
                        if key != ID_KEY {
                            next.insert(key, value);
                        }
                    }
                    *existing = next;
                }
                Update::Set { set, unset } => {
                    for (key, value) in set {
                        if key != ID_KEY {
                            existing.insert(key, value);
                        }
                    }
                    for key in unset.iter().filter(|k| k.as_str() != ID_KEY) {
                        existing.remove(key);
                    }
                }
            }

            return Ok(UpdateReply {
                matched_count: 1,
                modified_count: u64::from(*existing != before),
                upserted_id: None,
                successful: true,
                error_message: None,
            });
        }

        if !upsert {
            return Ok(UpdateReply {
                successful: true,
                ..UpdateReply::default()
            });
        }

        let mut inserted = filter_equalities(&filter);
        let fields = match update {
            Update::Replace(doc) | Update::Set { set: doc, .. } => doc,
        };
        for (key, value) in fields {
            inserted.insert(key, value);
        }
        let id = match document_id(&inserted) {
            Some(Bson::ObjectId(oid)) => ObjectId::from(*oid),
            Some(_) => {
                return Ok(UpdateReply {
                    successful: false,
                    error_message: Some("upsert requires an objectId _id".into()),
                    ..UpdateReply::default()
                })
            }
            None => {
                let oid = ObjectId::new();
                inserted.insert(ID_KEY, oid);
                oid
            }
        };
        stored.push(inserted);

        Ok(UpdateReply {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
            successful: true,
            error_message: None,
        })
    }

    async fn remove(&self, filter: Document, limit: u64) -> Result<u64, DriverError> {
        let mut stored = self.write_documents("remove")?;
        let limit = if limit == 0 { usize::MAX } else { limit as usize };

        let mut removed = 0usize;
        stored.retain(|doc| {
            if removed < limit && filter::matches(doc, &filter) {
                removed += 1;
                false
            } else {
                true
            }
        });

        Ok(removed as u64)
    }

    async fn count(&self, filter: Document) -> Result<u64, DriverError> {
        let documents = self.read_documents("count")?;
        Ok(documents
            .iter()
            .filter(|doc| filter::matches(doc, &filter))
            .count() as u64)
    }

    async fn drop_collection(&self) -> Result<(), DriverError> {
        self.write_documents("drop")?.clear();
        if let Some(registry) = self.registry.upgrade() {
            registry
                .write()
                .map_err(|_| DriverError::LockPoisoned("collection registry"))?
                .remove(&self.name);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("name", &self.name)
            .field("document_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn collection() -> MemoryCollection {
        MemoryCollection::new("users", &Registry::default())
    }

    #[tokio::test]
    async fn insert_assigns_missing_ids() {
        let users = collection();
        let reply = users.insert(vec![doc! { "email": "a@x.com" }]).await.unwrap();
        assert!(reply.successful);
        assert_eq!(reply.identifiers.len(), 1);

        let stored = users.find_one(doc! {}).await.unwrap().unwrap();
        assert_eq!(
            ObjectId::from(stored.get_object_id("_id").unwrap()),
            reply.identifiers[0]
        );
    }

    #[tokio::test]
    async fn duplicate_id_rejects_whole_batch() {
        let users = collection();
        let oid = ObjectId::new();
        users.insert(vec![doc! { "_id": oid }]).await.unwrap();

        let reply = users
            .insert(vec![doc! { "_id": ObjectId::new() }, doc! { "_id": oid }])
            .await
            .unwrap();
        assert!(!reply.successful);
        assert!(reply.error_message.unwrap().contains("duplicate key"));
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn find_honours_skip_and_limit() {
        let users = collection();
        let docs = (0..5).map(|i| doc! { "n": i }).collect();
        users.insert(docs).await.unwrap();

        let page = users.find(doc! {}, 1, 2).await.unwrap();
        let ns: Vec<i32> = page.iter().map(|d| d.get_i32("n").unwrap()).collect();
        assert_eq!(ns, vec![1, 2]);

        assert_eq!(users.find(doc! {}, 0, 0).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn set_touches_only_given_fields() {
        let users = collection();
        let oid = ObjectId::new();
        users
            .insert(vec![doc! { "_id": oid, "email": "a@x.com", "password": "p1" }])
            .await
            .unwrap();

        let reply = users
            .update(
                doc! { "_id": oid },
                Update::set(doc! { "password": "p2" }),
                false,
            )
            .await
            .unwrap();
        assert_eq!(reply.matched_count, 1);
        assert_eq!(reply.modified_count, 1);

        let stored = users.find_one(doc! { "_id": oid }).await.unwrap().unwrap();
        assert_eq!(stored, doc! { "_id": oid, "email": "a@x.com", "password": "p2" });
    }

    #[tokio::test]
    async fn set_removes_unset_fields() {
        let users = collection();
        let oid = ObjectId::new();
        users
            .insert(vec![doc! { "_id": oid, "email": "a@x.com", "nickname": "al" }])
            .await
            .unwrap();

        let reply = users
            .update(
                doc! { "_id": oid },
                Update::Set {
                    set: doc! { "email": "b@x.com" },
                    unset: vec!["nickname".into(), ID_KEY.into(), "missing".into()],
                },
                false,
            )
            .await
            .unwrap();
        assert_eq!(reply.modified_count, 1);

        let stored = users.find_one(doc! { "_id": oid }).await.unwrap().unwrap();
        assert_eq!(stored, doc! { "_id": oid, "email": "b@x.com" });
    }

    #[tokio::test]
    async fn replace_keeps_id_and_drops_other_fields() {
        let users = collection();
        let oid = ObjectId::new();
        users
            .insert(vec![doc! { "_id": oid, "email": "a@x.com", "legacy": true }])
            .await
            .unwrap();

        users
            .update(
                doc! { "_id": oid },
                Update::Replace(doc! { "email": "b@x.com" }),
                false,
            )
            .await
            .unwrap();

        let stored = users.find_one(doc! {}).await.unwrap().unwrap();
        assert_eq!(stored, doc! { "_id": oid, "email": "b@x.com" });
    }

    #[tokio::test]
    async fn update_without_match() {
        let users = collection();
        let oid = ObjectId::new();

        let reply = users
            .update(doc! { "_id": oid }, Update::Replace(doc! { "n": 1 }), false)
            .await
            .unwrap();
        assert!(reply.successful);
        assert_eq!(reply.matched_count, 0);
        assert!(users.is_empty());

        let reply = users
            .update(doc! { "_id": oid }, Update::Replace(doc! { "n": 1 }), true)
            .await
            .unwrap();
        assert_eq!(reply.upserted_id, Some(oid));
        assert_eq!(users.snapshot(), vec![doc! { "_id": oid, "n": 1 }]);
    }

    #[tokio::test]
    async fn remove_respects_limit() {
        let users = collection();
        users
            .insert(vec![doc! { "k": 1 }, doc! { "k": 1 }, doc! { "k": 2 }])
            .await
            .unwrap();

        assert_eq!(users.remove(doc! { "k": 1 }, 1).await.unwrap(), 1);
        assert_eq!(users.count(doc! { "k": 1 }).await.unwrap(), 1);
        assert_eq!(users.remove(doc! {}, 0).await.unwrap(), 2);
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn rejected_write_is_reported_once() {
        let users = collection();
        users.reject_next_write(None);

        let reply = users.insert(vec![doc! { "n": 1 }]).await.unwrap();
        assert!(!reply.successful);
        assert_eq!(reply.error_message, None);
        assert!(users.is_empty());

        let reply = users.insert(vec![doc! { "n": 1 }]).await.unwrap();
        assert!(reply.successful);
    }
}
