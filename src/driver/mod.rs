//! Driver - the document-store client this crate sits on top of.
//!
//! The repository never talks to the network itself. It speaks to a store
//! through three handles:
//!
//! - [`Connector`] opens a [`Database`] for an [`Address`]
//! - [`Database`] lists and creates [`Collection`]s
//! - [`Collection`] runs find/insert/update/remove/count against one collection
//!
//! Documents and filters cross this boundary as [`bson::Document`], the only
//! place the store's native representation appears. Timeouts, retries and
//! cancellation belong to the implementation; whatever it reports comes back
//! as a [`DriverError`] untouched.

use async_trait::async_trait;
use bson::Document;

use crate::oid::ObjectId;
use crate::pool::Address;

/// Errors reported by a store driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("store operation timed out: {0}")]
    Timeout(String),

    #[error("store operation cancelled")]
    Cancelled,

    #[error("store command failed: {0}")]
    Command(String),

    #[error("store collection `{0}` already exists")]
    CollectionExists(String),

    #[error("store driver lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

/// Reply to an insert of one or more documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertReply {
    /// Identifiers of the inserted documents, in input order.
    pub identifiers: Vec<ObjectId>,
    pub successful: bool,
    pub error_message: Option<String>,
}

impl InsertReply {
    pub fn success(identifiers: Vec<ObjectId>) -> Self {
        Self {
            identifiers,
            successful: true,
            error_message: None,
        }
    }

    pub fn failure(error_message: Option<String>) -> Self {
        Self {
            identifiers: Vec::new(),
            successful: false,
            error_message,
        }
    }
}

/// Reply to an update or upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReply {
    pub matched_count: u64,
    pub modified_count: u64,
    /// Set when an upsert inserted instead of replacing.
    pub upserted_id: Option<ObjectId>,
    pub successful: bool,
    pub error_message: Option<String>,
}

/// What an update writes into the matched document.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Replace the whole document (the `_id` is kept).
    Replace(Document),
    /// Set the top-level fields in `set` and remove the keys in `unset`.
    /// Every other field is left untouched.
    Set { set: Document, unset: Vec<String> },
}

impl Update {
    /// A partial update that only sets fields.
    pub fn set(fields: Document) -> Self {
        Update::Set {
            set: fields,
            unset: Vec::new(),
        }
    }
}

/// Opens database handles. One call per address; the
/// [`ConnectionPool`](crate::ConnectionPool) caches the result.
#[async_trait]
pub trait Connector: Send + Sync {
    type Database: Database;

    async fn connect(&self, address: &Address) -> Result<Self::Database, DriverError>;
}

/// A connected database.
#[async_trait]
pub trait Database: Clone + Send + Sync + 'static {
    type Collection: Collection;

    fn name(&self) -> &str;

    async fn list_collections(&self) -> Result<Vec<Self::Collection>, DriverError>;

    async fn create_collection(&self, name: &str) -> Result<Self::Collection, DriverError>;
}

/// A handle to one store-resident collection.
#[async_trait]
pub trait Collection: Clone + Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Matching documents in store order. A `limit` of 0 means unlimited.
    async fn find(
        &self,
        filter: Document,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>, DriverError>;

    async fn find_one(&self, filter: Document) -> Result<Option<Document>, DriverError>;

    async fn insert(&self, documents: Vec<Document>) -> Result<InsertReply, DriverError>;

    async fn update(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
    ) -> Result<UpdateReply, DriverError>;

    /// Removes up to `limit` matching documents (0 = all) and returns how many went.
    async fn remove(&self, filter: Document, limit: u64) -> Result<u64, DriverError>;

    async fn count(&self, filter: Document) -> Result<u64, DriverError>;

    async fn drop_collection(&self) -> Result<(), DriverError>;
}
