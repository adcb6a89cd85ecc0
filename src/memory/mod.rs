//! In-memory driver - a process-local document store for tests and embedding.
//!
//! Databases are keyed by the normalized connection string, so two pools
//! built from the same [`MemoryConnector`] see the same data.

mod collection;
mod filter;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::driver::{Connector, Database, DriverError};
use crate::pool::Address;

pub use collection::MemoryCollection;
use collection::Registry;

/// Opens [`MemoryDatabase`]s. Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    databases: Arc<Mutex<HashMap<String, MemoryDatabase>>>,
    refused: Arc<Mutex<HashSet<String>>>,
    connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times [`Connector::connect`] has been called.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make every later connect to `address` fail.
    pub fn refuse(&self, address: &Address) {
        if let Ok(mut refused) = self.refused.lock() {
            refused.insert(address.connection_string());
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Database = MemoryDatabase;

    async fn connect(&self, address: &Address) -> Result<MemoryDatabase, DriverError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let key = address.connection_string();

        let refused = self
            .refused
            .lock()
            .map_err(|_| DriverError::LockPoisoned("connect"))?
            .contains(&key);
        if refused {
            return Err(DriverError::Connect {
                address: address.to_string(),
                reason: "connection refused".into(),
            });
        }

        let mut databases = self
            .databases
            .lock()
            .map_err(|_| DriverError::LockPoisoned("connect"))?;
        let database = databases
            .entry(key)
            .or_insert_with(|| MemoryDatabase::new(address.database()));
        Ok(database.clone())
    }
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("connects", &self.connect_count())
            .finish()
    }
}

/// A named database holding [`MemoryCollection`]s.
#[derive(Clone)]
pub struct MemoryDatabase {
    name: String,
    collections: Registry,
}

impl MemoryDatabase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            collections: Registry::default(),
        }
    }

    /// Handle to an existing collection, without creating it.
    pub fn collection(&self, name: &str) -> Option<MemoryCollection> {
        self.collections
            .read()
            .ok()
            .and_then(|collections| collections.get(name).cloned())
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections
            .read()
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    type Collection = MemoryCollection;

    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collections(&self) -> Result<Vec<MemoryCollection>, DriverError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| DriverError::LockPoisoned("list_collections"))?;
        Ok(collections.values().cloned().collect())
    }

    async fn create_collection(&self, name: &str) -> Result<MemoryCollection, DriverError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| DriverError::LockPoisoned("create_collection"))?;
        if collections.contains_key(name) {
            return Err(DriverError::CollectionExists(name.to_string()));
        }

        let collection = MemoryCollection::new(name, &self.collections);
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("name", &self.name)
            .field("collections", &self.collection_names())
            .finish()
    }
}
