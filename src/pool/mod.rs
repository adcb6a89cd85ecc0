//! Connection pool - one database handle per store address.
//!
//! The first caller for an address opens the connection; everyone racing it
//! waits on the same `OnceCell` and gets the same handle. A failed connect
//! leaves the cell empty so a later call can retry.

mod address;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::driver::{Collection, Connector, Database, DriverError};
use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::repository::Repository;

pub use address::Address;

type Slot<D> = Arc<OnceCell<D>>;

/// Process-scoped cache of database handles, keyed by normalized [`Address`].
///
/// Clones share the cache. Handles live until the last clone is dropped;
/// there is no explicit close.
pub struct ConnectionPool<K: Connector> {
    inner: Arc<PoolInner<K>>,
}

struct PoolInner<K: Connector> {
    connector: K,
    databases: Mutex<HashMap<String, Slot<K::Database>>>,
}

impl<K: Connector> Clone for ConnectionPool<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Connector> ConnectionPool<K> {
    pub fn new(connector: K) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                databases: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn connector(&self) -> &K {
        &self.inner.connector
    }

    /// The cached handle for `address`, connecting on first use.
    pub async fn database(&self, address: &Address) -> OrmResult<K::Database> {
        let slot = {
            let mut databases = self
                .inner
                .databases
                .lock()
                .map_err(|_| OrmError::LockPoisoned("connection pool"))?;
            Arc::clone(databases.entry(address.connection_string()).or_default())
        };

        let database = slot
            .get_or_try_init(|| async {
                debug!(address = %address, "opening store connection");
                self.inner.connector.connect(address).await
            })
            .await?;
        Ok(database.clone())
    }

    /// Resolve a collection by exact name, creating it when missing.
    pub async fn collection(
        &self,
        address: &Address,
        name: &str,
    ) -> OrmResult<<K::Database as Database>::Collection> {
        let database = self.database(address).await?;
        get_collection(&database, name).await
    }

    /// Repository for `T` on the configured store, under the configured prefix.
    pub async fn repository<T: Model>(
        &self,
        config: &StoreConfig,
    ) -> OrmResult<Repository<T, <K::Database as Database>::Collection>> {
        let name = config.collection_name(T::COLLECTION);
        self.repository_named(&config.address, &name).await
    }

    /// Repository for `T` bound to an explicitly named collection.
    pub async fn repository_named<T: Model>(
        &self,
        address: &Address,
        name: &str,
    ) -> OrmResult<Repository<T, <K::Database as Database>::Collection>> {
        let collection = self.collection(address, name).await?;
        Ok(Repository::new(collection))
    }

    /// Number of addresses with an established handle.
    pub fn connection_count(&self) -> usize {
        self.inner
            .databases
            .lock()
            .map(|databases| databases.values().filter(|slot| slot.initialized()).count())
            .unwrap_or(0)
    }
}

impl<K: Connector> std::fmt::Debug for ConnectionPool<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.connection_count())
            .finish()
    }
}

/// List the database's collections and return the one called `name`, or
/// create it. Losing a creation race to another caller is not an error.
pub async fn get_collection<D: Database>(database: &D, name: &str) -> OrmResult<D::Collection> {
    if let Some(existing) = find_named(database, name).await? {
        return Ok(existing);
    }

    warn!(
        database = database.name(),
        collection = name,
        "collection missing; creating it"
    );
    match database.create_collection(name).await {
        Ok(created) => Ok(created),
        Err(DriverError::CollectionExists(_)) => find_named(database, name)
            .await?
            .ok_or_else(|| DriverError::CollectionExists(name.to_string()).into()),
        Err(err) => Err(err.into()),
    }
}

async fn find_named<D: Database>(database: &D, name: &str) -> OrmResult<Option<D::Collection>> {
    let collections = database.list_collections().await?;
    Ok(collections.into_iter().find(|c| c.name() == name))
}
