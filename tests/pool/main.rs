//! Integration tests for the connection pool and store configuration.

use odm_rust::{
    doc, ConnectionPool, Database, HookError, Lifecycle, MemoryConnector, Model, ObjectId,
    OrmError, Repository, StoreConfig,
};

#[derive(Clone, Debug, Model)]
struct Order {
    oid: Option<ObjectId>,
    total: i64,
}

impl Lifecycle for Order {
    fn will_save(&mut self) -> Result<(), HookError> {
        if self.total < 0 {
            return Err("total must not be negative".into());
        }
        Ok(())
    }

    fn did_save(&mut self) {}
}

fn config(text: &str) -> StoreConfig {
    StoreConfig::from_toml_str(text).unwrap()
}

#[tokio::test]
async fn repositories_resolve_prefixed_collections() {
    let connector = MemoryConnector::new();
    let pool = ConnectionPool::new(connector.clone());
    let config = config(
        r#"
        address = "memory://local/shop"
        collection_prefix = "test_"
        "#,
    );

    let orders = pool.repository::<Order>(&config).await.unwrap();
    assert_eq!(Order::COLLECTION, "orders");
    assert_eq!(orders.name(), "test_orders");

    orders
        .insert(&mut Order { oid: None, total: 12 })
        .await
        .unwrap();

    let database = pool.database(&config.address).await.unwrap();
    assert_eq!(database.name(), "shop");
    assert_eq!(database.collection_names(), vec!["test_orders"]);
}

#[tokio::test]
async fn concurrent_repositories_share_one_connection() {
    let connector = MemoryConnector::new();
    let pool = ConnectionPool::new(connector.clone());
    let config = config(r#"address = "memory://local/shop""#);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let pool = pool.clone();
            let config = config.clone();
            tokio::spawn(async move {
                let orders = pool.repository::<Order>(&config).await?;
                orders.insert(&mut Order { oid: None, total: i }).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(connector.connect_count(), 1);
    let orders = pool.repository::<Order>(&config).await.unwrap();
    assert_eq!(orders.count(doc! {}).await.unwrap(), 8);
}

#[tokio::test]
async fn pools_on_one_connector_see_the_same_data() {
    let connector = MemoryConnector::new();
    let config = config(r#"address = "memory://local/shop""#);

    let writer = ConnectionPool::new(connector.clone());
    let orders = writer.repository::<Order>(&config).await.unwrap();
    let mut saved = Order { oid: None, total: 5 };
    orders.insert(&mut saved).await.unwrap();

    let reader = ConnectionPool::new(connector);
    let orders: Repository<Order, _> =
        Repository::connect(&reader, &config.address, "orders").await.unwrap();
    let found = orders.required_oid(saved.oid.unwrap()).await.unwrap();
    assert_eq!(found.total, 5);
}

#[tokio::test]
async fn refused_connection_surfaces_the_driver_error() {
    let connector = MemoryConnector::new();
    let config = config(r#"address = "memory://down/shop""#);
    connector.refuse(&config.address);
    let pool = ConnectionPool::new(connector);

    let err = pool.repository::<Order>(&config).await.unwrap_err();
    assert!(matches!(err, OrmError::Driver(_)));
    assert!(err.to_string().contains("memory://down/shop"));
    assert_eq!(pool.connection_count(), 0);
}

#[test]
fn invalid_config_is_reported() {
    let err = StoreConfig::from_toml_str(r#"collection_prefix = "x""#).unwrap_err();
    assert!(matches!(err, OrmError::Config(_)));
}
