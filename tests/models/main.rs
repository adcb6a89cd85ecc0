//! Integration tests for the repository over the in-memory driver.

mod user;

use std::time::Duration;

use odm_rust::{
    doc, Address, ConnectionPool, DecodeError, MemoryCollection, MemoryConnector, ModelVecExt,
    ObjectId, OrmError, Repository, StoreConfig,
};
use user::{Profile, User};

fn config() -> StoreConfig {
    StoreConfig::new(Address::parse("memory://local/app").unwrap())
}

async fn users() -> Repository<User, MemoryCollection> {
    let pool = ConnectionPool::new(MemoryConnector::new());
    pool.repository::<User>(&config()).await.unwrap()
}

#[tokio::test]
async fn insert_then_required_by_id_then_destroy() {
    let repo = users().await;

    let mut user = User::new("a@x.com", "p1");
    repo.insert(&mut user).await.unwrap();
    let oid = user.oid.expect("insert assigns an identifier");
    assert!(user.saved);
    assert!(user.updated_at.is_some());

    let found = repo.required_id(&oid.to_hex()).await.unwrap();
    assert_eq!(found.email, "a@x.com");
    assert_eq!(found.password, "p1");
    assert!(!found.saved);

    repo.destroy(&found).await.unwrap();
    let err = repo.required_oid(oid).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn insert_keeps_a_preassigned_identifier() {
    let repo = users().await;
    let oid = ObjectId::new();
    let mut user = User::new("a@x.com", "p1");
    user.oid = Some(oid);

    repo.insert(&mut user).await.unwrap();
    assert_eq!(user.oid, Some(oid));
    assert!(repo.exists_oid(oid).await.unwrap());
}

#[tokio::test]
async fn duplicate_identifier_is_save_failed_with_message() {
    let repo = users().await;
    let mut user = User::new("a@x.com", "p1");
    repo.insert(&mut user).await.unwrap();

    let mut copy = user.clone();
    let err = repo.insert(&mut copy).await.unwrap_err();
    match err {
        OrmError::SaveFailed { message: Some(message) } => {
            assert!(message.contains("duplicate key"));
        }
        other => panic!("expected SaveFailed, got {other:?}"),
    }
    assert_eq!(repo.count(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn failed_insert_keeps_hook_changes_and_identifier() {
    let repo = users().await;
    let mut first = User::new("a@x.com", "p1");
    repo.insert(&mut first).await.unwrap();

    let mut retry = User::new("b@x.com", "p2");
    retry.oid = first.oid;
    repo.insert(&mut retry).await.unwrap_err();

    assert_eq!(retry.oid, first.oid);
    assert!(retry.updated_at.is_some());
    assert!(!retry.saved);

    retry.oid = None;
    repo.insert(&mut retry).await.unwrap();
    assert!(retry.saved);
    assert_ne!(retry.oid, first.oid);
}

#[tokio::test]
async fn failing_hook_aborts_insert_before_io() {
    let repo = users().await;

    let err = repo.insert(&mut User::new("", "p1")).await.unwrap_err();
    assert!(matches!(err, OrmError::Hook(_)));
    assert_eq!(err.to_string(), "before-save hook failed: email is required");
    assert_eq!(repo.collection().len(), 0);
}

#[tokio::test]
async fn update_fields_only_touches_listed_fields() {
    let repo = users().await;
    let mut user = User::new("a@x.com", "p1");
    repo.insert(&mut user).await.unwrap();

    user.email = "b@x.com".into();
    user.password = "p2".into();
    repo.update_fields(&mut user, &["password"]).await.unwrap();

    // The in-memory record is left as the caller changed it.
    assert_eq!(user.email, "b@x.com");

    let stored = repo.reload(&user).await.unwrap();
    assert_eq!(stored.password, "p2");
    assert_eq!(stored.email, "a@x.com");
}

#[tokio::test]
async fn update_fields_clears_a_listed_none() {
    let repo = users().await;
    let mut user = User::new("a@x.com", "p1");
    user.nickname = Some("al".into());
    repo.insert(&mut user).await.unwrap();

    user.nickname = None;
    user.password = "p2".into();
    repo.update_fields(&mut user, &["nickname"]).await.unwrap();

    let stored = repo.reload(&user).await.unwrap();
    assert_eq!(stored.nickname, None);
    assert_eq!(stored.password, "p1");
    let raw = repo.maps(doc! {}, 0, 0).await.unwrap();
    assert!(!raw[0].contains_key("nickname"));
}

#[tokio::test]
async fn update_replaces_the_whole_document() {
    let repo = users().await;
    let mut user = User::new("a@x.com", "p1");
    repo.insert(&mut user).await.unwrap();

    user.saved = false;
    user.email = "b@x.com".into();
    repo.update(&mut user).await.unwrap();
    assert!(user.saved);

    let stored = repo.reload(&user).await.unwrap();
    assert_eq!(stored.email, "b@x.com");
    assert_eq!(repo.count(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn update_without_identifier_or_match_fails() {
    let repo = users().await;

    let err = repo.update(&mut User::new("a@x.com", "p1")).await.unwrap_err();
    assert!(matches!(err, OrmError::MissingIdentifier));

    let err = repo
        .update_fields(&mut User::new("a@x.com", "p1"), &["email"])
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::MissingIdentifier));

    let mut ghost = User::new("a@x.com", "p1");
    ghost.oid = Some(ObjectId::new());
    let err = repo.update(&mut ghost).await.unwrap_err();
    assert!(err.is_not_found());
    let err = repo.update_fields(&mut ghost, &["email"]).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!ghost.saved);
    assert_eq!(repo.count(doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn insert_many_is_all_or_nothing_at_the_hook_stage() {
    let repo = users().await;
    let mut batch = vec![
        User::new("a@x.com", "p1"),
        User::new("", "p2"),
        User::new("c@x.com", "p3"),
    ];

    let err = repo.insert_many(&mut batch).await.unwrap_err();
    assert!(matches!(err, OrmError::Hook(_)));
    assert_eq!(repo.count(doc! {}).await.unwrap(), 0);
    assert!(batch.iter().all(|u| u.oid.is_none()));
}

#[tokio::test]
async fn insert_many_saves_every_record() {
    let repo = users().await;
    let mut batch = vec![User::new("a@x.com", "p1"), User::new("b@x.com", "p2")];

    repo.insert_many(&mut batch).await.unwrap();
    assert!(batch.iter().all(|u| u.saved && u.oid.is_some()));
    assert_eq!(repo.count(doc! {}).await.unwrap(), 2);
}

#[tokio::test]
async fn timestamps_filter_by_range() {
    let repo = users().await;
    let mut batch = Vec::new();
    for email in ["a@x.com", "b@x.com", "c@x.com"] {
        let mut user = User::new(email, "p");
        repo.insert(&mut user).await.unwrap();
        batch.push(user);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let millis = |user: &User| {
        let at = user.updated_at.expect("set by will_save");
        bson::DateTime::from_millis(at.timestamp_millis())
    };

    let after_first = doc! { "updated_at": { "$gt": millis(&batch[0]) } };
    let page = repo.find(after_first, 0, 0).await.unwrap();
    let emails: Vec<&str> = page.successes.iter().map(|u| u.email.as_str()).collect();
    assert_eq!(emails, vec!["b@x.com", "c@x.com"]);

    let window = doc! {
        "updated_at": { "$gte": millis(&batch[1]), "$lt": millis(&batch[2]) }
    };
    let found = repo.required(window).await.unwrap();
    assert_eq!(found.email, "b@x.com");
    assert_eq!(
        found.updated_at.map(|at| at.timestamp_millis()),
        batch[1].updated_at.map(|at| at.timestamp_millis())
    );
}

#[tokio::test]
async fn find_isolates_documents_that_fail_to_decode() {
    let repo = users().await;
    repo.insert_many(&mut [
        User::new("a@x.com", "p1"),
        User::new("b@x.com", "p2"),
        User::new("c@x.com", "p3"),
    ])
    .await
    .unwrap();
    repo.collection()
        .seed([
            doc! { "_id": ObjectId::new(), "email": "legacy@x.com" },
            doc! { "_id": ObjectId::new(), "email": 42, "password": "p" },
        ])
        .unwrap();

    let result = repo.all(0, 0).await.unwrap();
    assert_eq!(result.len(), 5);
    assert_eq!(result.successes.len(), 3);
    assert_eq!(result.failures.len(), 2);
    assert!(!result.is_complete());

    let (map, error) = &result.failures[0];
    assert_eq!(map.get("email").and_then(|v| v.as_str()), Some("legacy@x.com"));
    assert_eq!(
        *error,
        DecodeError::MissingField {
            key: "password".into()
        }
    );
    assert!(matches!(result.failures[1].1, DecodeError::UnexpectedType { .. }));
}

#[tokio::test]
async fn find_with_a_second_type_on_the_same_collection() {
    let repo = users().await;
    repo.insert(&mut User::new("a@x.com", "p1")).await.unwrap();
    let profiles: Repository<Profile, MemoryCollection> =
        Repository::new(repo.collection().clone());
    profiles
        .insert(&mut Profile {
            key: ObjectId::new(),
            email: "b@x.com".into(),
            age: 30,
        })
        .await
        .unwrap();

    let result = profiles.find(doc! {}, 0, 0).await.unwrap();
    assert_eq!(result.successes.len(), 1);
    assert_eq!(result.successes[0].age, 30);
    assert_eq!(result.failures.len(), 1);
}

#[tokio::test]
async fn find_filters_and_pages() {
    let repo = users().await;
    for i in 0..5 {
        repo.insert(&mut User::new(&format!("u{i}@x.com"), "same"))
            .await
            .unwrap();
    }
    repo.insert(&mut User::new("other@x.com", "different"))
        .await
        .unwrap();

    let page = repo.find(doc! { "password": "same" }, 1, 2).await.unwrap();
    let emails: Vec<&str> = page.successes.iter().map(|u| u.email.as_str()).collect();
    assert_eq!(emails, vec!["u1@x.com", "u2@x.com"]);

    assert_eq!(repo.count(doc! { "password": "same" }).await.unwrap(), 5);
    assert!(repo.exists(doc! { "email": "other@x.com" }).await.unwrap());
    assert!(!repo.exists(doc! { "email": "nobody@x.com" }).await.unwrap());
}

#[tokio::test]
async fn first_is_absence_where_required_is_not_found() {
    let repo = users().await;
    let filter = doc! { "email": "nobody@x.com" };

    assert!(repo.first(filter.clone()).await.unwrap().is_none());
    let err = repo.required(filter).await.unwrap_err();
    assert!(matches!(err, OrmError::NotFound { ref collection } if collection == "users"));
}

#[tokio::test]
async fn destroy_variants() {
    let repo = users().await;

    let err = repo.destroy(&User::new("a@x.com", "p1")).await.unwrap_err();
    assert!(matches!(err, OrmError::MissingIdentifier));

    let err = repo.destroy_oid(ObjectId::new()).await.unwrap_err();
    assert!(err.is_not_found());

    let mut user = User::new("a@x.com", "p1");
    repo.insert(&mut user).await.unwrap();
    let hex = user.oid.unwrap().to_hex();
    assert!(repo.exists_id(&hex).await.unwrap());
    repo.destroy_id(&hex).await.unwrap();
    assert!(!repo.exists_id(&hex).await.unwrap());
}

#[tokio::test]
async fn list_helpers_on_loaded_records() {
    let repo = users().await;
    repo.insert_many(&mut [User::new("a@x.com", "p1"), User::new("b@x.com", "p2")])
        .await
        .unwrap();

    let mut loaded = repo.all(0, 0).await.unwrap().successes;
    let b = loaded.find_by_id(&loaded[1].oid.unwrap().to_hex()).cloned().unwrap();
    assert_eq!(b.email, "b@x.com");

    let mut renamed = b.clone();
    renamed.email = "renamed@x.com".into();
    loaded.upsert_by_oid(renamed);
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[1].email, "renamed@x.com");

    loaded.remove_by_oid(&b.oid.unwrap());
    assert_eq!(loaded.len(), 1);
}

#[tokio::test]
async fn drop_collection_removes_everything() {
    let repo = users().await;
    repo.insert(&mut User::new("a@x.com", "p1")).await.unwrap();

    repo.drop_collection().await.unwrap();
    assert_eq!(repo.count(doc! {}).await.unwrap(), 0);
}
