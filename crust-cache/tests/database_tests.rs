mod common;

use common::{make_fixture, user_schema};
use crust_cache::{CacheError, Lifecycle};
use crust_model::SchemaError;

#[test]
fn registering_twice_is_rejected() {
    let fx = make_fixture();
    match fx.db.register(user_schema()) {
        Err(CacheError::Schema(SchemaError::AlreadyRegistered(name))) => assert_eq!(name, "User"),
        other => panic!("expected a duplicate registration error, got {other:?}"),
    }
}

#[test]
fn tables_are_created_on_first_use() {
    let fx = make_fixture();
    assert_eq!(fx.db.table_count(), 0);

    let users = fx.db.table(&fx.user);
    let again = fx.db.table_by_name("User").unwrap();
    users.add(1, None);
    assert_eq!(again.len(), 1);
    assert_eq!(fx.db.table_count(), 1);
}

#[test]
fn unknown_models_have_no_table() {
    let fx = make_fixture();
    assert!(fx.db.model("Invoice").is_none());
    assert!(fx.db.table_by_name("Invoice").is_none());
}

#[test]
fn created_entities_are_attached_but_not_cached() {
    let fx = make_fixture();
    let entity = fx.db.create(&fx.user);

    assert_eq!(entity.lifecycle(), Lifecycle::New);
    assert!(entity.database().is_some());
    assert!(entity.table().is_some());
    assert!(fx.db.table(&fx.user).is_empty());
}

#[test]
fn entities_outlive_a_dropped_database() {
    let fx = make_fixture();
    let users = fx.db.table(&fx.user);
    users.add(1, Some(&serde_json::json!({ "id": 1, "name": "Ada" })));
    let entity = users.get(1).unwrap();
    drop(users);
    drop(fx);

    assert!(entity.database().is_none());
    assert!(entity.one("team").is_none());
    assert_eq!(entity.get("name"), Some(serde_json::json!("Ada")));
}
