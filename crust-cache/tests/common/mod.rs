//! Shared fixtures for cache tests.

#![allow(dead_code)]

use std::sync::Arc;

use crust_cache::mock::MockTransport;
use crust_cache::{CacheConfig, Database};
use crust_model::{EnumType, ModelSchema, Property};
use crust_types::RecordId;
use serde_json::{json, Value};

pub struct Fixture {
    pub db: Database,
    pub mock: Arc<MockTransport>,
    pub user: Arc<ModelSchema>,
    pub team: Arc<ModelSchema>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn status() -> EnumType {
    EnumType::new("Status", [(1, "Active"), (2, "Archived")])
}

pub fn roles() -> EnumType {
    EnumType::new("Roles", [(1, "Read"), (2, "Write"), (4, "Admin")])
}

pub fn user_schema() -> ModelSchema {
    ModelSchema::builder("User", "/api/Users")
        .property(Property::integer("id"))
        .property(Property::string("name").required())
        .property(Property::integer("age"))
        .property(Property::enumeration("status", status()))
        .property(Property::flag("roles", roles()))
        .property(Property::date("born"))
        .property(Property::one("team", "Team"))
        .property(Property::integer("teamId"))
        .build()
        .unwrap()
}

pub fn team_schema() -> ModelSchema {
    ModelSchema::builder("Team", "/api/Teams")
        .property(Property::integer("id"))
        .property(Property::string("name"))
        .property(Property::many("members", "User").foreign_key("memberIds"))
        .property(Property::json("memberIds"))
        .build()
        .unwrap()
}

pub fn make_fixture() -> Fixture {
    make_fixture_with(CacheConfig::default())
}

pub fn make_fixture_with(config: CacheConfig) -> Fixture {
    init_tracing();
    let mock = Arc::new(MockTransport::new());
    let db = Database::with_config(mock.clone(), config);
    let user = db.register(user_schema()).unwrap();
    let team = db.register(team_schema()).unwrap();
    Fixture {
        db,
        mock,
        user,
        team,
    }
}

pub fn make_user(id: i64, name: &str) -> Value {
    json!({ "id": id, "name": name })
}

pub fn rid(n: i64) -> RecordId {
    RecordId::Number(n)
}

pub fn rids(ns: &[i64]) -> Vec<RecordId> {
    ns.iter().copied().map(RecordId::Number).collect()
}
