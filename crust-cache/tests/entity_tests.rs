mod common;

use std::time::Duration;

use common::{make_fixture, make_user, rid, rids, user_schema};
use crust_cache::mock::MockOp;
use crust_cache::{Entity, Lifecycle, Member};
use crust_model::{ModelSchema, Point, Property, PropertyConfig, Timestamp};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn detached_user() -> Entity {
    Entity::new(Arc::new(user_schema()))
}

// ── Scalars & identity ───────────────────────────────────────────

#[test]
fn new_entities_start_modified_and_unsaved() {
    let user = detached_user();
    assert_eq!(user.lifecycle(), Lifecycle::New);
    assert!(user.is_modified());
    assert_eq!(user.id(), None);
    assert!(user.database().is_none());
    assert!(user.table().is_none());
}

#[test]
fn unknown_properties_degrade_to_none() {
    let user = detached_user();
    assert_eq!(user.get("nickname"), None);
    assert!(!user.set("nickname", "x"));
    assert!(user.watch_property("nickname").is_none());
}

#[test]
fn populate_reports_unknown_fields() {
    let user = detached_user();
    let unknown = user.populate(&json!({ "id": 3, "name": "Ada", "shoeSize": 38 }));
    assert_eq!(unknown, vec!["shoeSize".to_string()]);
    assert_eq!(user.get("name"), Some(json!("Ada")));
    assert_eq!(user.id(), Some(rid(3)));
    assert!(user.is_loaded());
    assert!(!user.is_modified());
}

#[test]
fn identity_cannot_change_once_assigned() {
    let user = detached_user();
    user.populate(&make_user(3, "Ada"));

    assert!(!user.set("id", 4));
    user.populate(&make_user(4, "Bob"));
    assert_eq!(user.id(), Some(rid(3)));
    assert_eq!(user.get("id"), Some(json!(3)));
    assert_eq!(user.get("name"), Some(json!("Bob")));
}

#[test]
fn export_skips_audit_fields_and_relations() {
    let user = detached_user();
    user.populate(&json!({ "id": 1, "name": "Ada", "teamId": 4, "updated": "2024-01-01" }));
    let exported = user.export();

    let fields = exported.as_object().unwrap();
    assert!(!fields.contains_key("id"));
    assert!(!fields.contains_key("team"));
    assert_eq!(fields["teamId"], json!(4));
}

// ── Enums & flags ────────────────────────────────────────────────

#[test]
fn enums_read_as_labels_and_export_integers() {
    let user = detached_user();
    user.populate(&json!({ "id": 1, "status": 2 }));
    assert_eq!(user.get("status"), Some(json!("Archived")));

    assert!(user.set("status", "Active"));
    assert_eq!(user.get("status"), Some(json!("Active")));
    assert_eq!(user.export()["status"], json!(1));

    assert!(user.set("status", 2));
    assert_eq!(user.export()["status"], json!(2));
}

#[test]
fn unknown_enum_labels_are_rejected() {
    let user = detached_user();
    user.populate(&json!({ "id": 1, "status": 1 }));
    assert!(!user.set("status", "Deleted"));
    assert_eq!(user.get("status"), Some(json!("Active")));
    assert!(!user.is_modified());
}

#[test]
fn flags_read_as_label_lists() {
    let user = detached_user();
    user.populate(&json!({ "id": 1, "roles": 5 }));
    assert_eq!(user.get("roles"), Some(json!(["Read", "Admin"])));

    assert!(user.set("roles", json!(["Write", "Admin"])));
    assert_eq!(user.get("roles"), Some(json!(["Write", "Admin"])));
    assert_eq!(user.export()["roles"], json!(6));

    assert!(user.set("roles", 1));
    assert_eq!(user.get("roles"), Some(json!(["Read"])));
    assert!(!user.set("roles", json!(["Owner"])));
}

// ── Dates & adapters ─────────────────────────────────────────────

#[test]
fn dates_are_coerced_on_set() {
    let user = detached_user();
    assert!(user.set("born", "1815-12-10"));
    assert_eq!(user.date("born"), Timestamp::parse(&json!("1815-12-10")));
    assert_eq!(user.get("born"), Some(json!("1815-12-10")));

    assert!(!user.set("born", "next tuesday"));
    assert!(user.set("born", Value::Null));
    assert_eq!(user.date("born"), None);
}

#[test]
fn dates_export_exactly_as_received() {
    let user = detached_user();
    for wire in [
        "2024-01-01T10:00:00.1234567",
        "2024-01-01T10:00:00.5Z",
        "2024-01-01 10:00:00Z",
    ] {
        user.populate(&json!({ "id": 1, "born": wire }));
        assert_eq!(user.export()["born"], json!(wire));
        assert_eq!(user.get("born"), Some(json!(wire)));
    }
}

#[test]
fn adapters_take_the_wire_value() {
    let schema = ModelSchema::builder("Place", "/api/Places")
        .property(Property::integer("id"))
        .property(Property::adapter("location", Point::boxed))
        .build()
        .unwrap();
    let place = Entity::new(Arc::new(schema));

    let wire = json!({ "latitude": 51.5, "longitude": -0.12 });
    place.populate(&json!({ "id": 1, "location": wire }));
    let mut expected = Point::boxed(&PropertyConfig::default());
    expected.set_raw(&wire);
    assert_eq!(place.get("location"), Some(expected.value()));
    assert_eq!(place.export()["location"], expected.raw());
}

// ── Validation ───────────────────────────────────────────────────

#[test]
fn validation_fills_the_error_map() {
    let user = detached_user();
    assert!(!user.validate(None));
    assert!(user.has_error("name"));
    assert_eq!(user.errors()["name"][0].kind, "required");

    user.set("name", "Ada");
    assert!(user.validate(Some("name")));
    assert!(!user.has_error("name"));
    assert!(user.errors().is_empty());
}

#[test]
fn populate_clears_validation_errors() {
    let user = detached_user();
    user.validate(None);
    assert!(!user.errors().is_empty());

    user.populate(&make_user(1, "Ada"));
    assert!(user.errors().is_empty());
}

#[test]
fn validation_never_blocks_mutation() {
    let user = detached_user();
    user.set("name", "Ada");
    user.validate(None);
    assert!(user.set("name", ""));
    assert!(!user.validate(Some("name")));
    assert_eq!(user.get("name"), Some(json!("")));
}

// ── Observation ──────────────────────────────────────────────────

#[test]
fn property_watchers_fire_independently() {
    let user = detached_user();
    let mut name = user.watch_property("name").unwrap();
    let mut age = user.watch_property("age").unwrap();
    let mut any = user.subscribe();

    user.set("name", "Ada");
    assert!(name.has_changed().unwrap());
    assert!(!age.has_changed().unwrap());
    assert!(any.has_changed().unwrap());
    name.mark_unchanged();
    any.mark_unchanged();

    user.set("age", 36);
    assert!(!name.has_changed().unwrap());
    assert!(age.has_changed().unwrap());
    assert!(any.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn loaded_resolves_once_populated() {
    let user = detached_user();
    let waiter = tokio::spawn(user.loaded());
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(!waiter.is_finished());

    user.populate(&make_user(1, "Ada"));
    waiter.await.unwrap();
    user.loaded().await;
}

// ── Relations ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn to_one_resolves_through_the_target_table() {
    let fx = make_fixture();
    fx.mock.insert(&fx.team, json!({ "id": 1, "name": "Core" }));
    fx.mock.insert(&fx.user, json!({ "id": 10, "name": "Ada", "teamId": 1 }));
    let users = fx.db.table(&fx.user);

    let ada = users.get(10).unwrap();
    ada.loaded().await;
    assert_eq!(ada.get("team"), Some(json!(1)));

    let team = ada.one("team").unwrap();
    assert!(team.ptr_eq(&fx.db.table(&fx.team).get(1).unwrap()));
    team.loaded().await;
    assert_eq!(team.get("name"), Some(json!("Core")));
}

#[tokio::test(start_paused = true)]
async fn embedded_records_land_in_their_table() {
    let fx = make_fixture();
    let users = fx.db.table(&fx.user);
    let teams = fx.db.table(&fx.team);

    users.add(11, Some(&json!({ "id": 11, "name": "Bob", "team": { "id": 2, "name": "Infra" } })));

    assert!(teams.contains(&rid(2)));
    let team = users.get(11).unwrap().one("team").unwrap();
    assert!(team.is_loaded());
    assert_eq!(team.get("name"), Some(json!("Infra")));
    assert_eq!(fx.mock.calls(MockOp::ListByIds), 0);
}

#[tokio::test(start_paused = true)]
async fn setting_a_foreign_key_relinks_the_relation() {
    let fx = make_fixture();
    let users = fx.db.table(&fx.user);
    users.add(1, Some(&json!({ "id": 1, "name": "Ada", "teamId": 1 })));
    let ada = users.get(1).unwrap();

    assert!(ada.set("teamId", 2));
    assert_eq!(ada.get("team"), Some(json!(2)));
    assert_eq!(ada.one("team").unwrap().id(), Some(rid(2)));

    assert!(ada.set("team", 3));
    assert_eq!(ada.get("teamId"), Some(json!(3)));

    assert!(ada.set("team", Value::Null));
    assert!(ada.one("team").is_none());
    assert_eq!(ada.get("teamId"), Some(json!(null)));
}

#[tokio::test(start_paused = true)]
async fn new_related_records_stay_detached() {
    let fx = make_fixture();
    let ada = fx.db.create(&fx.user);

    assert!(ada.set("team", json!({ "name": "Skunkworks" })));
    let team = ada.one("team").unwrap();
    assert_eq!(team.id(), None);
    assert_eq!(team.get("name"), Some(json!("Skunkworks")));
    assert_eq!(ada.get("teamId"), Some(json!(null)));

    assert!(ada.set("team", json!({ "name": "Renamed" })));
    assert!(ada.one("team").unwrap().ptr_eq(&team));
    assert_eq!(team.get("name"), Some(json!("Renamed")));
}

#[tokio::test(start_paused = true)]
async fn to_many_keeps_one_collection() {
    let fx = make_fixture();
    fx.mock
        .insert_many(&fx.user, [make_user(10, "Ada"), make_user(11, "Bob")]);
    let teams = fx.db.table(&fx.team);
    teams.add(1, Some(&json!({ "id": 1, "name": "Core", "memberIds": [10, 11] })));
    let core = teams.get(1).unwrap();

    let members = core.many("members").unwrap();
    assert_eq!(members.keys(), rids(&[10, 11]));
    assert_eq!(core.get("members"), Some(json!([10, 11])));

    let bob = members.get(1).unwrap();
    bob.loaded().await;
    assert_eq!(bob.get("name"), Some(json!("Bob")));

    assert!(core.set("members", json!([11])));
    assert!(core.many("members").unwrap().ptr_eq(&members));
    assert_eq!(members.keys(), rids(&[11]));
    assert_eq!(core.get("memberIds"), Some(json!([11])));

    assert!(core.set("members", Value::Null));
    assert!(members.is_empty());
}

#[tokio::test(start_paused = true)]
async fn to_many_accepts_embedded_records() {
    let fx = make_fixture();
    let teams = fx.db.table(&fx.team);
    let users = fx.db.table(&fx.user);

    teams.add(
        1,
        Some(&json!({ "id": 1, "members": [{ "id": 20, "name": "Cy" }, { "name": "new" }] })),
    );
    let members = teams.get(1).unwrap().many("members").unwrap();

    assert_eq!(members.len(), 2);
    assert!(matches!(members.members()[0], Member::Key(id) if id == rid(20)));
    assert!(matches!(members.members()[1], Member::Detached(_)));
    assert!(users.get(20).unwrap().is_loaded());
    assert_eq!(members.to_vec()[1].get("name"), Some(json!("new")));
}

#[test]
fn relation_accessors_reject_other_properties() {
    let user = detached_user();
    assert!(user.one("name").is_none());
    assert!(user.many("team").is_none());
}

// ── Round trip ───────────────────────────────────────────────────

fn date_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (1990i32..2030, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| json!(format!("{y:04}-{m:02}-{d:02}"))),
        (0i64..4_000_000_000_000).prop_map(|ms| json!(ms)),
        (1990i32..2030, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, "[0-9]{0,9}", prop_oneof![
            Just("Z"),
            Just("+02:00"),
            Just("-05:30"),
            Just(""),
        ], prop_oneof![Just('T'), Just(' ')])
            .prop_map(|(y, m, d, h, min, fraction, zone, sep)| {
                let fraction = if fraction.is_empty() { String::new() } else { format!(".{fraction}") };
                json!(format!("{y:04}-{m:02}-{d:02}{sep}{h:02}:{min:02}:07{fraction}{zone}"))
            }),
        Just(Value::Null),
    ]
}

proptest! {
    #[test]
    fn populate_then_export_reproduces_plain_fields(
        name in "[a-zA-Z ]{0,24}",
        age in proptest::option::of(0i64..130),
        status in prop_oneof![Just(json!(1)), Just(json!(2)), Just(Value::Null)],
        born in date_strategy(),
        team_id in 1i64..1000,
    ) {
        let user = detached_user();
        let record = json!({
            "id": 1,
            "name": name,
            "age": age,
            "status": status,
            "roles": 0,
            "born": born,
            "teamId": team_id,
        });
        user.populate(&record);

        let mut expected = record.clone();
        expected.as_object_mut().unwrap().remove("id");
        prop_assert_eq!(user.export(), expected);
    }
}
