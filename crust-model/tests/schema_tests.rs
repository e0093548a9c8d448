use crust_model::{
    EnumType, Flag, ModelSchema, Primitive, Property, PropertyType, SchemaError, SchemaRegistry,
    Strategy,
};
use crust_types::KeyType;
use pretty_assertions::assert_eq;

fn status() -> EnumType {
    EnumType::new("Status", [(1, "Active"), (2, "Archived")])
}

fn user_schema() -> ModelSchema {
    ModelSchema::builder("User", "/api/Users")
        .property(Property::integer("id"))
        .property(Property::string("name").required())
        .property(Property::enumeration("status", status()))
        .property(Property::one("team", "Team"))
        .property(Property::integer("teamId"))
        .property(Property::many("roles", "Role"))
        .property(Property::date("created"))
        .build()
        .unwrap()
}

// ── Property constructors ────────────────────────────────────────

#[test]
fn property_defaults_to_nullable() {
    let p = Property::string("name");
    assert_eq!(p.name, "name");
    assert!(p.nullable);
    assert!(matches!(p.ty, PropertyType::Scalar(Primitive::String)));
}

#[test]
fn property_required_clears_nullable() {
    assert!(!Property::string("name").required().nullable);
}

#[test]
fn property_foreign_key_and_width() {
    let p = Property::one("owner", "User").foreign_key("ownerUserId");
    assert_eq!(p.config.foreign_key.as_deref(), Some("ownerUserId"));

    let p = Property::adapter("bits", Flag::boxed).max_length(8);
    assert_eq!(p.config.max_length, Some(8));
}

#[test]
fn property_type_describe() {
    assert_eq!(PropertyType::Scalar(Primitive::Integer).describe(), "integer");
    assert_eq!(PropertyType::One("Team".into()).describe(), "one Team");
    assert_eq!(PropertyType::Flag(status()).describe(), "flag Status");
}

// ── Builder ──────────────────────────────────────────────────────

#[test]
fn builder_keeps_declaration_order() {
    let schema = user_schema();
    let names: Vec<&str> = schema.properties().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "status", "team", "teamId", "roles", "created"]);
    assert_eq!(schema.len(), 7);
    assert_eq!(schema.name(), "User");
    assert_eq!(schema.source(), "/api/Users");
}

#[test]
fn builder_integer_key_type() {
    assert_eq!(user_schema().key_type(), KeyType::Integer);
}

#[test]
fn builder_guid_key_type() {
    let schema = ModelSchema::builder("Doc", "/api/Docs")
        .property(Property::guid("id"))
        .build()
        .unwrap();
    assert_eq!(schema.key_type(), KeyType::Guid);
}

#[test]
fn builder_marks_transfer_only_models() {
    assert!(!user_schema().is_dto());
    let feedback = ModelSchema::builder("Feedback", "/api/Feedback")
        .property(Property::integer("id"))
        .dto()
        .build()
        .unwrap();
    assert!(feedback.is_dto());
}

#[test]
fn builder_rejects_missing_id() {
    let err = ModelSchema::builder("Orphan", "/api/Orphans")
        .property(Property::string("name"))
        .build()
        .unwrap_err();
    assert_eq!(err, SchemaError::MissingId("Orphan".into()));
}

#[test]
fn builder_rejects_non_key_id() {
    let err = ModelSchema::builder("Bad", "/api/Bad")
        .property(Property::string("id"))
        .build()
        .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidKey { .. }));
}

#[test]
fn builder_rejects_duplicates() {
    let err = ModelSchema::builder("Dup", "/api/Dup")
        .property(Property::integer("id"))
        .property(Property::string("name"))
        .property(Property::string("name"))
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        SchemaError::DuplicateProperty {
            model: "Dup".into(),
            property: "name".into()
        }
    );
}

// ── Strategies ───────────────────────────────────────────────────

#[test]
fn relation_strategies_derive_foreign_keys() {
    let schema = user_schema();
    let team = schema.index_of("team").unwrap();
    let roles = schema.index_of("roles").unwrap();

    assert_eq!(schema.strategy_at(team).relation(), Some(("Team", "teamId")));
    assert_eq!(schema.strategy_at(roles).relation(), Some(("Role", "rolesIds")));
    assert_eq!(schema.relation_for_foreign_key("teamId"), Some(team));
    assert_eq!(schema.relation_for_foreign_key("rolesIds"), Some(roles));
    assert_eq!(schema.relation_for_foreign_key("name"), None);
}

#[test]
fn explicit_foreign_key_wins() {
    let schema = ModelSchema::builder("Task", "/api/Tasks")
        .property(Property::integer("id"))
        .property(Property::one("owner", "User").foreign_key("ownerUserId"))
        .build()
        .unwrap();
    let owner = schema.index_of("owner").unwrap();
    assert_eq!(schema.strategy_at(owner).relation(), Some(("User", "ownerUserId")));
}

#[test]
fn scalar_strategies_are_not_relations() {
    let schema = user_schema();
    let status = schema.index_of("status").unwrap();
    assert!(matches!(schema.strategy_at(status), Strategy::Enum(_)));
    assert!(!schema.strategy_at(status).is_relation());
    assert!(matches!(schema.strategy_at(0), Strategy::Scalar));
}

#[test]
fn default_audit_fields() {
    let schema = user_schema();
    assert!(schema.is_audit("id"));
    assert!(schema.is_audit("created"));
    assert!(schema.is_audit("updated"));
    assert!(!schema.is_audit("name"));
}

#[test]
fn custom_audit_fields() {
    let schema = ModelSchema::builder("Log", "/api/Logs")
        .property(Property::integer("id"))
        .audit_fields(["id", "stamp"])
        .build()
        .unwrap();
    assert!(schema.is_audit("stamp"));
    assert!(!schema.is_audit("created"));
}

#[test]
fn schema_debug_names_model() {
    let debug = format!("{:?}", user_schema());
    assert!(debug.contains("User"));
    assert!(debug.contains("/api/Users"));
}

// ── EnumType ─────────────────────────────────────────────────────

#[test]
fn enum_label_lookup() {
    let e = status();
    assert_eq!(e.label(1), Some("Active"));
    assert_eq!(e.label(9), None);
    assert_eq!(e.value_of("Archived"), Some(2));
    assert_eq!(e.value_of("Missing"), None);
}

#[test]
fn enum_coerce_accepts_labels_and_integers() {
    let e = status();
    assert_eq!(e.coerce(&serde_json::json!(2)), Some(2));
    assert_eq!(e.coerce(&serde_json::json!("Active")), Some(1));
    assert_eq!(e.coerce(&serde_json::json!("2")), Some(2));
    assert_eq!(e.coerce(&serde_json::json!(true)), None);
}

#[test]
fn enum_label_value() {
    let e = status();
    assert_eq!(e.label_value(&serde_json::json!(1)), serde_json::json!("Active"));
    assert_eq!(e.label_value(&serde_json::json!(7)), serde_json::Value::Null);
}

// ── Registry ─────────────────────────────────────────────────────

#[test]
fn registry_register_and_get() {
    let mut registry = SchemaRegistry::new();
    let user = registry.register(user_schema()).unwrap();
    assert_eq!(user.name(), "User");
    assert!(registry.contains("User"));
    assert_eq!(registry.get("User").unwrap().source(), "/api/Users");
    assert_eq!(registry.len(), 1);
}

#[test]
fn registry_rejects_second_registration() {
    let mut registry = SchemaRegistry::new();
    registry.register(user_schema()).unwrap();
    let err = registry.register(user_schema()).unwrap_err();
    assert_eq!(err, SchemaError::AlreadyRegistered("User".into()));
}

#[test]
fn registry_unknown_model() {
    let registry = SchemaRegistry::new();
    assert!(registry.get("Nope").is_none());
    assert!(registry.is_empty());
}
