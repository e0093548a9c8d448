use crust_model::{
    FieldRef, Point, Property, RequiredValidator, Timestamp, ValidationError, Validator,
};
use serde_json::json;

// ── ValidationError ──────────────────────────────────────────────

#[test]
fn required_error_shape() {
    let err = ValidationError::required();
    assert_eq!(err.kind, "required");
    assert_eq!(err.subtype, None);
    assert_eq!(err.render("Name"), "Name is required.");
}

#[test]
fn validation_error_serializes_kind_as_type() {
    let err = ValidationError::required_part("latitude");
    let value = serde_json::to_value(&err).unwrap();
    assert_eq!(
        value,
        json!({"type": "required", "subtype": "latitude", "message": "{fieldName} is required."})
    );
}

// ── FieldRef ─────────────────────────────────────────────────────

#[test]
fn blank_values() {
    assert!(FieldRef::Value(&json!(null)).is_blank());
    assert!(FieldRef::Value(&json!("   ")).is_blank());
    assert!(!FieldRef::Value(&json!("x")).is_blank());
    assert!(!FieldRef::Value(&json!(0)).is_blank());
    assert!(FieldRef::Date(None).is_blank());
    assert!(FieldRef::One(false).is_blank());
    assert!(!FieldRef::One(true).is_blank());
    assert!(!FieldRef::Many(0).is_blank());
}

// ── RequiredValidator ────────────────────────────────────────────

#[test]
fn nullable_property_accepts_null() {
    let errors = RequiredValidator.validate(&Property::string("nick"), FieldRef::Value(&json!(null)));
    assert!(errors.is_empty());
}

#[test]
fn required_property_rejects_null_and_blank() {
    let name = Property::string("name").required();
    assert_eq!(
        RequiredValidator.validate(&name, FieldRef::Value(&json!(null))),
        vec![ValidationError::required()]
    );
    assert_eq!(
        RequiredValidator.validate(&name, FieldRef::Value(&json!(""))),
        vec![ValidationError::required()]
    );
    assert!(RequiredValidator
        .validate(&name, FieldRef::Value(&json!("Ada")))
        .is_empty());
}

#[test]
fn required_date() {
    let due = Property::date("due").required();
    assert_eq!(RequiredValidator.validate(&due, FieldRef::Date(None)).len(), 1);
    let ts = Timestamp::now();
    assert!(RequiredValidator.validate(&due, FieldRef::Date(Some(&ts))).is_empty());
}

#[test]
fn adapters_validate_themselves() {
    let location = Property::adapter("location", Point::boxed);
    let point = Point::default();
    let errors = RequiredValidator.validate(&location, FieldRef::Adapter(&point));
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].subtype.as_deref(), Some("latitude"));
    assert_eq!(errors[1].subtype.as_deref(), Some("longitude"));
}
