use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::DataType;
use crate::schema::Property;
use crate::timestamp::Timestamp;

/// A structured, advisory validation failure for one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Rule that failed, e.g. `required`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Part of a composite value the rule applied to (e.g. `latitude`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Message template; `{fieldName}` is substituted at display time.
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            subtype: None,
            message: message.into(),
        }
    }

    /// The `required` rule for a whole property.
    pub fn required() -> Self {
        Self::new("required", "{fieldName} is required.")
    }

    /// The `required` rule for one part of a composite value.
    pub fn required_part(subtype: impl Into<String>) -> Self {
        Self {
            subtype: Some(subtype.into()),
            ..Self::required()
        }
    }

    /// Renders the message for a concrete field name.
    pub fn render(&self, field_name: &str) -> String {
        self.message.replace("{fieldName}", field_name)
    }
}

/// Borrowed view of a property's current backing value.
#[derive(Debug, Clone, Copy)]
pub enum FieldRef<'a> {
    /// Raw scalar or enum integer.
    Value(&'a Value),
    /// Custom adapter instance; it validates itself.
    Adapter(&'a dyn DataType),
    Date(Option<&'a Timestamp>),
    /// To-one relation; `true` when a key or nested record is present.
    One(bool),
    /// To-many relation; number of members.
    Many(usize),
}

impl FieldRef<'_> {
    /// Whether the value counts as absent for `required` purposes.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldRef::Value(Value::Null) => true,
            FieldRef::Value(Value::String(s)) => s.trim().is_empty(),
            FieldRef::Value(_) => false,
            FieldRef::Adapter(_) => false,
            FieldRef::Date(d) => d.is_none(),
            FieldRef::One(present) => !present,
            FieldRef::Many(_) => false,
        }
    }
}

/// Per-property validation rules for an entity.
///
/// Validation is advisory: the entity stores the result in its error map and
/// never refuses a local mutation because of it.
pub trait Validator: Send + Sync {
    /// Returns every failure for one property; empty means valid.
    fn validate(&self, property: &Property, value: FieldRef<'_>) -> Vec<ValidationError>;
}

/// Default rules: adapters validate themselves, non-nullable properties
/// must not be null or blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredValidator;

impl Validator for RequiredValidator {
    fn validate(&self, property: &Property, value: FieldRef<'_>) -> Vec<ValidationError> {
        if let FieldRef::Adapter(adapter) = value {
            return adapter.validate();
        }
        if !property.nullable && value.is_blank() {
            return vec![ValidationError::required()];
        }
        Vec::new()
    }
}
