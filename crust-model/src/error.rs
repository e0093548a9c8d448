//! Schema definition errors.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while building or registering a model schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The schema has no `id` property.
    #[error("model {0} has no id property")]
    MissingId(String),

    /// The `id` property is not an integer or GUID scalar.
    #[error("model {model}: id property must be an integer or guid, got {found}")]
    InvalidKey { model: String, found: String },

    /// Two properties share a name.
    #[error("model {model}: duplicate property {property}")]
    DuplicateProperty { model: String, property: String },

    /// A model with this name is already registered.
    #[error("model already registered: {0}")]
    AlreadyRegistered(String),
}
