//! Static model definitions for the crust entity cache.
//!
//! Defines everything about an entity type that does not depend on a live
//! cache:
//! - [`ModelSchema`]: ordered property list, key type, REST source path, and
//!   the accessor [`Strategy`] resolved once per property at build time
//! - [`PropertyType`] / [`Property`]: declarative field definitions
//! - [`EnumType`] and [`Timestamp`]: enumerated and date field support
//! - [`DataType`]: the scalar adapter contract, with built-in [`Flag`],
//!   [`BitArray`] and [`Point`] adapters
//! - [`Validator`]: the per-field validation contract, with the default
//!   [`RequiredValidator`]
//! - [`SchemaRegistry`]: explicit registration of models at startup
//!
//! The cache crate consumes these types; nothing here performs I/O.

mod adapter;
mod enumeration;
mod error;
mod registry;
mod schema;
mod timestamp;
mod validate;

pub use adapter::{AdapterFactory, BitArray, DataType, Flag, Point};
pub use enumeration::EnumType;
pub use error::{SchemaError, SchemaResult};
pub use registry::SchemaRegistry;
pub use schema::{
    ModelSchema, ModelSchemaBuilder, Primitive, Property, PropertyConfig, PropertyType, Strategy,
    DEFAULT_AUDIT_FIELDS,
};
pub use timestamp::Timestamp;
pub use validate::{FieldRef, RequiredValidator, ValidationError, Validator};
