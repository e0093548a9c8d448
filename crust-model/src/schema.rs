use crust_types::KeyType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::AdapterFactory;
use crate::enumeration::EnumType;
use crate::error::{SchemaError, SchemaResult};
use crate::validate::{RequiredValidator, Validator};

/// Fields the server owns; never sent back on save.
pub const DEFAULT_AUDIT_FIELDS: &[&str] = &["id", "created", "updated"];

/// Plain wire scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Integer,
    Number,
    Boolean,
    Guid,
    Json,
}

/// The declared logical type of a property.
#[derive(Clone)]
pub enum PropertyType {
    Scalar(Primitive),
    /// Single integer mapped to a label.
    Enum(EnumType),
    /// Sequence of integers, each mapped to a label.
    EnumList(EnumType),
    /// Bit-flag enum: one wire integer, many labels.
    Flag(EnumType),
    Date,
    /// To-one relation to the named model.
    One(String),
    /// To-many relation to the named model.
    Many(String),
    /// Custom scalar adapter.
    Adapter(AdapterFactory),
}

impl PropertyType {
    /// Short human-readable name for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            PropertyType::Scalar(p) => format!("{p:?}").to_lowercase(),
            PropertyType::Enum(e) => format!("enum {}", e.name()),
            PropertyType::EnumList(e) => format!("enum list {}", e.name()),
            PropertyType::Flag(e) => format!("flag {}", e.name()),
            PropertyType::Date => "date".to_string(),
            PropertyType::One(m) => format!("one {m}"),
            PropertyType::Many(m) => format!("many {m}"),
            PropertyType::Adapter(_) => "adapter".to_string(),
        }
    }
}

impl fmt::Debug for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Optional per-property settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyConfig {
    /// Explicit foreign-key field for a relation, instead of `<prop>Id(s)`.
    pub foreign_key: Option<String>,
    /// Width for fixed-width adapters such as [`crate::BitArray`].
    pub max_length: Option<usize>,
}

/// One field of a model.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub ty: PropertyType,
    pub nullable: bool,
    pub config: PropertyConfig,
}

impl Property {
    /// A nullable property of any type.
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            config: PropertyConfig::default(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Scalar(Primitive::String))
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Scalar(Primitive::Integer))
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Scalar(Primitive::Number))
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Scalar(Primitive::Boolean))
    }

    pub fn guid(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Scalar(Primitive::Guid))
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Scalar(Primitive::Json))
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Date)
    }

    pub fn enumeration(name: impl Into<String>, ty: EnumType) -> Self {
        Self::new(name, PropertyType::Enum(ty))
    }

    pub fn enum_list(name: impl Into<String>, ty: EnumType) -> Self {
        Self::new(name, PropertyType::EnumList(ty))
    }

    pub fn flag(name: impl Into<String>, ty: EnumType) -> Self {
        Self::new(name, PropertyType::Flag(ty))
    }

    pub fn one(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(name, PropertyType::One(model.into()))
    }

    pub fn many(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Many(model.into()))
    }

    pub fn adapter(name: impl Into<String>, factory: AdapterFactory) -> Self {
        Self::new(name, PropertyType::Adapter(factory))
    }

    /// Marks the property non-nullable.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn foreign_key(mut self, field: impl Into<String>) -> Self {
        self.config.foreign_key = Some(field.into());
        self
    }

    #[must_use]
    pub fn max_length(mut self, width: usize) -> Self {
        self.config.max_length = Some(width);
        self
    }
}

/// How an entity reads and writes one property, resolved once at build time.
#[derive(Clone)]
pub enum Strategy {
    Scalar,
    Enum(EnumType),
    EnumList(EnumType),
    Flag(EnumType),
    Date,
    One { model: String, foreign_key: String },
    Many { model: String, foreign_key: String },
    Adapter(AdapterFactory),
}

impl Strategy {
    fn resolve(property: &Property) -> Self {
        let fk = |suffix: &str| {
            property
                .config
                .foreign_key
                .clone()
                .unwrap_or_else(|| format!("{}{suffix}", property.name))
        };
        match &property.ty {
            PropertyType::Scalar(_) => Strategy::Scalar,
            PropertyType::Enum(e) => Strategy::Enum(e.clone()),
            PropertyType::EnumList(e) => Strategy::EnumList(e.clone()),
            PropertyType::Flag(e) => Strategy::Flag(e.clone()),
            PropertyType::Date => Strategy::Date,
            PropertyType::One(model) => Strategy::One {
                model: model.clone(),
                foreign_key: fk("Id"),
            },
            PropertyType::Many(model) => Strategy::Many {
                model: model.clone(),
                foreign_key: fk("Ids"),
            },
            PropertyType::Adapter(factory) => Strategy::Adapter(*factory),
        }
    }

    /// True for to-one and to-many relations.
    pub fn is_relation(&self) -> bool {
        matches!(self, Strategy::One { .. } | Strategy::Many { .. })
    }

    /// Target model and foreign-key field for relations.
    pub fn relation(&self) -> Option<(&str, &str)> {
        match self {
            Strategy::One { model, foreign_key } | Strategy::Many { model, foreign_key } => {
                Some((model, foreign_key))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Scalar => f.write_str("Scalar"),
            Strategy::Enum(e) => write!(f, "Enum({})", e.name()),
            Strategy::EnumList(e) => write!(f, "EnumList({})", e.name()),
            Strategy::Flag(e) => write!(f, "Flag({})", e.name()),
            Strategy::Date => f.write_str("Date"),
            Strategy::One { model, foreign_key } => write!(f, "One({model} via {foreign_key})"),
            Strategy::Many { model, foreign_key } => write!(f, "Many({model} via {foreign_key})"),
            Strategy::Adapter(_) => f.write_str("Adapter"),
        }
    }
}

/// Static definition of one entity type, shared by all its instances.
pub struct ModelSchema {
    name: String,
    source: String,
    key_type: KeyType,
    properties: Vec<Property>,
    strategies: Vec<Strategy>,
    by_name: HashMap<String, usize>,
    foreign_keys: HashMap<String, usize>,
    audit_fields: Vec<String>,
    validator: Arc<dyn Validator>,
    dto: bool,
}

impl ModelSchema {
    /// Starts a schema for model `name` served under REST path `source`.
    pub fn builder(name: impl Into<String>, source: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            name: name.into(),
            source: source.into(),
            properties: Vec::new(),
            audit_fields: None,
            validator: None,
            dto: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// REST path prefix for this model, e.g. `/api/Users`.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.index_of(name).map(|i| &self.properties[i])
    }

    pub fn property_at(&self, index: usize) -> &Property {
        &self.properties[index]
    }

    pub fn strategy_at(&self, index: usize) -> &Strategy {
        &self.strategies[index]
    }

    /// Relation property fed by the given foreign-key field, if any.
    pub fn relation_for_foreign_key(&self, field: &str) -> Option<usize> {
        self.foreign_keys.get(field).copied()
    }

    /// Whether the server owns this field.
    pub fn is_audit(&self, name: &str) -> bool {
        self.audit_fields.iter().any(|f| f == name)
    }

    pub fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }

    /// Transfer-only model: saved straight to the server, never cached.
    pub fn is_dto(&self) -> bool {
        self.dto
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("key_type", &self.key_type)
            .field("properties", &self.properties)
            .field("dto", &self.dto)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ModelSchema`].
pub struct ModelSchemaBuilder {
    name: String,
    source: String,
    properties: Vec<Property>,
    audit_fields: Option<Vec<String>>,
    validator: Option<Arc<dyn Validator>>,
    dto: bool,
}

impl ModelSchemaBuilder {
    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn properties(mut self, properties: impl IntoIterator<Item = Property>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Replaces the default server-owned field list.
    #[must_use]
    pub fn audit_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.audit_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the default [`RequiredValidator`].
    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Marks the model transfer-only; its records bypass the table cache.
    #[must_use]
    pub fn dto(mut self) -> Self {
        self.dto = true;
        self
    }

    pub fn build(self) -> SchemaResult<ModelSchema> {
        let mut by_name = HashMap::with_capacity(self.properties.len());
        for (i, property) in self.properties.iter().enumerate() {
            if by_name.insert(property.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateProperty {
                    model: self.name,
                    property: property.name.clone(),
                });
            }
        }

        let id = by_name
            .get("id")
            .map(|i| &self.properties[*i])
            .ok_or_else(|| SchemaError::MissingId(self.name.clone()))?;
        let key_type = match id.ty {
            PropertyType::Scalar(Primitive::Integer) => KeyType::Integer,
            PropertyType::Scalar(Primitive::Guid) => KeyType::Guid,
            ref other => {
                return Err(SchemaError::InvalidKey {
                    model: self.name,
                    found: other.describe(),
                });
            }
        };

        let strategies: Vec<Strategy> = self.properties.iter().map(Strategy::resolve).collect();
        let foreign_keys = strategies
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.relation().map(|(_, fk)| (fk.to_string(), i)))
            .collect();

        Ok(ModelSchema {
            name: self.name,
            source: self.source,
            key_type,
            properties: self.properties,
            strategies,
            by_name,
            foreign_keys,
            audit_fields: self.audit_fields.unwrap_or_else(|| {
                DEFAULT_AUDIT_FIELDS.iter().map(|s| s.to_string()).collect()
            }),
            validator: self.validator.unwrap_or_else(|| Arc::new(RequiredValidator)),
            dto: self.dto,
        })
    }
}
