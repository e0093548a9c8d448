//! Cached records.
//!
//! An [`Entity`] is a shared handle to one record of one model. Property
//! access goes through the [`Strategy`] the schema resolved for each field:
//! enums read as labels and store integers, dates are coerced, adapters wrap
//! the wire value, and relations store keys that resolve through the owning
//! [`Database`] on access.
//!
//! Locking: an entity's state lock is never held while calling into a table,
//! a collection or another entity. Work that crosses objects is computed
//! before the lock is taken or applied after it is released.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crust_model::{DataType, FieldRef, ModelSchema, Strategy, Timestamp, ValidationError};
use crust_types::{KeyType, RecordId};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::collection::{Collection, Member};
use crate::database::{Database, DbHandle};
use crate::error::{CacheError, CacheResult, FetchError};
use crate::observe::{lock, Observable};
use crate::table::{Table, TableInner};

/// Where an entity is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created locally and never saved.
    New,
    /// Placeholder for a known identity whose data has not arrived.
    Loading,
    /// Populated from server data at least once.
    Loaded,
}

enum Link {
    Empty,
    Key(RecordId),
    Detached(Entity),
}

impl From<Option<Member>> for Link {
    fn from(member: Option<Member>) -> Self {
        match member {
            None => Link::Empty,
            Some(Member::Key(id)) => Link::Key(id),
            Some(Member::Detached(entity)) => Link::Detached(entity),
        }
    }
}

/// Backing storage for one property.
enum Slot {
    Raw(Value),
    Date(Option<Timestamp>),
    Adapter(Box<dyn DataType>),
    One(Link),
    Many(Collection),
}

impl Slot {
    fn empty(model: &ModelSchema, index: usize, db: &DbHandle) -> Self {
        let property = model.property_at(index);
        match model.strategy_at(index) {
            Strategy::Scalar | Strategy::Enum(_) | Strategy::EnumList(_) => Slot::Raw(Value::Null),
            Strategy::Flag(_) => Slot::Adapter(crust_model::Flag::boxed(&property.config)),
            Strategy::Date => Slot::Date(None),
            Strategy::Adapter(factory) => Slot::Adapter(factory(&property.config)),
            Strategy::One { .. } => Slot::One(Link::Empty),
            Strategy::Many { model: target, .. } => {
                Slot::Many(Collection::new(target.clone(), db.clone()))
            }
        }
    }

    fn field_ref(&self) -> FieldRef<'_> {
        match self {
            Slot::Raw(value) => FieldRef::Value(value),
            Slot::Date(ts) => FieldRef::Date(ts.as_ref()),
            Slot::Adapter(adapter) => FieldRef::Adapter(adapter.as_ref()),
            Slot::One(link) => FieldRef::One(!matches!(link, Link::Empty)),
            Slot::Many(collection) => FieldRef::Many(collection.len()),
        }
    }
}

/// A property read finished outside the state lock.
enum Read {
    Value(Value),
    Detached(Entity),
    Many(Collection),
}

/// Pending relation change computed outside the state lock.
enum LinkUpdate {
    One(Option<Member>),
    Many(Vec<Member>),
}

struct EntityState {
    id: Option<RecordId>,
    owner: Option<Weak<TableInner>>,
    slots: Vec<Slot>,
    lifecycle: Lifecycle,
    fetching: bool,
    saving: bool,
    modified: bool,
    fetch_error: Option<FetchError>,
    errors: BTreeMap<String, Vec<ValidationError>>,
}

struct EntityInner {
    model: Arc<ModelSchema>,
    db: DbHandle,
    state: Mutex<EntityState>,
    revision: Observable<u64>,
    properties: Vec<Observable<u64>>,
    loaded: Observable<bool>,
}

/// Shared handle to one cached record.
///
/// Clones are cheap and refer to the same record; use [`Entity::ptr_eq`] to
/// compare identity.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

impl Entity {
    /// Creates an unsaved record that is not attached to any database.
    ///
    /// Relations on a detached entity can hold keys but cannot resolve them.
    pub fn new(model: Arc<ModelSchema>) -> Self {
        Self::build(model, DbHandle::default(), None, None, Lifecycle::New, true)
    }

    /// Unsaved record attached to a database; saving adopts it into its table.
    pub(crate) fn create(model: Arc<ModelSchema>, db: DbHandle) -> Self {
        Self::build(model, db, None, None, Lifecycle::New, true)
    }

    /// Table-owned placeholder for a known identity.
    pub(crate) fn placeholder(
        model: Arc<ModelSchema>,
        db: DbHandle,
        owner: Weak<TableInner>,
        id: RecordId,
    ) -> Self {
        let entity = Self::build(model, db, Some(id), Some(owner), Lifecycle::Loading, false);
        entity.write_identity_slot(id);
        entity
    }

    fn build(
        model: Arc<ModelSchema>,
        db: DbHandle,
        id: Option<RecordId>,
        owner: Option<Weak<TableInner>>,
        lifecycle: Lifecycle,
        modified: bool,
    ) -> Self {
        let slots = (0..model.len()).map(|i| Slot::empty(&model, i, &db)).collect();
        let properties = (0..model.len()).map(|_| Observable::new(0)).collect();
        Self {
            inner: Arc::new(EntityInner {
                db,
                state: Mutex::new(EntityState {
                    id,
                    owner,
                    slots,
                    lifecycle,
                    fetching: false,
                    saving: false,
                    modified,
                    fetch_error: None,
                    errors: BTreeMap::new(),
                }),
                revision: Observable::new(0),
                properties,
                loaded: Observable::new(false),
                model,
            }),
        }
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn id(&self) -> Option<RecordId> {
        lock(&self.inner.state).id
    }

    pub fn model(&self) -> &Arc<ModelSchema> {
        &self.inner.model
    }

    /// Whether both handles refer to the same record instance.
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn database(&self) -> Option<Database> {
        self.inner.db.upgrade()
    }

    /// The table this record's model lives in.
    pub fn table(&self) -> Option<Table> {
        self.database().map(|db| db.table(&self.inner.model))
    }

    // ── Status ───────────────────────────────────────────────────────

    pub fn lifecycle(&self) -> Lifecycle {
        lock(&self.inner.state).lifecycle
    }

    pub fn is_loaded(&self) -> bool {
        self.lifecycle() == Lifecycle::Loaded
    }

    pub fn is_fetching(&self) -> bool {
        lock(&self.inner.state).fetching
    }

    pub fn is_saving(&self) -> bool {
        lock(&self.inner.state).saving
    }

    /// Whether local changes have not been saved.
    pub fn is_modified(&self) -> bool {
        lock(&self.inner.state).modified
    }

    /// Why the last fetch failed. Cleared by the next successful populate.
    pub fn fetch_error(&self) -> Option<FetchError> {
        lock(&self.inner.state).fetch_error.clone()
    }

    /// Validation failures by property name, from the last [`Entity::validate`].
    pub fn errors(&self) -> BTreeMap<String, Vec<ValidationError>> {
        lock(&self.inner.state).errors.clone()
    }

    pub fn has_error(&self, property: &str) -> bool {
        lock(&self.inner.state)
            .errors
            .get(property)
            .is_some_and(|e| !e.is_empty())
    }

    /// Resolves once the entity has been populated.
    pub fn loaded(&self) -> BoxFuture<'static, ()> {
        let mut rx = self.inner.loaded.subscribe();
        async move {
            let _ = rx.wait_for(|loaded| *loaded).await;
        }
        .boxed()
    }

    /// Revision counter bumped on every change to values or status flags.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Revision counter bumped when one property's value changes.
    pub fn watch_property(&self, property: &str) -> Option<watch::Receiver<u64>> {
        let index = self.index_of(property)?;
        Some(self.inner.properties[index].subscribe())
    }

    // ── Property access ──────────────────────────────────────────────

    /// Reads a property in its normalized form.
    ///
    /// Enums read as labels, flags as label lists, dates in their wire shape,
    /// adapters as their value. Relations read as their key (or key list);
    /// use [`Entity::one`] and [`Entity::many`] to resolve them.
    pub fn get(&self, property: &str) -> Option<Value> {
        let index = self.index_of(property)?;
        let strategy = self.inner.model.strategy_at(index);
        let read = {
            let state = lock(&self.inner.state);
            match &state.slots[index] {
                Slot::One(Link::Detached(entity)) => Read::Detached(entity.clone()),
                Slot::Many(collection) => Read::Many(collection.clone()),
                slot => Read::Value(read_slot(strategy, slot)),
            }
        };
        Some(match read {
            Read::Value(value) => value,
            Read::Detached(entity) => entity.id().map_or(Value::Null, |id| id.to_value()),
            Read::Many(collection) => {
                Value::Array(collection.keys().iter().map(RecordId::to_value).collect())
            }
        })
    }

    /// Reads a date property.
    pub fn date(&self, property: &str) -> Option<Timestamp> {
        let index = self.index_of(property)?;
        match &lock(&self.inner.state).slots[index] {
            Slot::Date(ts) => ts.clone(),
            _ => None,
        }
    }

    /// Writes a property from its normalized form and marks the entity
    /// modified. Returns `false` (and logs) when the value does not fit.
    pub fn set(&self, property: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let Some(index) = self.index_of(property) else {
            return false;
        };
        let model = Arc::clone(&self.inner.model);
        match model.strategy_at(index) {
            Strategy::One {
                model: target,
                foreign_key,
            } => return self.set_one(index, target, foreign_key, &value),
            Strategy::Many {
                model: target,
                foreign_key,
            } => return self.set_many(index, target, foreign_key, &value),
            _ => {}
        }
        if property == "id" {
            return self.set_identity(&value);
        }

        {
            let mut state = lock(&self.inner.state);
            if let Err(reason) = write_slot(
                model.strategy_at(index),
                &mut state.slots[index],
                &value,
                false,
            ) {
                warn!(model = model.name(), property, %value, "rejected value: {}", reason);
                return false;
            }
            state.modified = true;
        }

        if let Some(relation) = model.relation_for_foreign_key(property) {
            self.link_from_key(relation, &value);
        }
        self.notify(&[index]);
        true
    }

    /// Resolves a to-one relation.
    pub fn one(&self, property: &str) -> Option<Entity> {
        let index = self.index_of(property)?;
        let Strategy::One { model: target, .. } = self.inner.model.strategy_at(index) else {
            warn!(
                model = self.inner.model.name(),
                property, "not a to-one relation"
            );
            return None;
        };
        let id = match &lock(&self.inner.state).slots[index] {
            Slot::One(Link::Key(id)) => *id,
            Slot::One(Link::Detached(entity)) => return Some(entity.clone()),
            _ => return None,
        };
        self.database()?.table_by_name(target)?.get(id)
    }

    /// The live collection behind a to-many relation.
    pub fn many(&self, property: &str) -> Option<Collection> {
        let index = self.index_of(property)?;
        match &lock(&self.inner.state).slots[index] {
            Slot::Many(collection) => Some(collection.clone()),
            _ => {
                warn!(
                    model = self.inner.model.name(),
                    property, "not a to-many relation"
                );
                None
            }
        }
    }

    // ── Serialization ────────────────────────────────────────────────

    /// Replaces field values from a server record.
    ///
    /// Embedded related records are handed to their own tables. Clears the
    /// modified flag, fetch error and validation errors, and signals load
    /// completion. Returns the record's unrecognized field names.
    pub fn populate(&self, record: &Value) -> Vec<String> {
        let model = Arc::clone(&self.inner.model);
        let Some(fields) = record.as_object() else {
            warn!(model = model.name(), %record, "populate expects an object");
            return Vec::new();
        };

        let links = self.relation_updates(fields);

        let mut changed = Vec::with_capacity(fields.len());
        let mut unknown = Vec::new();
        let mut collections = Vec::new();
        let (first, owner) = {
            let mut state = lock(&self.inner.state);
            for (name, value) in fields {
                let Some(index) = model.index_of(name) else {
                    if model.relation_for_foreign_key(name).is_none() {
                        unknown.push(name.clone());
                    }
                    continue;
                };
                let strategy = model.strategy_at(index);
                if strategy.is_relation() {
                    continue;
                }
                if name == "id" && !accept_identity(&mut state, model.key_type(), value) {
                    warn!(
                        model = model.name(),
                        current = ?state.id,
                        %value,
                        "ignoring identity change"
                    );
                    continue;
                }
                match write_slot(strategy, &mut state.slots[index], value, true) {
                    Ok(()) => changed.push(index),
                    Err(reason) => {
                        warn!(model = model.name(), property = %name, %value, "skipped: {}", reason);
                    }
                }
            }

            for (index, update) in links {
                match (update, &mut state.slots[index]) {
                    (LinkUpdate::One(member), slot) => *slot = Slot::One(member.into()),
                    (LinkUpdate::Many(members), Slot::Many(collection)) => {
                        collections.push((collection.clone(), members));
                    }
                    (LinkUpdate::Many(_), _) => continue,
                }
                changed.push(index);
            }

            state.modified = false;
            state.fetching = false;
            state.fetch_error = None;
            state.errors.clear();
            let first = state.lifecycle != Lifecycle::Loaded;
            state.lifecycle = Lifecycle::Loaded;
            (first, state.owner.clone())
        };

        for (collection, members) in collections {
            collection.replace_all(members);
        }
        self.notify(&changed);
        self.inner.loaded.set(true);
        if let Some(table) = owner.as_ref().and_then(Table::upgrade) {
            table.note_loaded(self);
        }

        if first {
            debug!(model = model.name(), id = ?self.id(), "loaded");
        }
        if !unknown.is_empty() {
            warn!(model = model.name(), fields = ?unknown, "ignoring unknown fields");
        }
        unknown
    }

    /// Plain record for sending to the server.
    ///
    /// Omits server-owned audit fields and relations (their foreign keys are
    /// exported when declared as properties). Enums export their integer and
    /// adapters their wire value.
    pub fn export(&self) -> Value {
        let model = &self.inner.model;
        let state = lock(&self.inner.state);
        let mut out = Map::new();
        for (index, property) in model.properties().iter().enumerate() {
            if model.is_audit(&property.name) {
                continue;
            }
            let value = match &state.slots[index] {
                Slot::Raw(value) => value.clone(),
                Slot::Date(ts) => ts.as_ref().map_or(Value::Null, Timestamp::to_value),
                Slot::Adapter(adapter) => adapter.raw(),
                Slot::One(_) | Slot::Many(_) => continue,
            };
            out.insert(property.name.clone(), value);
        }
        Value::Object(out)
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Runs the schema's validator over one property, or all of them.
    ///
    /// Replaces the stored errors for the validated scope and returns whether
    /// that scope is valid.
    pub fn validate(&self, property: Option<&str>) -> bool {
        let model = &self.inner.model;
        let scope: Vec<usize> = match property {
            Some(name) => match self.index_of(name) {
                Some(index) => vec![index],
                None => return false,
            },
            None => (0..model.len()).collect(),
        };

        let valid = {
            let mut state = lock(&self.inner.state);
            let mut found = Vec::new();
            for &index in &scope {
                let prop = model.property_at(index);
                let errors = model
                    .validator()
                    .validate(prop, state.slots[index].field_ref());
                found.push((prop.name.clone(), errors));
            }
            let mut valid = true;
            for (name, errors) in found {
                if errors.is_empty() {
                    state.errors.remove(&name);
                } else {
                    valid = false;
                    state.errors.insert(name, errors);
                }
            }
            valid
        };
        self.inner.revision.bump();
        valid
    }

    // ── Persistence shortcuts ────────────────────────────────────────

    /// Saves through the owning table.
    pub async fn save(&self) -> CacheResult<Entity> {
        self.attached_table()?.save(self).await
    }

    /// Deletes through the owning table.
    pub async fn delete(&self) -> CacheResult<()> {
        self.attached_table()?.delete(self).await
    }

    /// Re-fetches through the owning table.
    pub async fn refresh(&self) -> CacheResult<Entity> {
        self.attached_table()?.refresh(self).await
    }

    /// Drops the record from its table without touching the server.
    pub fn remove(&self) -> bool {
        self.table().is_some_and(|table| table.remove(self))
    }

    fn attached_table(&self) -> CacheResult<Table> {
        self.table().ok_or_else(|| CacheError::Detached {
            model: self.inner.model.name().to_string(),
        })
    }

    // ── Table hooks ──────────────────────────────────────────────────

    /// Marks the entity as fetching unless it already is or has failed.
    pub(crate) fn begin_fetch(&self) -> bool {
        let started = {
            let mut state = lock(&self.inner.state);
            if state.fetching || state.fetch_error.is_some() {
                false
            } else {
                state.fetching = true;
                true
            }
        };
        if started {
            self.inner.revision.bump();
        }
        started
    }

    /// Marks the entity as fetching for an explicit refresh, even after a
    /// failed fetch.
    pub(crate) fn force_fetch(&self) {
        self.update_state(|state| state.fetching = true);
    }

    pub(crate) fn fail_fetch(&self, error: FetchError) {
        self.update_state(|state| {
            state.fetching = false;
            state.fetch_error = Some(error);
        });
    }

    pub(crate) fn set_saving(&self, saving: bool) {
        self.update_state(|state| state.saving = saving);
    }

    pub(crate) fn mark_clean(&self) {
        self.update_state(|state| state.modified = false);
    }

    /// Gives an unsaved entity its server identity and table.
    pub(crate) fn adopt(&self, id: RecordId, owner: Weak<TableInner>) {
        self.update_state(|state| {
            state.id.get_or_insert(id);
            state.owner = Some(owner);
        });
        self.write_identity_slot(id);
    }

    fn update_state(&self, f: impl FnOnce(&mut EntityState)) {
        f(&mut lock(&self.inner.state));
        self.inner.revision.bump();
    }

    fn write_identity_slot(&self, id: RecordId) {
        if let Some(index) = self.inner.model.index_of("id") {
            lock(&self.inner.state).slots[index] = Slot::Raw(id.to_value());
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn index_of(&self, property: &str) -> Option<usize> {
        let index = self.inner.model.index_of(property);
        if index.is_none() {
            warn!(
                model = self.inner.model.name(),
                property, "unknown property"
            );
        }
        index
    }

    fn notify(&self, indices: &[usize]) {
        for &index in indices {
            self.inner.properties[index].bump();
        }
        self.inner.revision.bump();
    }

    fn set_identity(&self, value: &Value) -> bool {
        let model = &self.inner.model;
        let accepted = {
            let mut state = lock(&self.inner.state);
            let accepted = accept_identity(&mut state, model.key_type(), value);
            if accepted {
                if let (Some(index), Some(id)) = (model.index_of("id"), state.id) {
                    state.slots[index] = Slot::Raw(id.to_value());
                    state.modified = true;
                }
            }
            accepted
        };
        if accepted {
            self.notify(&[]);
        } else {
            warn!(model = model.name(), %value, "identity is immutable once assigned");
        }
        accepted
    }

    fn set_one(&self, index: usize, target: &str, foreign_key: &str, value: &Value) -> bool {
        let member = match value {
            Value::Null => None,
            Value::Object(_) => match self.resolve_embedded(target, value, self.detached_at(index)) {
                Some(member) => Some(member),
                None => return false,
            },
            other => match self.read_key(target, other) {
                Some(id) => Some(Member::Key(id)),
                None => {
                    warn!(model = self.inner.model.name(), %value, "not a {} key", target);
                    return false;
                }
            },
        };
        let key = member
            .as_ref()
            .and_then(Member::key)
            .map_or(Value::Null, |id| id.to_value());

        let fk_index = self.inner.model.index_of(foreign_key);
        {
            let mut state = lock(&self.inner.state);
            state.slots[index] = Slot::One(member.into());
            if let Some(fk) = fk_index {
                state.slots[fk] = Slot::Raw(key);
            }
            state.modified = true;
        }
        self.notify(&[Some(index), fk_index].into_iter().flatten().collect::<Vec<_>>());
        true
    }

    fn set_many(&self, index: usize, target: &str, foreign_key: &str, value: &Value) -> bool {
        let members = match value {
            Value::Null => Vec::new(),
            Value::Array(items) => {
                let resolved: Option<Vec<Member>> = items
                    .iter()
                    .map(|item| self.member_from(target, item))
                    .collect();
                match resolved {
                    Some(members) => members,
                    None => {
                        warn!(model = self.inner.model.name(), %value, "not a list of {} records", target);
                        return false;
                    }
                }
            }
            _ => {
                warn!(model = self.inner.model.name(), %value, "expected a list");
                return false;
            }
        };
        let keys = Value::Array(
            members
                .iter()
                .filter_map(Member::key)
                .map(|id| id.to_value())
                .collect(),
        );

        let fk_index = self.inner.model.index_of(foreign_key);
        let collection = {
            let mut state = lock(&self.inner.state);
            if let Some(fk) = fk_index {
                state.slots[fk] = Slot::Raw(keys);
            }
            state.modified = true;
            match &state.slots[index] {
                Slot::Many(collection) => collection.clone(),
                _ => return false,
            }
        };
        collection.replace_all(members);
        self.notify(&[Some(index), fk_index].into_iter().flatten().collect::<Vec<_>>());
        true
    }

    /// Points a relation at the key(s) just written to its foreign-key field.
    fn link_from_key(&self, relation: usize, value: &Value) {
        let update = match self.inner.model.strategy_at(relation) {
            Strategy::One { model: target, .. } => {
                LinkUpdate::One(self.read_key(target, value).map(Member::Key))
            }
            Strategy::Many { model: target, .. } => LinkUpdate::Many(
                value
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|v| self.read_key(target, v).map(Member::Key))
                    .collect(),
            ),
            _ => return,
        };
        let collection = {
            let mut state = lock(&self.inner.state);
            match (update, &mut state.slots[relation]) {
                (LinkUpdate::One(member), slot) => {
                    *slot = Slot::One(member.into());
                    None
                }
                (LinkUpdate::Many(members), Slot::Many(collection)) => {
                    Some((collection.clone(), members))
                }
                (LinkUpdate::Many(_), _) => None,
            }
        };
        if let Some((collection, members)) = collection {
            collection.replace_all(members);
        }
        self.notify(&[relation]);
    }

    /// Computes relation changes carried by a server record.
    ///
    /// A foreign-key field wins over an embedded record for the stored link;
    /// embedded records are always handed to their table.
    fn relation_updates(&self, fields: &Map<String, Value>) -> Vec<(usize, LinkUpdate)> {
        let model = &self.inner.model;
        let mut updates = Vec::new();
        for index in 0..model.len() {
            let Some((target, foreign_key)) = model.strategy_at(index).relation() else {
                continue;
            };
            let name = &model.property_at(index).name;
            let embedded = fields.get(name);
            let keyed = fields.get(foreign_key);

            let update = match model.strategy_at(index) {
                Strategy::One { .. } => {
                    let from_embedded = match embedded {
                        Some(v @ Value::Object(_)) => {
                            self.resolve_embedded(target, v, self.detached_at(index))
                        }
                        Some(v) if !v.is_null() => self.read_key(target, v).map(Member::Key),
                        _ => None,
                    };
                    match keyed {
                        Some(v) => LinkUpdate::One(self.read_key(target, v).map(Member::Key)),
                        None if embedded.is_some() => LinkUpdate::One(from_embedded),
                        None => continue,
                    }
                }
                Strategy::Many { .. } => {
                    let from_embedded: Vec<Member> = embedded
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                        .filter_map(|item| self.member_from(target, item))
                        .collect();
                    match keyed {
                        Some(v) => LinkUpdate::Many(
                            v.as_array()
                                .into_iter()
                                .flatten()
                                .filter_map(|k| self.read_key(target, k).map(Member::Key))
                                .collect(),
                        ),
                        None if embedded.is_some() => LinkUpdate::Many(from_embedded),
                        None => continue,
                    }
                }
                _ => continue,
            };
            updates.push((index, update));
        }
        updates
    }

    fn member_from(&self, target: &str, item: &Value) -> Option<Member> {
        match item {
            Value::Object(_) => self.resolve_embedded(target, item, None),
            other => self.read_key(target, other).map(Member::Key),
        }
    }

    /// Turns an embedded related record into a relation member.
    ///
    /// Records with an identity go through the target table so the single
    /// cached instance is updated; records without one become (or update) a
    /// detached entity.
    fn resolve_embedded(&self, target: &str, record: &Value, current: Option<Entity>) -> Option<Member> {
        let Some(db) = self.database() else {
            warn!(model = self.inner.model.name(), "cannot resolve embedded {} without a database", target);
            return None;
        };
        let Some(schema) = db.model(target) else {
            warn!(model = self.inner.model.name(), "relation to unregistered model {}", target);
            return None;
        };
        match record.get("id").and_then(|v| schema.key_type().read(v)) {
            Some(id) => {
                db.table(&schema).add(id, Some(record));
                Some(Member::Key(id))
            }
            None => {
                let entity = current.unwrap_or_else(|| Entity::create(schema, db.handle()));
                entity.populate(record);
                Some(Member::Detached(entity))
            }
        }
    }

    fn detached_at(&self, index: usize) -> Option<Entity> {
        match &lock(&self.inner.state).slots[index] {
            Slot::One(Link::Detached(entity)) => Some(entity.clone()),
            _ => None,
        }
    }

    fn read_key(&self, target: &str, value: &Value) -> Option<RecordId> {
        match self.database().and_then(|db| db.model(target)) {
            Some(schema) => schema.key_type().read(value),
            None => KeyType::Integer
                .read(value)
                .or_else(|| KeyType::Guid.read(value)),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (id, lifecycle) = match self.inner.state.try_lock() {
            Ok(state) => (state.id, Some(state.lifecycle)),
            Err(_) => (None, None),
        };
        f.debug_struct("Entity")
            .field("model", &self.inner.model.name())
            .field("id", &id)
            .field("lifecycle", &lifecycle)
            .finish()
    }
}

/// Accepts `value` as the identity unless a different one is already set.
fn accept_identity(state: &mut EntityState, key_type: KeyType, value: &Value) -> bool {
    match (state.id, key_type.read(value)) {
        (None, Some(id)) => {
            state.id = Some(id);
            true
        }
        (Some(current), Some(id)) => current == id,
        (None, None) => value.is_null(),
        (Some(_), None) => false,
    }
}

fn read_slot(strategy: &Strategy, slot: &Slot) -> Value {
    match (strategy, slot) {
        (Strategy::Enum(e), Slot::Raw(raw)) => e.label_value(raw),
        (Strategy::EnumList(e), Slot::Raw(Value::Array(items))) => {
            Value::Array(items.iter().map(|v| e.label_value(v)).collect())
        }
        (Strategy::Flag(e), Slot::Adapter(flag)) => Value::Array(
            flag.value()
                .as_array()
                .into_iter()
                .flatten()
                .map(|bit| e.label_value(bit))
                .filter(|label| !label.is_null())
                .collect(),
        ),
        (_, Slot::Raw(raw)) => raw.clone(),
        (_, Slot::Date(ts)) => ts.as_ref().map_or(Value::Null, Timestamp::to_value),
        (_, Slot::Adapter(adapter)) => adapter.value(),
        (_, Slot::One(Link::Key(id))) => id.to_value(),
        (_, Slot::One(_) | Slot::Many(_)) => Value::Null,
    }
}

/// Stores `value` into a non-relation slot.
///
/// Adapters always take the wire value. Flags additionally accept a label
/// list when the value comes from the caller rather than the server.
fn write_slot(strategy: &Strategy, slot: &mut Slot, value: &Value, wire: bool) -> Result<(), &'static str> {
    match (strategy, slot) {
        (Strategy::Enum(e), Slot::Raw(raw)) => {
            *raw = match value {
                Value::Null => Value::Null,
                v => Value::from(e.coerce(v).ok_or("not a member of the enumeration")?),
            };
        }
        (Strategy::EnumList(e), Slot::Raw(raw)) => {
            *raw = match value {
                Value::Null => Value::Null,
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|v| e.coerce(v).map(Value::from))
                        .collect::<Option<Vec<_>>>()
                        .ok_or("list holds a non-member of the enumeration")?,
                ),
                _ => return Err("expected a list"),
            };
        }
        (Strategy::Flag(e), Slot::Adapter(flag)) => match value {
            Value::Array(items) if !wire => {
                let bits = items
                    .iter()
                    .map(|v| e.coerce(v).map(Value::from))
                    .collect::<Option<Vec<_>>>()
                    .ok_or("flag list holds a non-member of the enumeration")?;
                flag.set_value(&Value::Array(bits));
            }
            Value::Number(_) | Value::Null => flag.set_raw(value),
            _ => return Err("expected a flag integer or label list"),
        },
        (Strategy::Date, Slot::Date(ts)) => {
            *ts = match value {
                Value::Null => None,
                v => Some(Timestamp::parse(v).ok_or("not a recognizable date")?),
            };
        }
        (_, Slot::Adapter(adapter)) => adapter.set_raw(value),
        (_, Slot::Raw(raw)) => *raw = value.clone(),
        (_, Slot::Date(_)) => return Err("date slot without a date strategy"),
        (_, Slot::One(_) | Slot::Many(_)) => return Err("relations are set through their accessors"),
    }
    Ok(())
}
