//! Per-model record cache.
//!
//! A [`Table`] owns the identity → [`Entity`] map for one model. Reads never
//! block: [`Table::get`] hands out a placeholder at once and queues its
//! identity with the [`FetchCoordinator`], which merges every request made
//! within one debounce window into a single list call.
//!
//! All map and counter mutation happens in short synchronous sections; no
//! lock is held across an await.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crust_model::ModelSchema;
use crust_types::RecordId;
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::coordinator::{Batch, FetchCoordinator, Phase};
use crate::database::DbHandle;
use crate::entity::{Entity, Lifecycle};
use crate::error::{CacheError, CacheResult, FetchError, TransportResult};
use crate::indexer::{Direction, IndexKind, Indexer};
use crate::observe::{lock, Observable};
use crate::transport::Transport;

/// Names a record by identity or by handle.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Id(RecordId),
    Entity(&'a Entity),
}

impl From<RecordId> for Target<'_> {
    fn from(id: RecordId) -> Self {
        Target::Id(id)
    }
}

impl From<i32> for Target<'_> {
    fn from(id: i32) -> Self {
        Target::Id(id.into())
    }
}

impl From<i64> for Target<'_> {
    fn from(id: i64) -> Self {
        Target::Id(id.into())
    }
}

impl From<Uuid> for Target<'_> {
    fn from(id: Uuid) -> Self {
        Target::Id(id.into())
    }
}

impl<'a> From<&'a Entity> for Target<'a> {
    fn from(entity: &'a Entity) -> Self {
        Target::Entity(entity)
    }
}

enum Record {
    /// Identity known from a listing; no entity built yet.
    Known,
    Live(Entity),
}

struct TableState {
    records: HashMap<RecordId, Record>,
    loaded: HashSet<RecordId>,
}

type Task = Shared<BoxFuture<'static, ()>>;

#[derive(Default)]
struct InFlight {
    next: u64,
    tasks: HashMap<u64, Task>,
}

pub(crate) struct TableInner {
    model: Arc<ModelSchema>,
    db: DbHandle,
    transport: Arc<dyn Transport>,
    debounce: Duration,
    state: Mutex<TableState>,
    coordinator: Mutex<FetchCoordinator>,
    in_flight: Mutex<InFlight>,
    list_requested: AtomicBool,
    length: Observable<usize>,
    keys: Observable<Vec<RecordId>>,
    array: Observable<Vec<Entity>>,
    loaded: Observable<bool>,
    listed: Observable<bool>,
}

/// Cache of every known record of one model.
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

impl Table {
    pub(crate) fn new(
        model: Arc<ModelSchema>,
        db: DbHandle,
        transport: Arc<dyn Transport>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TableInner {
                model,
                db,
                transport,
                debounce: config.debounce(),
                state: Mutex::new(TableState {
                    records: HashMap::new(),
                    loaded: HashSet::new(),
                }),
                coordinator: Mutex::new(FetchCoordinator::new()),
                in_flight: Mutex::new(InFlight::default()),
                list_requested: AtomicBool::new(false),
                length: Observable::new(0),
                keys: Observable::new(Vec::new()),
                array: Observable::new(Vec::new()),
                loaded: Observable::new(false),
                listed: Observable::new(false),
            }),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<TableInner>) -> Option<Table> {
        weak.upgrade().map(|inner| Table { inner })
    }

    fn downgrade(&self) -> Weak<TableInner> {
        Arc::downgrade(&self.inner)
    }

    // ── Observable state ─────────────────────────────────────────────

    pub fn model(&self) -> &Arc<ModelSchema> {
        &self.inner.model
    }

    /// Number of known identities.
    pub fn len(&self) -> usize {
        self.inner.length.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Known identities in the order they became known.
    pub fn keys(&self) -> Vec<RecordId> {
        self.inner.keys.get()
    }

    /// Materialized entities in creation order.
    pub fn array(&self) -> Vec<Entity> {
        self.inner.array.get()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        lock(&self.inner.state).records.contains_key(id)
    }

    /// True once every known identity has been populated at least once.
    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.get()
    }

    /// Number of identities populated at least once.
    pub fn loaded_count(&self) -> usize {
        lock(&self.inner.state).loaded.len()
    }

    /// True once the full identity set has been fetched.
    pub fn is_listed(&self) -> bool {
        self.inner.listed.get()
    }

    pub fn phase(&self) -> Phase {
        lock(&self.inner.coordinator).phase()
    }

    /// Number of requests still running.
    pub fn in_flight(&self) -> usize {
        lock(&self.inner.in_flight).tasks.len()
    }

    pub fn watch_length(&self) -> watch::Receiver<usize> {
        self.inner.length.subscribe()
    }

    pub fn watch_keys(&self) -> watch::Receiver<Vec<RecordId>> {
        self.inner.keys.subscribe()
    }

    pub fn watch_array(&self) -> watch::Receiver<Vec<Entity>> {
        self.inner.array.subscribe()
    }

    pub fn watch_loaded(&self) -> watch::Receiver<bool> {
        self.inner.loaded.subscribe()
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Returns the cached entity, creating and queueing a placeholder if the
    /// identity has not been materialized yet.
    ///
    /// Never blocks. Returns `None` (and logs) for an identity of the wrong
    /// key type.
    pub fn get(&self, id: impl Into<RecordId>) -> Option<Entity> {
        let id = id.into();
        if !self.accepts(&id) {
            return None;
        }
        let (entity, created) = self.materialize(id);
        if created {
            self.queue(&entity, id);
        }
        Some(entity)
    }

    /// Upserts an identity. With `data` the entity is populated in place at
    /// once; without it the identity is only recorded as known.
    pub fn add(&self, id: impl Into<RecordId>, data: Option<&Value>) -> &Self {
        let id = id.into();
        if !self.accepts(&id) {
            return self;
        }
        match data {
            Some(record) => {
                let (entity, _) = self.materialize(id);
                entity.populate(record);
            }
            None => {
                let state = &mut *lock(&self.inner.state);
                if !state.records.contains_key(&id) {
                    state.records.insert(id, Record::Known);
                    self.inner.keys.update(|keys| keys.push(id));
                    self.sync_counts(state);
                }
            }
        }
        self
    }

    /// Drops a record locally. Returns whether it was present.
    pub fn remove<'a>(&self, target: impl Into<Target<'a>>) -> bool {
        let id = match target.into() {
            Target::Id(id) => id,
            Target::Entity(entity) => match entity.id() {
                Some(id) => id,
                None => {
                    warn!(model = self.inner.model.name(), "cannot remove an unsaved record");
                    return false;
                }
            },
        };
        let state = &mut *lock(&self.inner.state);
        let Some(record) = state.records.remove(&id) else {
            debug!(model = self.inner.model.name(), %id, "remove: not cached");
            return false;
        };
        state.loaded.remove(&id);
        self.inner.keys.update(|keys| keys.retain(|k| *k != id));
        if let Record::Live(entity) = record {
            self.inner
                .array
                .update(|array| array.retain(|e| !e.ptr_eq(&entity)));
        }
        self.sync_counts(state);
        true
    }

    /// Known identities; the first call also starts fetching the full
    /// identity set. Later calls never repeat the request.
    pub fn list(&self) -> Vec<RecordId> {
        if !self.inner.list_requested.swap(true, Ordering::AcqRel) {
            match Handle::try_current() {
                Ok(runtime) => {
                    let table = self.clone();
                    self.track(&runtime, async move {
                        if let Err(error) = table.pull_ids(false).await {
                            warn!(model = table.inner.model.name(), %error, "listing failed");
                        }
                    });
                }
                Err(_) => {
                    warn!(model = self.inner.model.name(), "no async runtime; list not fetched");
                    self.inner.list_requested.store(false, Ordering::Release);
                }
            }
        }
        self.keys()
    }

    /// Downloads every record in one request. Meant for small reference
    /// tables only. Returns the number of records received.
    pub async fn all(&self) -> CacheResult<usize> {
        let records = self.inner.transport.get_all(&self.inner.model).await?;
        let mut count = 0;
        for record in &records {
            match self.record_id(record) {
                Some(id) => {
                    self.add(id, Some(record));
                    count += 1;
                }
                None => warn!(model = self.inner.model.name(), %record, "record without a valid id"),
            }
        }
        self.inner.list_requested.store(true, Ordering::Release);
        self.inner.listed.set(true);
        info!(model = self.inner.model.name(), count, "downloaded all records");
        Ok(count)
    }

    /// Queues identities and flushes at once, skipping the debounce window.
    ///
    /// With a subset, placeholders are created as needed; without one, every
    /// known identity not yet loaded is queued. Entities already fetching or
    /// holding a fetch error are skipped. Resolves when every request in
    /// flight at return time has settled.
    pub fn load(&self, subset: Option<&[RecordId]>) -> BoxFuture<'static, ()> {
        let ids = match subset {
            Some(ids) => ids.to_vec(),
            None => {
                let loaded = lock(&self.inner.state).loaded.clone();
                self.keys()
                    .into_iter()
                    .filter(|id| !loaded.contains(id))
                    .collect()
            }
        };
        for id in ids {
            if !self.accepts(&id) {
                continue;
            }
            let (entity, _) = self.materialize(id);
            if entity.begin_fetch() {
                lock(&self.inner.coordinator).enqueue(id);
            }
        }
        lock(&self.inner.coordinator).disarm();
        self.flush();
        self.loader()
    }

    /// Resolves when every request currently in flight has settled.
    pub fn loader(&self) -> BoxFuture<'static, ()> {
        let tasks: Vec<Task> = lock(&self.inner.in_flight)
            .tasks
            .values()
            .cloned()
            .collect();
        join_all(tasks).map(drop).boxed()
    }

    // ── Server round trips ───────────────────────────────────────────

    /// Fetches one record again and populates it in place.
    pub async fn refresh<'a>(&self, target: impl Into<Target<'a>>) -> CacheResult<Entity> {
        let id = self.target_id(target.into())?;
        let (entity, _) = self.materialize(id);
        entity.force_fetch();
        match self.inner.transport.get_one(&self.inner.model, &id).await {
            Ok(record) => {
                self.add(id, Some(&record));
                Ok(entity)
            }
            Err(error) => {
                warn!(model = self.inner.model.name(), %id, %error, "refresh failed");
                entity.fail_fetch(FetchError::Transport(error.clone()));
                Err(error.into())
            }
        }
    }

    /// Fetches the full identity set, adding new identities and dropping
    /// ones the server no longer has.
    pub async fn refresh_list(&self) -> CacheResult<()> {
        self.inner.list_requested.store(true, Ordering::Release);
        self.pull_ids(true).await
    }

    /// Sends one record to the server and merges the response back.
    ///
    /// An unsaved entity adopts the identity the server assigns and joins the
    /// table. If the table already caches a different instance under that
    /// identity, the cached instance is updated and returned. Records of a
    /// transfer-only model take the response in place and are never cached.
    pub async fn save<'a>(&self, target: impl Into<Target<'a>>) -> CacheResult<Entity> {
        let entity = self.resolve(target.into())?;
        let record = self.outgoing(&entity);
        entity.set_saving(true);
        let result = self.inner.transport.save(&self.inner.model, record).await;
        entity.set_saving(false);
        let saved = result.inspect_err(|error| {
            warn!(model = self.inner.model.name(), id = ?entity.id(), %error, "save failed");
        })?;
        if self.inner.model.is_dto() {
            if saved.is_object() {
                entity.populate(&saved);
            } else {
                entity.mark_clean();
            }
            return Ok(entity);
        }
        Ok(self.accept_saved(&entity, &saved))
    }

    /// Saves several records in one request.
    ///
    /// With `None`, every modified entity in the table that is not still
    /// waiting for its first load is saved. Response records are matched to
    /// entities by identity, and unsaved entities by position.
    pub async fn save_all(&self, targets: Option<Vec<Target<'_>>>) -> CacheResult<Vec<Entity>> {
        let entities: Vec<Entity> = match targets {
            Some(targets) => targets
                .into_iter()
                .map(|target| self.resolve(target))
                .collect::<CacheResult<_>>()?,
            None => self
                .array()
                .into_iter()
                .filter(|e| e.is_modified() && e.lifecycle() != Lifecycle::Loading)
                .collect(),
        };
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let records = entities.iter().map(|e| self.outgoing(e)).collect();
        for entity in &entities {
            entity.set_saving(true);
        }
        let result = self
            .inner
            .transport
            .save_all(&self.inner.model, records)
            .await;
        for entity in &entities {
            entity.set_saving(false);
        }
        let saved = result.inspect_err(|error| {
            warn!(model = self.inner.model.name(), count = entities.len(), %error, "save all failed");
        })?;
        if saved.len() != entities.len() {
            warn!(
                model = self.inner.model.name(),
                sent = entities.len(),
                received = saved.len(),
                "save all answered a different number of records"
            );
        }

        let mut out = Vec::with_capacity(saved.len());
        for (position, record) in saved.iter().enumerate() {
            let id = self.record_id(record);
            let entity = id
                .and_then(|id| entities.iter().find(|e| e.id() == Some(id)))
                .or_else(|| entities.get(position).filter(|e| e.id().is_none()));
            match (entity, id) {
                (Some(entity), _) => out.push(self.accept_saved(entity, record)),
                (None, Some(id)) => {
                    self.add(id, Some(record));
                }
                (None, None) => warn!(model = self.inner.model.name(), %record, "unmatched save response"),
            }
        }
        Ok(out)
    }

    /// Deletes on the server, then drops the local record.
    pub async fn delete<'a>(&self, target: impl Into<Target<'a>>) -> CacheResult<()> {
        let id = self.target_id(target.into())?;
        self.inner
            .transport
            .delete(&self.inner.model, &id)
            .await
            .inspect_err(|error| {
                warn!(model = self.inner.model.name(), %id, %error, "delete failed");
            })?;
        self.remove(id);
        info!(model = self.inner.model.name(), %id, "deleted");
        Ok(())
    }

    // ── Indices ──────────────────────────────────────────────────────

    /// Identities ordered by `property`.
    ///
    /// Ordering by `id` is computed locally. Otherwise the cached index is
    /// returned; with a loaded index and a subset, a new indexer holds just
    /// the subset in index order. An unloaded index is returned as is.
    pub fn order_by(
        &self,
        property: &str,
        direction: Direction,
        subset: Option<&[RecordId]>,
    ) -> Indexer {
        if property == "id" {
            let mut ids = subset.map_or_else(|| self.keys(), <[RecordId]>::to_vec);
            ids.sort();
            if direction == Direction::Descending {
                ids.reverse();
            }
            return self.derived(IndexKind::Order, property, direction.spec(), ids);
        }

        let full = self.index(IndexKind::Order, property, direction.spec());
        match subset {
            Some(subset) if full.is_loaded() => {
                let ids = full.order_subset(subset);
                self.derived(IndexKind::Order, property, direction.spec(), ids)
            }
            _ => full,
        }
    }

    /// Identities whose `property` matches `spec`, under the same subset
    /// rules as [`Table::order_by`].
    pub fn equals(&self, property: &str, spec: &str, subset: Option<&[RecordId]>) -> Indexer {
        let full = self.index(IndexKind::Equals, property, spec);
        match subset {
            Some(subset) if full.is_loaded() => {
                let ids = full.filter_subset(subset);
                self.derived(IndexKind::Equals, property, spec, ids)
            }
            _ => full,
        }
    }

    fn index(&self, kind: IndexKind, property: &str, spec: &str) -> Indexer {
        match self.inner.db.upgrade() {
            Some(db) => db.index(&self.inner.model, kind, property, spec),
            None => Indexer::fetch(
                Arc::clone(&self.inner.model),
                DbHandle::default(),
                Arc::clone(&self.inner.transport),
                kind,
                property,
                spec,
                None,
            ),
        }
    }

    fn derived(&self, kind: IndexKind, property: &str, spec: &str, ids: Vec<RecordId>) -> Indexer {
        Indexer::derived(
            Arc::clone(&self.inner.model),
            self.inner.db.clone(),
            kind,
            property,
            spec,
            ids,
        )
    }

    // ── Entity hooks ─────────────────────────────────────────────────

    /// Counts a table-owned entity as loaded.
    pub(crate) fn note_loaded(&self, entity: &Entity) {
        let Some(id) = entity.id() else {
            return;
        };
        let state = &mut *lock(&self.inner.state);
        let owned = matches!(state.records.get(&id), Some(Record::Live(e)) if e.ptr_eq(entity));
        if owned && state.loaded.insert(id) {
            self.sync_counts(state);
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn accepts(&self, id: &RecordId) -> bool {
        let accepted = self.inner.model.key_type().accepts(id);
        if !accepted {
            warn!(
                model = self.inner.model.name(),
                %id,
                key_type = ?self.inner.model.key_type(),
                "mistyped identity"
            );
        }
        accepted
    }

    fn check(&self, id: &RecordId) -> CacheResult<()> {
        if self.accepts(id) {
            Ok(())
        } else {
            Err(CacheError::MistypedId {
                model: self.inner.model.name().to_string(),
                id: id.to_string(),
            })
        }
    }

    fn record_id(&self, record: &Value) -> Option<RecordId> {
        record
            .get("id")
            .and_then(|v| self.inner.model.key_type().read(v))
    }

    fn live(&self, id: &RecordId) -> Option<Entity> {
        match lock(&self.inner.state).records.get(id) {
            Some(Record::Live(entity)) => Some(entity.clone()),
            _ => None,
        }
    }

    fn target_id(&self, target: Target<'_>) -> CacheResult<RecordId> {
        let id = match target {
            Target::Id(id) => id,
            Target::Entity(entity) => entity.id().ok_or_else(|| CacheError::Unsaved {
                model: self.inner.model.name().to_string(),
            })?,
        };
        self.check(&id)?;
        Ok(id)
    }

    fn resolve(&self, target: Target<'_>) -> CacheResult<Entity> {
        match target {
            Target::Entity(entity) => Ok(entity.clone()),
            Target::Id(id) => {
                self.check(&id)?;
                self.live(&id).ok_or_else(|| CacheError::NotCached {
                    model: self.inner.model.name().to_string(),
                    id: id.to_string(),
                })
            }
        }
    }

    /// Wire record for a save: the export plus the identity, if any.
    fn outgoing(&self, entity: &Entity) -> Value {
        let mut record = entity.export();
        if let (Some(id), Value::Object(fields)) = (entity.id(), &mut record) {
            fields.insert("id".to_string(), id.to_value());
        }
        record
    }

    fn accept_saved(&self, entity: &Entity, saved: &Value) -> Entity {
        if !saved.is_object() {
            entity.mark_clean();
            return entity.clone();
        }
        let Some(id) = self.record_id(saved).or_else(|| entity.id()) else {
            warn!(model = self.inner.model.name(), "save response carries no identity");
            entity.mark_clean();
            return entity.clone();
        };
        let canonical = self.adopt(entity, id);
        canonical.populate(saved);
        canonical
    }

    /// Makes `entity` the table's instance for `id` unless one exists.
    fn adopt(&self, entity: &Entity, id: RecordId) -> Entity {
        {
            let state = &mut *lock(&self.inner.state);
            if let Some(Record::Live(existing)) = state.records.get(&id) {
                return existing.clone();
            }
            let known = state
                .records
                .insert(id, Record::Live(entity.clone()))
                .is_some();
            if !known {
                self.inner.keys.update(|keys| keys.push(id));
            }
            self.inner.array.update(|array| array.push(entity.clone()));
            self.sync_counts(state);
        }
        entity.adopt(id, self.downgrade());
        debug!(model = self.inner.model.name(), %id, "adopted new record");
        entity.clone()
    }

    /// Returns the live entity for `id`, creating a placeholder if needed.
    fn materialize(&self, id: RecordId) -> (Entity, bool) {
        let state = &mut *lock(&self.inner.state);
        if let Some(Record::Live(entity)) = state.records.get(&id) {
            return (entity.clone(), false);
        }
        let entity = Entity::placeholder(
            Arc::clone(&self.inner.model),
            self.inner.db.clone(),
            self.downgrade(),
            id,
        );
        let known = state
            .records
            .insert(id, Record::Live(entity.clone()))
            .is_some();
        if !known {
            self.inner.keys.update(|keys| keys.push(id));
        }
        self.inner.array.update(|array| array.push(entity.clone()));
        self.sync_counts(state);
        (entity, true)
    }

    fn sync_counts(&self, state: &TableState) {
        let length = state.records.len();
        self.inner.length.set(length);
        self.inner.loaded.set(state.loaded.len() == length);
    }

    /// Marks `entity` fetching and (re)starts the debounce timer.
    fn queue(&self, entity: &Entity, id: RecordId) {
        if !entity.begin_fetch() {
            return;
        }
        let mut coordinator = lock(&self.inner.coordinator);
        coordinator.enqueue(id);
        let Ok(runtime) = Handle::try_current() else {
            warn!(model = self.inner.model.name(), %id, "no async runtime; waiting for an explicit load");
            return;
        };
        let weak = self.downgrade();
        let delay = self.inner.debounce;
        coordinator.arm(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(table) = Table::upgrade(&weak) {
                table.flush();
            }
        }));
    }

    /// Sends every pending identity as one batch.
    fn flush(&self) {
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let Some(batch) = lock(&self.inner.coordinator).take_batch() else {
            return;
        };
        debug!(model = self.inner.model.name(), count = batch.ids.len(), seq = batch.seq, "flushing batch");
        let table = self.clone();
        self.track(&runtime, async move {
            let result = table
                .inner
                .transport
                .list_by_ids(&table.inner.model, &batch.ids)
                .await;
            table.complete_batch(&batch, result);
            lock(&table.inner.coordinator).settle(&batch);
        });
    }

    fn complete_batch(&self, batch: &Batch, result: TransportResult<Vec<Value>>) {
        let model = self.inner.model.name();
        match result {
            Ok(records) => {
                let mut outstanding: HashSet<RecordId> = batch.ids.iter().copied().collect();
                for record in &records {
                    match self.record_id(record) {
                        Some(id) => {
                            outstanding.remove(&id);
                            self.add(id, Some(record));
                        }
                        None => warn!(model, %record, "batch record without a valid id"),
                    }
                }
                for id in batch.ids.iter().filter(|id| outstanding.contains(id)) {
                    warn!(model, %id, "omitted from batch response");
                    if let Some(entity) = self.live(id) {
                        entity.fail_fetch(FetchError::Missing);
                    }
                }
            }
            Err(error) => {
                warn!(model, count = batch.ids.len(), %error, "batch fetch failed");
                for id in &batch.ids {
                    if let Some(entity) = self.live(id) {
                        entity.fail_fetch(FetchError::Transport(error.clone()));
                    }
                }
            }
        }
    }

    /// Runs `work` on the runtime and tracks it until it settles.
    fn track(&self, runtime: &Handle, work: impl Future<Output = ()> + Send + 'static) {
        let mut in_flight = lock(&self.inner.in_flight);
        let key = in_flight.next;
        in_flight.next += 1;
        let weak = self.downgrade();
        let task = async move {
            work.await;
            if let Some(table) = Table::upgrade(&weak) {
                lock(&table.inner.in_flight).tasks.remove(&key);
            }
        }
        .boxed()
        .shared();
        in_flight.tasks.insert(key, task.clone());
        drop(in_flight);
        runtime.spawn(task);
    }

    async fn pull_ids(&self, prune: bool) -> CacheResult<()> {
        let values = self.inner.transport.get_all_ids(&self.inner.model).await?;
        let key_type = self.inner.model.key_type();
        let mut server = Vec::with_capacity(values.len());
        for value in &values {
            match key_type.read(value) {
                Some(id) => server.push(id),
                None => warn!(model = self.inner.model.name(), %value, "listed id is not a valid key"),
            }
        }
        for id in &server {
            self.add(*id, None);
        }
        if prune {
            let keep: HashSet<RecordId> = server.into_iter().collect();
            for id in self.keys() {
                if !keep.contains(&id) {
                    self.remove(id);
                }
            }
        }
        self.inner.listed.set(true);
        debug!(model = self.inner.model.name(), count = values.len(), "listed identities");
        Ok(())
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("model", &self.inner.model.name())
            .field("len", &self.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
