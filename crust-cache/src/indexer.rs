//! Server-computed identity sequences.
//!
//! An [`Indexer`] holds the ordered identities of one index, keyed by
//! `(model, kind, property, spec)`. The [`IndexTree`] caches one indexer per
//! key for the life of the database; indexers are filled by a single request
//! and never refetched.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use crust_model::ModelSchema;
use crust_types::RecordId;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::collection::{Collection, Member};
use crate::database::DbHandle;
use crate::error::TransportError;
use crate::observe::{lock, Observable};
use crate::transport::Transport;

/// The two index families the server computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Every identity, sorted by a property.
    Order,
    /// Identities whose property matches a value.
    Equals,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Order => "order",
            IndexKind::Equals => "equals",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction of an order index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    /// Spec segment used in the index path.
    pub fn spec(&self) -> &'static str {
        match self {
            Direction::Ascending => "1",
            Direction::Descending => "2",
        }
    }
}

struct IndexerInner {
    model: Arc<ModelSchema>,
    db: DbHandle,
    kind: IndexKind,
    property: String,
    spec: String,
    ids: Observable<Vec<RecordId>>,
    loaded: Observable<bool>,
    error: Mutex<Option<TransportError>>,
    loader: Mutex<Option<Shared<BoxFuture<'static, ()>>>>,
    collection: Collection,
}

/// One index's identity sequence and load state.
#[derive(Clone)]
pub struct Indexer {
    inner: Arc<IndexerInner>,
}

impl Indexer {
    fn blank(
        model: Arc<ModelSchema>,
        db: DbHandle,
        kind: IndexKind,
        property: &str,
        spec: &str,
    ) -> Self {
        let collection = Collection::new(model.name().to_string(), db.clone());
        Self {
            inner: Arc::new(IndexerInner {
                model,
                db,
                kind,
                property: property.to_string(),
                spec: spec.to_string(),
                ids: Observable::new(Vec::new()),
                loaded: Observable::new(false),
                error: Mutex::new(None),
                loader: Mutex::new(None),
                collection,
            }),
        }
    }

    /// An already-loaded indexer computed locally.
    pub(crate) fn derived(
        model: Arc<ModelSchema>,
        db: DbHandle,
        kind: IndexKind,
        property: &str,
        spec: &str,
        ids: Vec<RecordId>,
    ) -> Self {
        let indexer = Self::blank(model, db, kind, property, spec);
        indexer.fill(ids);
        indexer
    }

    /// Starts filling an index.
    ///
    /// A descending order is reversed from a loaded ascending one without a
    /// request. A failed request still marks the indexer loaded, leaving it
    /// empty with the error attached.
    pub(crate) fn fetch(
        model: Arc<ModelSchema>,
        db: DbHandle,
        transport: Arc<dyn Transport>,
        kind: IndexKind,
        property: &str,
        spec: &str,
        ascending: Option<&Indexer>,
    ) -> Self {
        if kind == IndexKind::Order && spec == Direction::Descending.spec() {
            if let Some(ascending) = ascending.filter(|a| a.is_loaded() && a.error().is_none()) {
                let mut ids = ascending.to_vec();
                ids.reverse();
                debug!(model = model.name(), property, "reversed ascending order");
                return Self::derived(model, db, kind, property, spec, ids);
            }
        }

        let indexer = Self::blank(model, db, kind, property, spec);
        let Ok(runtime) = Handle::try_current() else {
            indexer.fail(TransportError::unavailable("no async runtime"));
            return indexer;
        };

        let weak = Arc::downgrade(&indexer.inner);
        let model = Arc::clone(&indexer.inner.model);
        let (property, spec) = (property.to_string(), spec.to_string());
        let task = async move {
            let result = transport.get_index(&model, kind, &property, &spec).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let indexer = Indexer { inner };
            match result {
                Ok(values) => {
                    let key_type = model.key_type();
                    let ids = values
                        .iter()
                        .filter_map(|v| {
                            let id = key_type.read(v);
                            if id.is_none() {
                                warn!(model = model.name(), %v, "index entry is not a valid key");
                            }
                            id
                        })
                        .collect();
                    indexer.fill(ids);
                }
                Err(error) => {
                    warn!(
                        model = model.name(),
                        kind = %kind,
                        property = %property,
                        spec = %spec,
                        %error,
                        "index request failed"
                    );
                    indexer.fail(error);
                }
            }
        }
        .boxed()
        .shared();
        *lock(&indexer.inner.loader) = Some(task.clone());
        runtime.spawn(task);
        indexer
    }

    fn fill(&self, ids: Vec<RecordId>) {
        self.inner
            .collection
            .replace_all(ids.iter().copied().map(Member::Key));
        self.inner.ids.set(ids);
        self.inner.loaded.set(true);
    }

    fn fail(&self, error: TransportError) {
        *lock(&self.inner.error) = Some(error);
        self.inner.loaded.set(true);
    }

    pub fn model(&self) -> &Arc<ModelSchema> {
        &self.inner.model
    }

    pub fn kind(&self) -> IndexKind {
        self.inner.kind
    }

    pub fn property(&self) -> &str {
        &self.inner.property
    }

    pub fn spec(&self) -> &str {
        &self.inner.spec
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.get()
    }

    /// The request failure, if the index could not be fetched.
    pub fn error(&self) -> Option<TransportError> {
        lock(&self.inner.error).clone()
    }

    pub fn len(&self) -> usize {
        self.inner.ids.with(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plain identity sequence.
    pub fn to_vec(&self) -> Vec<RecordId> {
        self.inner.ids.get()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.inner.ids.with(|ids| ids.contains(id))
    }

    /// Live collection of the indexed records. Resolving its members goes
    /// through the table and so lazily loads them.
    pub fn to_collection(&self) -> Collection {
        self.inner.collection.clone()
    }

    /// Resolves when the index is filled or has failed.
    pub fn loaded(&self) -> BoxFuture<'static, Result<(), TransportError>> {
        let loader = lock(&self.inner.loader).clone();
        let inner = Arc::clone(&self.inner);
        async move {
            if let Some(loader) = loader {
                loader.await;
            }
            let error = lock(&inner.error).clone();
            error.map_or(Ok(()), Err)
        }
        .boxed()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<RecordId>> {
        self.inner.ids.subscribe()
    }

    pub fn watch_loaded(&self) -> watch::Receiver<bool> {
        self.inner.loaded.subscribe()
    }

    /// Orders this indexer's identities by another property.
    pub fn order_by(&self, property: &str, direction: Direction) -> Option<Indexer> {
        let db = self.inner.db.upgrade()?;
        let ids = self.to_vec();
        Some(db.table(&self.inner.model).order_by(property, direction, Some(ids.as_slice())))
    }

    /// Filters this indexer's identities by another property match.
    pub fn equals(&self, property: &str, spec: &str) -> Option<Indexer> {
        let db = self.inner.db.upgrade()?;
        let ids = self.to_vec();
        Some(db.table(&self.inner.model).equals(property, spec, Some(ids.as_slice())))
    }

    /// Sorts `subset` by position in this index. Identities the index does
    /// not hold go first, in their relative order.
    pub(crate) fn order_subset(&self, subset: &[RecordId]) -> Vec<RecordId> {
        let positions: HashMap<RecordId, usize> = self.inner.ids.with(|ids| {
            ids.iter()
                .enumerate()
                .map(|(position, id)| (*id, position))
                .collect()
        });
        let mut ordered = subset.to_vec();
        ordered.sort_by_key(|id| positions.get(id).map_or(0, |position| position + 1));
        ordered
    }

    /// Keeps the members of `subset` this index holds, in subset order.
    pub(crate) fn filter_subset(&self, subset: &[RecordId]) -> Vec<RecordId> {
        let members: HashSet<RecordId> = self.inner.ids.with(|ids| ids.iter().copied().collect());
        subset
            .iter()
            .filter(|id| members.contains(id))
            .copied()
            .collect()
    }

    pub fn ptr_eq(&self, other: &Indexer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Indexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indexer")
            .field("model", &self.inner.model.name())
            .field("kind", &self.inner.kind)
            .field("property", &self.inner.property)
            .field("spec", &self.inner.spec)
            .field("len", &self.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

type SpecMap = HashMap<String, Indexer>;
type PropertyMap = HashMap<String, SpecMap>;
type KindMap = HashMap<IndexKind, PropertyMap>;

/// model → kind → property → spec → [`Indexer`].
///
/// Levels are created on first access; an indexer, once created, is returned
/// for every later lookup of the same path.
#[derive(Debug, Default)]
pub struct IndexTree {
    models: HashMap<String, KindMap>,
}

impl IndexTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model: &str, kind: IndexKind, property: &str, spec: &str) -> Option<Indexer> {
        self.models
            .get(model)?
            .get(&kind)?
            .get(property)?
            .get(spec)
            .cloned()
    }

    /// Returns the cached indexer for the path, creating it with `create`.
    ///
    /// `create` receives the ascending sibling of the requested spec, if it
    /// exists, so a descending order can be derived from it.
    pub fn get_or_insert_with(
        &mut self,
        model: &str,
        kind: IndexKind,
        property: &str,
        spec: &str,
        create: impl FnOnce(Option<&Indexer>) -> Indexer,
    ) -> Indexer {
        let specs = self
            .models
            .entry(model.to_string())
            .or_default()
            .entry(kind)
            .or_default()
            .entry(property.to_string())
            .or_default();
        if let Some(existing) = specs.get(spec) {
            return existing.clone();
        }
        let indexer = create(specs.get(Direction::Ascending.spec()));
        specs.insert(spec.to_string(), indexer.clone());
        indexer
    }

    /// Total number of cached indexers.
    pub fn len(&self) -> usize {
        self.models
            .values()
            .flat_map(HashMap::values)
            .flat_map(HashMap::values)
            .map(HashMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
