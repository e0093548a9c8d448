//! Root of a cache instance.
//!
//! A [`Database`] owns the registered schemas, one lazily created [`Table`]
//! per model and the shared [`IndexTree`]. Entities, collections and indexers
//! keep a weak [`DbHandle`] back to it so relations and chained queries can
//! resolve without creating reference cycles.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crust_model::{ModelSchema, SchemaRegistry};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::entity::Entity;
use crate::error::CacheResult;
use crate::indexer::{IndexKind, IndexTree, Indexer};
use crate::observe::lock;
use crate::table::Table;
use crate::transport::Transport;

/// Weak back-reference to a [`Database`].
#[derive(Clone, Default)]
pub(crate) struct DbHandle(Weak<DatabaseInner>);

impl DbHandle {
    pub(crate) fn upgrade(&self) -> Option<Database> {
        self.0.upgrade().map(|inner| Database { inner })
    }
}

pub(crate) struct DatabaseInner {
    transport: Arc<dyn Transport>,
    config: CacheConfig,
    registry: Mutex<SchemaRegistry>,
    tables: Mutex<HashMap<String, Table>>,
    indexes: Mutex<IndexTree>,
}

/// Entry point to the cache: models, tables and indices for one backend.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, CacheConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: CacheConfig) -> Self {
        debug!(debounce_ms = config.debounce_ms, "database created");
        Self {
            inner: Arc::new(DatabaseInner {
                transport,
                config,
                registry: Mutex::new(SchemaRegistry::new()),
                tables: Mutex::new(HashMap::new()),
                indexes: Mutex::new(IndexTree::new()),
            }),
        }
    }

    /// Registers a model. Relations name their targets by model name, so
    /// every model a relation points at must be registered too.
    pub fn register(&self, schema: ModelSchema) -> CacheResult<Arc<ModelSchema>> {
        let schema = lock(&self.inner.registry).register(schema)?;
        info!(model = schema.name(), source = schema.source(), "registered model");
        Ok(schema)
    }

    /// Looks up a registered model by name.
    pub fn model(&self, name: &str) -> Option<Arc<ModelSchema>> {
        lock(&self.inner.registry).get(name)
    }

    /// The table for `model`, created on first use.
    pub fn table(&self, model: &Arc<ModelSchema>) -> Table {
        lock(&self.inner.tables)
            .entry(model.name().to_string())
            .or_insert_with(|| {
                debug!(model = model.name(), "creating table");
                Table::new(
                    Arc::clone(model),
                    self.handle(),
                    Arc::clone(&self.inner.transport),
                    &self.inner.config,
                )
            })
            .clone()
    }

    /// The table for a registered model name.
    pub fn table_by_name(&self, name: &str) -> Option<Table> {
        match self.model(name) {
            Some(model) => Some(self.table(&model)),
            None => {
                warn!(model = name, "no such model registered");
                None
            }
        }
    }

    /// A new unsaved record attached to this database. Saving it adopts it
    /// into its table.
    pub fn create(&self, model: &Arc<ModelSchema>) -> Entity {
        Entity::create(Arc::clone(model), self.handle())
    }

    /// The cached indexer for `(model, kind, property, spec)`, starting its
    /// request on first access.
    pub fn index(
        &self,
        model: &Arc<ModelSchema>,
        kind: IndexKind,
        property: &str,
        spec: &str,
    ) -> Indexer {
        lock(&self.inner.indexes).get_or_insert_with(
            model.name(),
            kind,
            property,
            spec,
            |ascending| {
                Indexer::fetch(
                    Arc::clone(model),
                    self.handle(),
                    Arc::clone(&self.inner.transport),
                    kind,
                    property,
                    spec,
                    ascending,
                )
            },
        )
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Number of tables created so far.
    pub fn table_count(&self) -> usize {
        lock(&self.inner.tables).len()
    }

    /// Number of indexers cached so far.
    pub fn index_count(&self) -> usize {
        lock(&self.inner.indexes).len()
    }

    pub(crate) fn handle(&self) -> DbHandle {
        DbHandle(Arc::downgrade(&self.inner))
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.inner.config)
            .field("tables", &self.table_count())
            .field("indexes", &self.index_count())
            .finish()
    }
}
