//! The remote data service contract.
//!
//! A [`Transport`] is the only thing in the cache that performs I/O. Tables
//! and indexers call it from spawned tasks and never hold a lock across the
//! await. [`crate::HttpTransport`] speaks the REST layout; [`mock`] keeps
//! records in memory for tests.

use async_trait::async_trait;
use crust_model::ModelSchema;
use crust_types::RecordId;
use serde_json::Value;

use crate::error::TransportResult;
use crate::indexer::IndexKind;

/// Remote operations for every model.
///
/// Records travel as JSON objects keyed by property and foreign-key names.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches one record.
    async fn get_one(&self, model: &ModelSchema, id: &RecordId) -> TransportResult<Value>;

    /// Fetches every identity the server holds for the model.
    async fn get_all_ids(&self, model: &ModelSchema) -> TransportResult<Vec<Value>>;

    /// Fetches every record of the model.
    async fn get_all(&self, model: &ModelSchema) -> TransportResult<Vec<Value>>;

    /// Fetches a batch of records. Missing ids are simply absent from the
    /// response.
    async fn list_by_ids(&self, model: &ModelSchema, ids: &[RecordId])
    -> TransportResult<Vec<Value>>;

    /// Creates or updates one record and returns the stored version.
    async fn save(&self, model: &ModelSchema, record: Value) -> TransportResult<Value>;

    /// Creates or updates many records, answering in request order.
    async fn save_all(&self, model: &ModelSchema, records: Vec<Value>)
    -> TransportResult<Vec<Value>>;

    /// Deletes one record.
    async fn delete(&self, model: &ModelSchema, id: &RecordId) -> TransportResult<()>;

    /// Fetches a server-computed index as an ordered identity list.
    async fn get_index(
        &self,
        model: &ModelSchema,
        kind: IndexKind,
        property: &str,
        spec: &str,
    ) -> TransportResult<Vec<Value>>;
}

/// In-memory transport for tests.
pub mod mock {
    use super::*;
    use crate::error::TransportError;
    use crate::observe::lock;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Operations the mock can count or fail.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum MockOp {
        GetOne,
        GetAllIds,
        GetAll,
        ListByIds,
        Save,
        SaveAll,
        Delete,
        GetIndex,
    }

    type IndexKey = (String, IndexKind, String, String);

    #[derive(Debug, Default)]
    struct MockState {
        records: HashMap<String, BTreeMap<RecordId, Value>>,
        indexes: HashMap<IndexKey, Vec<Value>>,
        hidden: HashSet<(String, RecordId)>,
        failing: HashSet<MockOp>,
        calls: HashMap<MockOp, usize>,
        batches: Vec<Vec<RecordId>>,
        saved: Vec<Value>,
        next_id: i64,
    }

    /// A scripted in-memory data service.
    ///
    /// Records are keyed by model name and identity. Individual operations can
    /// be made to fail, and every call is counted so tests can assert on
    /// batching.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        state: Mutex<MockState>,
        latency: Mutex<Option<Duration>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Stores a record; its `id` field must be a valid key.
        pub fn insert(&self, model: &ModelSchema, record: Value) {
            let Some(id) = record.get("id").and_then(|v| model.key_type().read(v)) else {
                panic!("mock record for {} has no valid id: {record}", model.name());
            };
            let mut state = lock(&self.state);
            if let Some(n) = id.as_number() {
                state.next_id = state.next_id.max(n);
            }
            state
                .records
                .entry(model.name().to_string())
                .or_default()
                .insert(id, record);
        }

        pub fn insert_many(&self, model: &ModelSchema, records: impl IntoIterator<Item = Value>) {
            for record in records {
                self.insert(model, record);
            }
        }

        /// Current stored version of a record.
        pub fn record(&self, model: &ModelSchema, id: impl Into<RecordId>) -> Option<Value> {
            let state = lock(&self.state);
            state.records.get(model.name())?.get(&id.into()).cloned()
        }

        /// Keeps a stored record out of batch responses, as if the server
        /// silently dropped it.
        pub fn omit(&self, model: &ModelSchema, id: impl Into<RecordId>) {
            lock(&self.state)
                .hidden
                .insert((model.name().to_string(), id.into()));
        }

        /// Scripts the answer for an index request.
        pub fn set_index(
            &self,
            model: &ModelSchema,
            kind: IndexKind,
            property: &str,
            spec: &str,
            ids: Vec<Value>,
        ) {
            lock(&self.state).indexes.insert(
                (
                    model.name().to_string(),
                    kind,
                    property.to_string(),
                    spec.to_string(),
                ),
                ids,
            );
        }

        /// Makes `op` fail with a network error until cleared.
        pub fn fail_on(&self, op: MockOp) {
            lock(&self.state).failing.insert(op);
        }

        pub fn clear_failures(&self) {
            lock(&self.state).failing.clear();
        }

        /// Delays every call by `latency` (virtual time under a paused clock).
        pub fn set_latency(&self, latency: Duration) {
            *lock(&self.latency) = Some(latency);
        }

        pub fn calls(&self, op: MockOp) -> usize {
            lock(&self.state).calls.get(&op).copied().unwrap_or(0)
        }

        /// Identity lists of every `list_by_ids` call, in call order.
        pub fn batches(&self) -> Vec<Vec<RecordId>> {
            lock(&self.state).batches.clone()
        }

        /// Every record received by `save` and `save_all`, in call order.
        pub fn saved(&self) -> Vec<Value> {
            lock(&self.state).saved.clone()
        }

        async fn begin(&self, op: MockOp) -> TransportResult<()> {
            let latency = *lock(&self.latency);
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            let mut state = lock(&self.state);
            *state.calls.entry(op).or_default() += 1;
            if state.failing.contains(&op) {
                return Err(TransportError::network(format!("mock failure on {op:?}")));
            }
            Ok(())
        }

        fn store(state: &mut MockState, model: &ModelSchema, mut record: Value) -> Value {
            let id = record
                .get("id")
                .and_then(|v| model.key_type().read(v))
                .unwrap_or_else(|| match model.key_type() {
                    crust_types::KeyType::Integer => {
                        state.next_id += 1;
                        RecordId::Number(state.next_id)
                    }
                    crust_types::KeyType::Guid => RecordId::new_guid(),
                });
            if let Value::Object(fields) = &mut record {
                fields.insert("id".to_string(), id.to_value());
            }
            state.saved.push(record.clone());
            state
                .records
                .entry(model.name().to_string())
                .or_default()
                .insert(id, record.clone());
            record
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn get_one(&self, model: &ModelSchema, id: &RecordId) -> TransportResult<Value> {
            self.begin(MockOp::GetOne).await?;
            let state = lock(&self.state);
            state
                .records
                .get(model.name())
                .and_then(|records| records.get(id))
                .cloned()
                .ok_or_else(|| TransportError::status(404, format!("{} {id}", model.name())))
        }

        async fn get_all_ids(&self, model: &ModelSchema) -> TransportResult<Vec<Value>> {
            self.begin(MockOp::GetAllIds).await?;
            let state = lock(&self.state);
            Ok(state
                .records
                .get(model.name())
                .map(|records| records.keys().map(RecordId::to_value).collect())
                .unwrap_or_default())
        }

        async fn get_all(&self, model: &ModelSchema) -> TransportResult<Vec<Value>> {
            self.begin(MockOp::GetAll).await?;
            let state = lock(&self.state);
            Ok(state
                .records
                .get(model.name())
                .map(|records| records.values().cloned().collect())
                .unwrap_or_default())
        }

        async fn list_by_ids(
            &self,
            model: &ModelSchema,
            ids: &[RecordId],
        ) -> TransportResult<Vec<Value>> {
            self.begin(MockOp::ListByIds).await?;
            let mut state = lock(&self.state);
            state.batches.push(ids.to_vec());
            let Some(records) = state.records.get(model.name()) else {
                return Ok(Vec::new());
            };
            Ok(ids
                .iter()
                .filter(|id| !state.hidden.contains(&(model.name().to_string(), **id)))
                .filter_map(|id| records.get(id).cloned())
                .collect())
        }

        async fn save(&self, model: &ModelSchema, record: Value) -> TransportResult<Value> {
            self.begin(MockOp::Save).await?;
            let mut state = lock(&self.state);
            Ok(Self::store(&mut state, model, record))
        }

        async fn save_all(
            &self,
            model: &ModelSchema,
            records: Vec<Value>,
        ) -> TransportResult<Vec<Value>> {
            self.begin(MockOp::SaveAll).await?;
            let mut state = lock(&self.state);
            Ok(records
                .into_iter()
                .map(|record| Self::store(&mut state, model, record))
                .collect())
        }

        async fn delete(&self, model: &ModelSchema, id: &RecordId) -> TransportResult<()> {
            self.begin(MockOp::Delete).await?;
            let mut state = lock(&self.state);
            state
                .records
                .get_mut(model.name())
                .and_then(|records| records.remove(id))
                .map(|_| ())
                .ok_or_else(|| TransportError::status(404, format!("{} {id}", model.name())))
        }

        async fn get_index(
            &self,
            model: &ModelSchema,
            kind: IndexKind,
            property: &str,
            spec: &str,
        ) -> TransportResult<Vec<Value>> {
            self.begin(MockOp::GetIndex).await?;
            let state = lock(&self.state);
            let key = (
                model.name().to_string(),
                kind,
                property.to_string(),
                spec.to_string(),
            );
            state.indexes.get(&key).cloned().ok_or_else(|| {
                TransportError::status(404, format!("no {kind} index on {property}"))
            })
        }
    }
}
