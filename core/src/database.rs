//! Telemetry-wrapped database façade.
//!
//! [`VectorDatabase`] owns a [`Store`] and a [`TelemetryRecorder`] and
//! implements the catalog, record-store and query traits by delegating to
//! the store. Each call is timed and recorded; mutating calls refresh the
//! full stats snapshot, reads only the last-operation fields, failures none.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::catalog::CollectionCatalog;
use crate::collection::{CollectionInfo, Metadata};
use crate::config::DatabaseConfig;
use crate::embedding::SharedEmbeddingFunction;
use crate::error::{Error, Result};
use crate::persistence::PersistOutcome;
use crate::query::{QueryEngine, QueryRequest, QueryResult};
use crate::records::{AddRequest, DeleteRequest, GetRequest, GetResult, RecordStore, UpdateRequest};
use crate::store::Store;
use crate::telemetry::{
    OperationEvent, OperationStatus, SnapshotUpdate, StatsSnapshot, TelemetryRecorder,
};

pub const DEFAULT_PEEK_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Mutation,
    Read,
}

struct OperationCall {
    operation: &'static str,
    collection: Option<String>,
    details: Map<String, Value>,
    started: Instant,
    at: DateTime<Utc>,
}

impl OperationCall {
    fn start(operation: &'static str, collection: Option<&str>, details: Value) -> Self {
        let details = match details {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            operation,
            collection: collection.map(str::to_string),
            details,
            started: Instant::now(),
            at: Utc::now(),
        }
    }
}

pub struct VectorDatabase {
    store: Store,
    telemetry: TelemetryRecorder,
    config: DatabaseConfig,
}

impl VectorDatabase {
    /// Opens (or creates) a database, replaying any persisted state, and
    /// records an `initialize` event.
    pub fn open(
        config: DatabaseConfig,
        embedder: Option<SharedEmbeddingFunction>,
    ) -> Result<Self> {
        let call = OperationCall::start(
            "initialize",
            None,
            json!({
                "data_dir": config.data_dir().map(|path| path.display().to_string()),
                "persistent": config.data_dir().is_some(),
            }),
        );

        let store = Store::open(&config, embedder)?;
        let telemetry = match config.resolved_telemetry_dir() {
            Some(dir) => TelemetryRecorder::with_dir(&dir),
            None => TelemetryRecorder::in_memory(),
        };
        let database = Self {
            store,
            telemetry,
            config,
        };

        tracing::info!(
            persistent = database.store.is_persistent(),
            collections = database.store.collections().len(),
            telemetry_log = ?database.telemetry.log_path(),
            "vector database opened"
        );
        database.finish(call, Effect::Mutation, &Ok(()), |_, _| {});
        Ok(database)
    }

    pub fn in_memory(embedder: Option<SharedEmbeddingFunction>) -> Result<Self> {
        Self::open(DatabaseConfig::in_memory(), embedder)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Current stats snapshot as kept in memory.
    pub fn stats(&self) -> StatsSnapshot {
        self.telemetry.stats().unwrap_or_else(|error| {
            self.telemetry.warn("stats", &error);
            StatsSnapshot::default()
        })
    }

    /// Number of telemetry failures downgraded to warnings so far.
    pub fn telemetry_warnings(&self) -> u64 {
        self.telemetry.warnings()
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    /// Nanoseconds since the Unix epoch.
    pub fn heartbeat(&self) -> u128 {
        let call = OperationCall::start("heartbeat", None, json!({}));
        let nanoseconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        self.finish(call, Effect::Read, &Ok(nanoseconds), |nanoseconds, details| {
            details.insert("nanoseconds".to_string(), json!(nanoseconds.to_string()));
        });
        nanoseconds
    }

    /// Drops every collection.
    pub fn reset(&mut self) -> Result<usize> {
        let call = OperationCall::start("reset", None, json!({}));
        let outcome = self.store.reset();
        self.finish(call, Effect::Mutation, &outcome, |dropped, details| {
            details.insert("deleted_collections".to_string(), json!(dropped));
        });
        outcome
    }

    /// First `limit` items of a collection in storage order.
    pub fn peek(&self, collection: &str, limit: usize) -> Result<GetResult> {
        let call = OperationCall::start("peek", Some(collection), json!({ "limit": limit }));
        let outcome = self.store.get(collection, GetRequest::all().limit(limit));
        self.finish(call, Effect::Read, &outcome, |result, details| {
            details.insert("returned_count".to_string(), json!(result.len()));
        });
        outcome
    }

    /// Borrowed handle scoped to one existing collection.
    pub fn collection(&mut self, name: &str) -> Result<CollectionHandle<'_>> {
        let info = self
            .get_collection(name)?
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        Ok(CollectionHandle {
            database: self,
            info,
        })
    }

    /// Forces a snapshot checkpoint of the backing store.
    pub fn checkpoint(&mut self) -> Option<PersistOutcome> {
        self.store.checkpoint()
    }

    /// Checkpoints and records a `close` event.
    pub fn close(mut self) -> Result<()> {
        let call = OperationCall::start("close", None, json!({}));
        let outcome = self.store.checkpoint();
        let checkpointed = matches!(outcome, Some(PersistOutcome::Checkpointed));
        self.finish(call, Effect::Mutation, &Ok(()), |_, details| {
            details.insert("checkpointed".to_string(), json!(checkpointed));
        });
        tracing::info!(checkpointed, "vector database closed");
        Ok(())
    }

    fn finish<T>(
        &self,
        call: OperationCall,
        effect: Effect,
        outcome: &Result<T>,
        success_details: impl FnOnce(&T, &mut Map<String, Value>),
    ) {
        let OperationCall {
            operation,
            collection,
            mut details,
            started,
            at,
        } = call;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (status, error, update) = match outcome {
            Ok(value) => {
                success_details(value, &mut details);
                let update = match effect {
                    Effect::Mutation => SnapshotUpdate::Full(self.store.collections().counts()),
                    Effect::Read => SnapshotUpdate::LastOperation,
                };
                (OperationStatus::Success, None, update)
            }
            Err(error) => (
                OperationStatus::Error,
                Some(error.to_string()),
                SnapshotUpdate::Untouched,
            ),
        };

        tracing::debug!(
            operation,
            collection = collection.as_deref(),
            ?status,
            duration_ms,
            "operation finished"
        );
        let event = OperationEvent {
            timestamp: at,
            operation: operation.to_string(),
            status,
            collection,
            duration_ms: Some(duration_ms),
            error,
            details: Value::Object(details),
        };
        if let Err(error) = self.telemetry.record(&event, update) {
            self.telemetry.warn(operation, &error);
        }
    }
}

impl CollectionCatalog for VectorDatabase {
    fn create_collection(
        &mut self,
        name: &str,
        metadata: Option<Metadata>,
    ) -> Result<CollectionInfo> {
        let call = OperationCall::start(
            "create_collection",
            Some(name),
            json!({"has_metadata": metadata.as_ref().is_some_and(|m| !m.is_empty())}),
        );
        let outcome = self.store.create_collection(name, metadata);
        self.finish(call, Effect::Mutation, &outcome, |_, _| {});
        outcome
    }

    fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let call = OperationCall::start("get_collection", Some(name), json!({}));
        let outcome = self.store.get_collection(name);
        self.finish(call, Effect::Read, &outcome, |found, details| {
            details.insert("found".to_string(), json!(found.is_some()));
        });
        outcome
    }

    fn get_or_create_collection(
        &mut self,
        name: &str,
        metadata: Option<Metadata>,
    ) -> Result<CollectionInfo> {
        let call = OperationCall::start(
            "get_or_create_collection",
            Some(name),
            json!({"has_metadata": metadata.as_ref().is_some_and(|m| !m.is_empty())}),
        );
        let existed = self.store.collections().contains(name);
        let outcome = self.store.get_or_create_collection(name, metadata);
        self.finish(call, Effect::Mutation, &outcome, |_, details| {
            details.insert("created".to_string(), json!(!existed));
        });
        outcome
    }

    fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let call = OperationCall::start("list_collections", None, json!({}));
        let outcome = self.store.list_collections();
        self.finish(call, Effect::Read, &outcome, |collections, details| {
            details.insert("collections_count".to_string(), json!(collections.len()));
        });
        outcome
    }

    fn delete_collection(&mut self, name: &str) -> Result<()> {
        let call = OperationCall::start("delete_collection", Some(name), json!({}));
        let outcome = self.store.delete_collection(name);
        self.finish(call, Effect::Mutation, &outcome, |_, _| {});
        outcome
    }

    fn count(&self, name: &str) -> Result<usize> {
        let call = OperationCall::start("count", Some(name), json!({}));
        let outcome = self.store.count(name);
        self.finish(call, Effect::Read, &outcome, |count, details| {
            details.insert("document_count".to_string(), json!(count));
        });
        outcome
    }

    fn collection_exists(&self, name: &str) -> Result<bool> {
        let call = OperationCall::start("collection_exists", Some(name), json!({}));
        let outcome = self.store.collection_exists(name);
        self.finish(call, Effect::Read, &outcome, |exists, details| {
            details.insert("exists".to_string(), json!(exists));
        });
        outcome
    }
}

impl RecordStore for VectorDatabase {
    fn add(&mut self, collection: &str, request: AddRequest) -> Result<Vec<String>> {
        let call = OperationCall::start(
            "add",
            Some(collection),
            json!({
                "ids_count": request.ids.len(),
                "embeddings_provided": request.embeddings.is_some(),
                "documents_provided": request.documents.is_some(),
                "metadatas_provided": request.metadatas.is_some(),
            }),
        );
        let outcome = self.store.add(collection, request);
        self.finish(call, Effect::Mutation, &outcome, |ids, details| {
            details.insert("added_count".to_string(), json!(ids.len()));
        });
        outcome
    }

    fn update(&mut self, collection: &str, request: UpdateRequest) -> Result<()> {
        let call = OperationCall::start(
            "update",
            Some(collection),
            json!({
                "ids_count": request.ids.len(),
                "embeddings_provided": request.embeddings.is_some(),
                "documents_provided": request.documents.is_some(),
                "metadatas_provided": request.metadatas.is_some(),
            }),
        );
        let outcome = self.store.update(collection, request);
        self.finish(call, Effect::Mutation, &outcome, |_, _| {});
        outcome
    }

    fn get(&self, collection: &str, request: GetRequest) -> Result<GetResult> {
        let call = OperationCall::start(
            "get",
            Some(collection),
            json!({
                "ids_count": request.ids.as_ref().map_or(0, Vec::len),
                "has_where": request.where_filter.is_some(),
                "has_where_document": request.where_document.is_some(),
            }),
        );
        let outcome = self.store.get(collection, request);
        self.finish(call, Effect::Read, &outcome, |result, details| {
            details.insert("returned_count".to_string(), json!(result.len()));
        });
        outcome
    }

    fn delete(&mut self, collection: &str, request: DeleteRequest) -> Result<usize> {
        let call = OperationCall::start(
            "delete",
            Some(collection),
            json!({
                "ids_count": request.ids.as_ref().map_or(0, Vec::len),
                "has_where": request.where_filter.is_some(),
                "has_where_document": request.where_document.is_some(),
            }),
        );
        let outcome = self.store.delete(collection, request);
        self.finish(call, Effect::Mutation, &outcome, |deleted, details| {
            details.insert("deleted_count".to_string(), json!(deleted));
        });
        outcome
    }
}

impl QueryEngine for VectorDatabase {
    fn query(&self, collection: &str, request: QueryRequest) -> Result<QueryResult> {
        let call = OperationCall::start(
            "query",
            Some(collection),
            json!({
                "query_count": request.query_count(),
                "n_results": request.n_results,
                "has_where": request.where_filter.is_some(),
                "has_where_document": request.where_document.is_some(),
            }),
        );
        let outcome = self.store.query(collection, request);
        self.finish(call, Effect::Read, &outcome, |result, details| {
            details.insert("returned_count".to_string(), json!(result.returned_count()));
        });
        outcome
    }
}

/// Item operations scoped to one collection.
pub struct CollectionHandle<'a> {
    database: &'a mut VectorDatabase,
    info: CollectionInfo,
}

impl CollectionHandle<'_> {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    pub fn add(&mut self, request: AddRequest) -> Result<Vec<String>> {
        self.database.add(&self.info.name, request)
    }

    pub fn update(&mut self, request: UpdateRequest) -> Result<()> {
        self.database.update(&self.info.name, request)
    }

    pub fn get(&self, request: GetRequest) -> Result<GetResult> {
        self.database.get(&self.info.name, request)
    }

    pub fn delete(&mut self, request: DeleteRequest) -> Result<usize> {
        self.database.delete(&self.info.name, request)
    }

    pub fn query(&self, request: QueryRequest) -> Result<QueryResult> {
        self.database.query(&self.info.name, request)
    }

    pub fn count(&self) -> Result<usize> {
        self.database.count(&self.info.name)
    }

    pub fn peek(&self, limit: usize) -> Result<GetResult> {
        self.database.peek(&self.info.name, limit)
    }
}

#[cfg(test)]
mod tests;
