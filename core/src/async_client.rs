//! Async façade over [`VectorDatabase`].
//!
//! Calls are serialized through a tokio mutex and executed on the blocking
//! pool, so WAL writes and ranking never stall the runtime.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task;

use crate::catalog::CollectionCatalog;
use crate::collection::{CollectionInfo, Metadata};
use crate::config::DatabaseConfig;
use crate::database::VectorDatabase;
use crate::embedding::SharedEmbeddingFunction;
use crate::error::{Error, Result};
use crate::persistence::PersistOutcome;
use crate::query::{QueryEngine, QueryRequest, QueryResult};
use crate::records::{AddRequest, DeleteRequest, GetRequest, GetResult, RecordStore, UpdateRequest};
use crate::telemetry::StatsSnapshot;

#[derive(Clone)]
pub struct AsyncVectorDatabase {
    inner: Arc<Mutex<VectorDatabase>>,
}

impl AsyncVectorDatabase {
    pub async fn open(
        config: DatabaseConfig,
        embedder: Option<SharedEmbeddingFunction>,
    ) -> Result<Self> {
        let database = task::spawn_blocking(move || VectorDatabase::open(config, embedder))
            .await
            .map_err(|error| Error::Worker(format!("open worker task failed: {error}")))??;
        Ok(Self::from_database(database))
    }

    pub fn from_database(database: VectorDatabase) -> Self {
        Self {
            inner: Arc::new(Mutex::new(database)),
        }
    }

    async fn run<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut VectorDatabase) -> Result<T> + Send + 'static,
    {
        let mut database = Arc::clone(&self.inner).lock_owned().await;
        task::spawn_blocking(move || call(&mut *database))
            .await
            .map_err(|error| Error::Worker(format!("{operation} worker task failed: {error}")))?
    }

    pub async fn create_collection(
        &self,
        name: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Result<CollectionInfo> {
        let name = name.into();
        self.run("create_collection", move |db| db.create_collection(&name, metadata))
            .await
    }

    pub async fn get_collection(&self, name: impl Into<String>) -> Result<Option<CollectionInfo>> {
        let name = name.into();
        self.run("get_collection", move |db| db.get_collection(&name))
            .await
    }

    pub async fn get_or_create_collection(
        &self,
        name: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Result<CollectionInfo> {
        let name = name.into();
        self.run("get_or_create_collection", move |db| {
            db.get_or_create_collection(&name, metadata)
        })
        .await
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.run("list_collections", |db| db.list_collections()).await
    }

    pub async fn delete_collection(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.run("delete_collection", move |db| db.delete_collection(&name))
            .await
    }

    pub async fn count(&self, name: impl Into<String>) -> Result<usize> {
        let name = name.into();
        self.run("count", move |db| db.count(&name)).await
    }

    pub async fn collection_exists(&self, name: impl Into<String>) -> Result<bool> {
        let name = name.into();
        self.run("collection_exists", move |db| db.collection_exists(&name))
            .await
    }

    pub async fn add(&self, collection: impl Into<String>, request: AddRequest) -> Result<Vec<String>> {
        let collection = collection.into();
        self.run("add", move |db| db.add(&collection, request)).await
    }

    pub async fn update(&self, collection: impl Into<String>, request: UpdateRequest) -> Result<()> {
        let collection = collection.into();
        self.run("update", move |db| db.update(&collection, request))
            .await
    }

    pub async fn get(&self, collection: impl Into<String>, request: GetRequest) -> Result<GetResult> {
        let collection = collection.into();
        self.run("get", move |db| db.get(&collection, request)).await
    }

    pub async fn delete(&self, collection: impl Into<String>, request: DeleteRequest) -> Result<usize> {
        let collection = collection.into();
        self.run("delete", move |db| db.delete(&collection, request))
            .await
    }

    pub async fn query(
        &self,
        collection: impl Into<String>,
        request: QueryRequest,
    ) -> Result<QueryResult> {
        let collection = collection.into();
        self.run("query", move |db| db.query(&collection, request))
            .await
    }

    pub async fn peek(&self, collection: impl Into<String>, limit: usize) -> Result<GetResult> {
        let collection = collection.into();
        self.run("peek", move |db| db.peek(&collection, limit)).await
    }

    pub async fn reset(&self) -> Result<usize> {
        self.run("reset", |db| db.reset()).await
    }

    pub async fn checkpoint(&self) -> Result<Option<PersistOutcome>> {
        self.run("checkpoint", |db| Ok(db.checkpoint())).await
    }

    pub async fn heartbeat(&self) -> u128 {
        self.inner.lock().await.heartbeat()
    }

    pub async fn stats(&self) -> StatsSnapshot {
        self.inner.lock().await.stats()
    }

    pub async fn telemetry_warnings(&self) -> u64 {
        self.inner.lock().await.telemetry_warnings()
    }

    /// Handle scoped to an existing collection.
    pub async fn collection(&self, name: impl Into<String>) -> Result<AsyncCollection> {
        let name = name.into();
        let info = self
            .get_collection(name.clone())
            .await?
            .ok_or(Error::CollectionNotFound(name))?;
        Ok(AsyncCollection {
            database: self.clone(),
            info,
        })
    }

    /// Checkpoints and closes the database. Fails while other clones of this
    /// handle are still alive.
    pub async fn close(self) -> Result<()> {
        let mutex = Arc::try_unwrap(self.inner).map_err(|shared| {
            Error::Worker(format!(
                "close requires the last handle; {} handles still alive",
                Arc::strong_count(&shared)
            ))
        })?;
        let database = mutex.into_inner();
        task::spawn_blocking(move || database.close())
            .await
            .map_err(|error| Error::Worker(format!("close worker task failed: {error}")))?
    }
}

/// Async item operations scoped to one collection.
#[derive(Clone)]
pub struct AsyncCollection {
    database: AsyncVectorDatabase,
    info: CollectionInfo,
}

impl AsyncCollection {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    pub async fn add(&self, request: AddRequest) -> Result<Vec<String>> {
        self.database.add(self.info.name.clone(), request).await
    }

    pub async fn update(&self, request: UpdateRequest) -> Result<()> {
        self.database.update(self.info.name.clone(), request).await
    }

    pub async fn get(&self, request: GetRequest) -> Result<GetResult> {
        self.database.get(self.info.name.clone(), request).await
    }

    pub async fn delete(&self, request: DeleteRequest) -> Result<usize> {
        self.database.delete(self.info.name.clone(), request).await
    }

    pub async fn query(&self, request: QueryRequest) -> Result<QueryResult> {
        self.database.query(self.info.name.clone(), request).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.database.count(self.info.name.clone()).await
    }

    pub async fn peek(&self, limit: usize) -> Result<GetResult> {
        self.database.peek(self.info.name.clone(), limit).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::embedding::HashEmbedding;

    #[tokio::test(flavor = "multi_thread")]
    async fn async_calls_mirror_the_blocking_database() {
        let database = AsyncVectorDatabase::open(
            DatabaseConfig::in_memory(),
            Some(Arc::new(HashEmbedding::new(8))),
        )
        .await
        .expect("open must succeed");

        database
            .create_collection("docs", None)
            .await
            .expect("create must succeed");
        let docs = database.collection("docs").await.expect("handle must resolve");
        docs.add(AddRequest::new(["x", "y"]).documents(["alpha beta", "gamma delta"]))
            .await
            .expect("add must succeed");

        assert_eq!(docs.count().await.expect("count must succeed"), 2);
        let hits = docs
            .query(QueryRequest::texts(["gamma delta"]).n_results(1))
            .await
            .expect("query must succeed");
        assert_eq!(hits.ids, vec![vec!["y".to_string()]]);
        assert_eq!(database.stats().await.total_documents, 2);

        drop(docs);
        database.close().await.expect("close must succeed");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_writers_are_serialized() {
        let database = AsyncVectorDatabase::from_database(
            VectorDatabase::in_memory(None).expect("open must succeed"),
        );
        database
            .create_collection("docs", None)
            .await
            .expect("create must succeed");

        let writers: Vec<_> = (0..8)
            .map(|index| {
                let database = database.clone();
                tokio::spawn(async move {
                    database
                        .add(
                            "docs",
                            AddRequest::new([format!("id-{index}")])
                                .embeddings(vec![vec![index as f32 + 1.0, 1.0]]),
                        )
                        .await
                })
            })
            .collect();
        for writer in writers {
            writer
                .await
                .expect("writer task must join")
                .expect("add must succeed");
        }

        assert_eq!(database.count("docs").await.expect("count must succeed"), 8);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn errors_pass_through_and_shared_close_is_refused() {
        let database = AsyncVectorDatabase::from_database(
            VectorDatabase::in_memory(None).expect("open must succeed"),
        );
        let error = database
            .count("missing")
            .await
            .expect_err("count must fail");
        assert!(error.is_not_found());

        let other = database.clone();
        let error = database.close().await.expect_err("close must fail");
        assert!(matches!(error, Error::Worker(_)));
        assert!(other.heartbeat().await > 0);
    }
}
