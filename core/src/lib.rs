#![forbid(unsafe_code)]
//! Embeddable vector store.
//!
//! Named collections hold items (id, embedding, optional document and
//! metadata) and answer exact nearest-neighbour queries ranked by cosine
//! distance, with metadata and document predicates applied before ranking.
//! State can live in memory or in a directory backed by a checksummed WAL
//! plus periodic snapshots. Every public call is recorded by a best-effort
//! telemetry layer that never fails the call it observes.

pub mod async_client;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod database;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod persistence;
pub mod query;
pub mod records;
pub mod store;
pub mod telemetry;
pub mod validation;
pub mod vector;

pub use async_client::{AsyncCollection, AsyncVectorDatabase};
pub use catalog::CollectionCatalog;
pub use collection::{CollectionInfo, ItemRecord, Metadata};
pub use config::DatabaseConfig;
pub use database::{CollectionHandle, VectorDatabase, DEFAULT_PEEK_LIMIT};
pub use embedding::{EmbeddingFunction, HashEmbedding, SharedEmbeddingFunction};
pub use error::{BoxError, Error, Result};
pub use filter::{Condition, DocumentFilter, FieldFilter, WhereFilter};
pub use persistence::{PersistOutcome, PersistenceError};
pub use query::{QueryEngine, QueryRequest, QueryResult, DEFAULT_N_RESULTS};
pub use records::{
    AddRequest, DeleteRequest, GetRequest, GetResult, Include, RecordStore, UpdateRequest,
};
pub use store::Store;
pub use telemetry::{OperationEvent, OperationStatus, StatsSnapshot};
pub use vector::{cosine_distance, cosine_similarity, dot_product, euclidean_distance, VectorError};
