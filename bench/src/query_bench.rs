use std::time::Instant;

use serde_json::json;
use skyvec_core::{
    AddRequest, CollectionCatalog, Include, Metadata, QueryEngine, QueryRequest, RecordStore,
    VectorDatabase, WhereFilter,
};

use crate::report::{deterministic_vector, read_usize_env_with_min, Report, Samples};

const COLLECTION: &str = "bench_query";
const DEFAULT_DIMENSION: usize = 128;
const DEFAULT_POINTS: usize = 20_000;
const DEFAULT_BATCH: usize = 8;
const DEFAULT_TOP_K: usize = 10;
const DEFAULT_MEASURED_RUNS: usize = 20;
const GROUPS: usize = 4;

pub(crate) fn run(mode: &str) -> bool {
    let dimension = read_usize_env_with_min("SKYVEC_BENCH_DIMENSION", DEFAULT_DIMENSION, 1);
    let points = read_usize_env_with_min("SKYVEC_BENCH_QUERY_POINTS", DEFAULT_POINTS, 1);
    let batch = read_usize_env_with_min("SKYVEC_BENCH_QUERY_BATCH", DEFAULT_BATCH, 1);
    let top_k = read_usize_env_with_min("SKYVEC_BENCH_TOP_K", DEFAULT_TOP_K, 1);
    let measured_runs =
        read_usize_env_with_min("SKYVEC_BENCH_MEASURED_RUNS", DEFAULT_MEASURED_RUNS, 1);

    let mut database = match VectorDatabase::in_memory(None) {
        Ok(database) => database,
        Err(error) => {
            tracing::error!(%error, "database open failed");
            return false;
        }
    };
    if let Err(error) = seed(&mut database, points, dimension) {
        tracing::error!(%error, "seeding failed");
        return false;
    }

    let queries: Vec<Vec<f32>> = (0..batch)
        .map(|index| deterministic_vector(7_919 + index as u64, dimension))
        .collect();
    let unfiltered = QueryRequest::embeddings(queries.clone())
        .n_results(top_k)
        .include(Include::ids_only());
    let filtered = unfiltered
        .clone()
        .where_filter(WhereFilter::eq("group", 1));

    let mut plain_samples = Samples::with_capacity(measured_runs);
    let mut filtered_samples = Samples::with_capacity(measured_runs);
    let mut returned = 0usize;
    for _ in 0..measured_runs {
        let started = Instant::now();
        match database.query(COLLECTION, unfiltered.clone()) {
            Ok(result) => returned = result.returned_count(),
            Err(error) => {
                tracing::error!(%error, "unfiltered query failed");
                return false;
            }
        }
        plain_samples.push(started.elapsed());

        let started = Instant::now();
        if let Err(error) = database.query(COLLECTION, filtered.clone()) {
            tracing::error!(%error, "filtered query failed");
            return false;
        }
        filtered_samples.push(started.elapsed());
    }

    Report::new("query_top_k", mode)
        .field("points", points)
        .field("dimension", dimension)
        .field("batch", batch)
        .field("top_k", top_k)
        .latency("plain", &plain_samples, batch)
        .latency("filtered", &filtered_samples, batch)
        .field("returned", returned)
        .print();
    true
}

fn seed(database: &mut VectorDatabase, points: usize, dimension: usize) -> skyvec_core::Result<()> {
    database.create_collection(COLLECTION, None)?;
    let ids: Vec<String> = (0..points).map(|id| format!("p{id}")).collect();
    let embeddings: Vec<Vec<f32>> = (0..points)
        .map(|id| deterministic_vector(id as u64, dimension))
        .collect();
    let metadatas: Vec<Metadata> = (0..points)
        .map(|id| {
            let mut metadata = Metadata::new();
            metadata.insert("group".to_string(), json!(id % GROUPS));
            metadata
        })
        .collect();
    database.add(
        COLLECTION,
        AddRequest::new(ids).embeddings(embeddings).metadatas(metadatas),
    )?;
    Ok(())
}
