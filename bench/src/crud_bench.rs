use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use skyvec_core::{
    AddRequest, CollectionCatalog, DatabaseConfig, DeleteRequest, GetRequest, RecordStore,
    UpdateRequest, VectorDatabase,
};

use crate::report::{deterministic_vector, read_usize_env_with_min, Report, Samples};

const COLLECTION: &str = "bench_crud";
const DEFAULT_DIMENSION: usize = 64;
const DEFAULT_POINTS: usize = 5_000;
const DEFAULT_BATCH: usize = 100;
const DEFAULT_MEASURED_RUNS: usize = 5;

#[derive(Clone, Copy)]
struct CrudConfig {
    dimension: usize,
    points: usize,
    batch: usize,
    measured_runs: usize,
    persistent: bool,
}

fn load_config() -> CrudConfig {
    CrudConfig {
        dimension: read_usize_env_with_min("SKYVEC_BENCH_DIMENSION", DEFAULT_DIMENSION, 1),
        points: read_usize_env_with_min("SKYVEC_BENCH_CRUD_POINTS", DEFAULT_POINTS, 1),
        batch: read_usize_env_with_min("SKYVEC_BENCH_CRUD_BATCH", DEFAULT_BATCH, 1),
        measured_runs: read_usize_env_with_min(
            "SKYVEC_BENCH_MEASURED_RUNS",
            DEFAULT_MEASURED_RUNS,
            1,
        ),
        persistent: env::var("SKYVEC_BENCH_PERSISTENT").as_deref() == Ok("1"),
    }
}

struct PhaseSamples {
    add: Samples,
    get: Samples,
    update: Samples,
    delete: Samples,
}

pub(crate) fn run(mode: &str) -> bool {
    let config = load_config();
    let mut phases = PhaseSamples {
        add: Samples::with_capacity(config.measured_runs),
        get: Samples::with_capacity(config.measured_runs),
        update: Samples::with_capacity(config.measured_runs),
        delete: Samples::with_capacity(config.measured_runs),
    };

    for run in 0..config.measured_runs {
        let data_dir = config.persistent.then(|| bench_dir(run));
        let outcome = run_once(&config, data_dir.clone(), &mut phases);
        if let Some(dir) = data_dir {
            let _ = fs::remove_dir_all(dir);
        }
        if let Err(error) = outcome {
            tracing::error!(%error, run, "crud run failed");
            return false;
        }
    }

    let batches = config.points.div_ceil(config.batch);
    Report::new("crud", mode)
        .field("points", config.points)
        .field("dimension", config.dimension)
        .field("batch", config.batch)
        .field("persistent", config.persistent)
        .latency("add", &phases.add, config.points)
        .latency("get", &phases.get, batches)
        .latency("update", &phases.update, config.points)
        .latency("delete", &phases.delete, config.points)
        .print();
    true
}

fn run_once(
    config: &CrudConfig,
    data_dir: Option<PathBuf>,
    phases: &mut PhaseSamples,
) -> skyvec_core::Result<()> {
    let database_config = match data_dir {
        Some(dir) => DatabaseConfig::persistent(dir)
            .with_wal_sync_on_write(false)
            .with_telemetry_enabled(false),
        None => DatabaseConfig::in_memory(),
    };
    let mut database = VectorDatabase::open(database_config, None)?;
    database.create_collection(COLLECTION, None)?;

    let batches: Vec<Vec<usize>> = (0..config.points)
        .collect::<Vec<_>>()
        .chunks(config.batch)
        .map(<[usize]>::to_vec)
        .collect();
    let ids_of = |batch: &[usize]| -> Vec<String> { batch.iter().map(|id| format!("p{id}")).collect() };
    let vectors_of = |batch: &[usize], salt: u64| -> Vec<Vec<f32>> {
        batch
            .iter()
            .map(|id| deterministic_vector(*id as u64 + salt, config.dimension))
            .collect()
    };

    let started = Instant::now();
    for batch in &batches {
        database.add(
            COLLECTION,
            AddRequest::new(ids_of(batch)).embeddings(vectors_of(batch, 0)),
        )?;
    }
    phases.add.push(started.elapsed());

    let started = Instant::now();
    let mut fetched = 0usize;
    for batch in &batches {
        fetched += database.get(COLLECTION, GetRequest::ids(ids_of(batch)))?.len();
    }
    phases.get.push(started.elapsed());
    if fetched != config.points {
        tracing::warn!(fetched, expected = config.points, "get returned fewer items than added");
    }

    let started = Instant::now();
    for batch in &batches {
        database.update(
            COLLECTION,
            UpdateRequest::new(ids_of(batch)).embeddings(vectors_of(batch, 1)),
        )?;
    }
    phases.update.push(started.elapsed());

    let started = Instant::now();
    for batch in &batches {
        database.delete(COLLECTION, DeleteRequest::ids(ids_of(batch)))?;
    }
    phases.delete.push(started.elapsed());

    database.close()
}

fn bench_dir(run: usize) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    env::temp_dir().join(format!("skyvec-bench-{}-{nanos}-{run}", process::id()))
}
