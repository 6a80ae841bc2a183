use std::time::{Duration, Instant};

use skyvec_core::cosine_distance;

use crate::report::{deterministic_vector, read_usize_env_with_min, Report, Samples};

const DEFAULT_DIMENSION: usize = 128;
const DEFAULT_DATASET_SIZE: usize = 10_000;
const DEFAULT_WARMUP_RUNS: usize = 8;
const DEFAULT_MEASURED_RUNS: usize = 50;

pub(crate) fn run(mode: &str) -> bool {
    let dimension = read_usize_env_with_min("SKYVEC_BENCH_DIMENSION", DEFAULT_DIMENSION, 1);
    let dataset_size =
        read_usize_env_with_min("SKYVEC_BENCH_DATASET_SIZE", DEFAULT_DATASET_SIZE, 1);
    let warmup_runs = read_usize_env_with_min("SKYVEC_BENCH_WARMUP_RUNS", DEFAULT_WARMUP_RUNS, 0);
    let measured_runs =
        read_usize_env_with_min("SKYVEC_BENCH_MEASURED_RUNS", DEFAULT_MEASURED_RUNS, 1);

    let query = deterministic_vector(42, dimension);
    let dataset: Vec<Vec<f32>> = (0..dataset_size)
        .map(|id| deterministic_vector(id as u64, dimension))
        .collect();

    for _ in 0..warmup_runs {
        if scan_once(&query, &dataset).is_none() {
            return false;
        }
    }

    let mut samples = Samples::with_capacity(measured_runs);
    let mut last_best = (0usize, f32::MAX);
    for _ in 0..measured_runs {
        let Some((elapsed, best_id, best_distance)) = scan_once(&query, &dataset) else {
            return false;
        };
        samples.push(elapsed);
        last_best = (best_id, best_distance);
    }

    Report::new("cosine_scan", mode)
        .field("dataset_size", dataset_size)
        .field("dimension", dimension)
        .field("measured_runs", measured_runs)
        .latency("scan", &samples, dataset_size)
        .field("best_id", last_best.0)
        .field("best_distance", f64::from(last_best.1))
        .print();
    true
}

fn scan_once(query: &[f32], dataset: &[Vec<f32>]) -> Option<(Duration, usize, f32)> {
    let started_at = Instant::now();
    let mut best_id = 0usize;
    let mut best_distance = f32::MAX;

    for (id, candidate) in dataset.iter().enumerate() {
        let distance = match cosine_distance(query, candidate) {
            Ok(value) => value,
            Err(error) => {
                tracing::error!(%error, id, "cosine distance failed");
                return None;
            }
        };
        if distance < best_distance {
            best_distance = distance;
            best_id = id;
        }
    }

    Some((started_at.elapsed(), best_id, best_distance))
}
