#![forbid(unsafe_code)]
//! Micro-benchmarks for skyvec.
//!
//! Scenarios (`SKYVEC_BENCH_SCENARIO`):
//! - `distance`: raw cosine-distance scan + top-1
//! - `query`: filtered top-K queries through the database façade
//! - `crud`: add/get/update/delete throughput, in memory or on disk
//!
//! Results are printed as `key=value` lines, or one JSON object per line
//! with `SKYVEC_BENCH_FORMAT=json`.

mod crud_bench;
mod distance_bench;
mod query_bench;
mod report;

use std::env;
use std::process;

use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if cfg!(debug_assertions) && env::var("SKYVEC_ALLOW_DEBUG_BENCH").as_deref() != Ok("1") {
        tracing::error!("run `cargo run --release -p skyvec-bench` or set SKYVEC_ALLOW_DEBUG_BENCH=1");
        process::exit(2);
    }

    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    let scenario = env::var("SKYVEC_BENCH_SCENARIO").unwrap_or_else(|_| "all".to_string());
    let ok = match scenario.as_str() {
        "all" => {
            distance_bench::run(mode) && query_bench::run(mode) && crud_bench::run(mode)
        }
        "distance" => distance_bench::run(mode),
        "query" => query_bench::run(mode),
        "crud" => crud_bench::run(mode),
        _ => {
            tracing::error!(
                scenario = %scenario,
                allowed = "all,distance,query,crud",
                "invalid benchmark scenario"
            );
            false
        }
    };

    if !ok {
        process::exit(1);
    }
}
