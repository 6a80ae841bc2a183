use std::env;
use std::time::Duration;

use serde_json::{Map, Value};

/// One benchmark result line.
pub(crate) struct Report {
    bench: &'static str,
    fields: Vec<(String, Value)>,
}

impl Report {
    pub(crate) fn new(bench: &'static str, mode: &str) -> Self {
        Self {
            bench,
            fields: vec![("mode".to_string(), Value::from(mode))],
        }
    }

    pub(crate) fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    /// Adds `<prefix>_p50_ms`, `<prefix>_p95_ms`, `<prefix>_avg_ms` and
    /// `<prefix>_qps` for `ops` operations per sample.
    pub(crate) fn latency(mut self, prefix: &str, samples: &Samples, ops: usize) -> Self {
        let (p50_ms, p95_ms, avg_ms) = summarize_ms(&samples.ms);
        let total = samples.total.as_secs_f64();
        let qps = if total > 0.0 {
            (ops * samples.ms.len()) as f64 / total
        } else {
            0.0
        };
        for (suffix, value) in [("p50_ms", p50_ms), ("p95_ms", p95_ms), ("avg_ms", avg_ms), ("qps", qps)] {
            self.fields
                .push((format!("{prefix}_{suffix}"), Value::from(round6(value))));
        }
        self
    }

    pub(crate) fn print(self) {
        if env::var("SKYVEC_BENCH_FORMAT").as_deref() == Ok("json") {
            let mut object = Map::new();
            object.insert("bench".to_string(), Value::from(self.bench));
            for (key, value) in self.fields {
                object.insert(key, value);
            }
            println!("{}", Value::Object(object));
            return;
        }

        let mut line = format!("bench={}", self.bench);
        for (key, value) in &self.fields {
            match value {
                Value::String(text) => line.push_str(&format!(" {key}=\"{text}\"")),
                other => line.push_str(&format!(" {key}={other}")),
            }
        }
        println!("{line}");
    }
}

pub(crate) struct Samples {
    ms: Vec<f64>,
    total: Duration,
}

impl Samples {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            ms: Vec::with_capacity(capacity),
            total: Duration::ZERO,
        }
    }

    pub(crate) fn push(&mut self, elapsed: Duration) {
        self.ms.push(elapsed.as_secs_f64() * 1_000.0);
        self.total += elapsed;
    }
}

fn summarize_ms(samples_ms: &[f64]) -> (f64, f64, f64) {
    if samples_ms.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let p50_ms = percentile_ms(samples_ms, 0.50);
    let p95_ms = percentile_ms(samples_ms, 0.95);
    let avg_ms = samples_ms.iter().sum::<f64>() / samples_ms.len() as f64;
    (p50_ms, p95_ms, avg_ms)
}

fn percentile_ms(samples_ms: &[f64], quantile: f64) -> f64 {
    let mut sorted = samples_ms.to_vec();
    sorted.sort_by(f64::total_cmp);
    let last_index = sorted.len().saturating_sub(1);
    let position = (quantile.clamp(0.0, 1.0) * last_index as f64).round() as usize;
    sorted[position]
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

pub(crate) fn read_usize_env_with_min(key: &str, default: usize, min: usize) -> usize {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value >= min => value,
        Ok(value) => {
            tracing::warn!(env = key, value, min, default, "value below minimum; using default");
            default
        }
        Err(_) => {
            tracing::warn!(env = key, value = %raw, default, "invalid usize; using default");
            default
        }
    }
}

pub(crate) fn deterministic_vector(seed: u64, dimension: usize) -> Vec<f32> {
    (0..dimension)
        .map(|index| {
            let mixed = (seed as usize)
                .wrapping_mul(31)
                .wrapping_add(index.wrapping_mul(17))
                % 10_000;
            mixed as f32 / 10_000.0 - 0.5
        })
        .collect()
}
