//! Best-effort operation telemetry.
//!
//! Every public database call produces one [`OperationEvent`] appended to
//! `log.jsonl`, and updates a [`StatsSnapshot`] mirrored to `stats.json`.
//! Nothing in here may fail a database call: callers receive a
//! [`TelemetryError`], log it and move on.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::persistence::fsync::{ensure_parent_dir, write_file_atomically};

pub const LOG_FILE_NAME: &str = "log.jsonl";
pub const STATS_FILE_NAME: &str = "stats.json";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("telemetry stats lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Error,
}

/// One line of the operation log. `details` holds counts and flags only,
/// never payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEvent {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub document_count: usize,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_collections: usize,
    pub total_documents: usize,
    pub last_operation: Option<String>,
    pub last_status: Option<OperationStatus>,
    pub last_collection: Option<String>,
    pub last_operation_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub collections: Vec<CollectionStats>,
}

impl StatsSnapshot {
    fn note_operation(&mut self, event: &OperationEvent) {
        self.last_operation = Some(event.operation.clone());
        self.last_status = Some(event.status);
        self.last_collection = event.collection.clone();
        self.last_operation_at = Some(event.timestamp);
        self.updated_at = Some(Utc::now());
    }
}

/// How an event affects the stats snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotUpdate {
    /// Recount everything from the given `(collection, item count)` pairs.
    Full(Vec<(String, usize)>),
    LastOperation,
    Untouched,
}

#[derive(Debug, Clone)]
struct TelemetrySink {
    log_path: PathBuf,
    stats_path: PathBuf,
}

#[derive(Debug)]
pub struct TelemetryRecorder {
    sink: Option<TelemetrySink>,
    stats: Mutex<StatsSnapshot>,
    warnings: AtomicU64,
}

impl TelemetryRecorder {
    /// Keeps stats in memory only.
    pub fn in_memory() -> Self {
        Self {
            sink: None,
            stats: Mutex::new(StatsSnapshot::default()),
            warnings: AtomicU64::new(0),
        }
    }

    /// Writes `log.jsonl` and `stats.json` under `dir`. Directories are
    /// created lazily on first write.
    pub fn with_dir(dir: &Path) -> Self {
        Self {
            sink: Some(TelemetrySink {
                log_path: dir.join(LOG_FILE_NAME),
                stats_path: dir.join(STATS_FILE_NAME),
            }),
            ..Self::in_memory()
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|sink| sink.log_path.as_path())
    }

    pub fn stats_path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|sink| sink.stats_path.as_path())
    }

    /// Logs the event and applies `update`. Both steps are attempted; the
    /// first failure is returned.
    pub fn record(
        &self,
        event: &OperationEvent,
        update: SnapshotUpdate,
    ) -> Result<(), TelemetryError> {
        let logged = self.log_event(event);
        let snapshot = match update {
            SnapshotUpdate::Full(counts) => self.refresh_full_snapshot(&counts, event),
            SnapshotUpdate::LastOperation => self.update_last_operation(event),
            SnapshotUpdate::Untouched => Ok(()),
        };
        logged.and(snapshot)
    }

    pub fn log_event(&self, event: &OperationEvent) -> Result<(), TelemetryError> {
        let Some(sink) = self.sink.as_ref() else {
            return Ok(());
        };
        ensure_parent_dir(&sink.log_path)?;

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&sink.log_path)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    pub fn refresh_full_snapshot(
        &self,
        counts: &[(String, usize)],
        event: &OperationEvent,
    ) -> Result<(), TelemetryError> {
        let now = Utc::now();
        let snapshot = {
            let mut stats = self.stats.lock().map_err(|_| TelemetryError::LockPoisoned)?;
            stats.total_collections = counts.len();
            stats.total_documents = counts.iter().map(|(_, count)| count).sum();
            stats.collections = counts
                .iter()
                .map(|(name, count)| CollectionStats {
                    name: name.clone(),
                    document_count: *count,
                    updated_at: now,
                })
                .collect();
            stats.note_operation(event);
            stats.clone()
        };
        self.persist_stats(&snapshot)
    }

    pub fn update_last_operation(&self, event: &OperationEvent) -> Result<(), TelemetryError> {
        let snapshot = {
            let mut stats = self.stats.lock().map_err(|_| TelemetryError::LockPoisoned)?;
            stats.note_operation(event);
            stats.clone()
        };
        self.persist_stats(&snapshot)
    }

    pub fn stats(&self) -> Result<StatsSnapshot, TelemetryError> {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .map_err(|_| TelemetryError::LockPoisoned)
    }

    /// Downgrades a telemetry failure to a warning.
    pub fn warn(&self, operation: &str, error: &TelemetryError) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(%error, operation, "telemetry write failed; operation result unaffected");
    }

    pub fn warnings(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }

    fn persist_stats(&self, snapshot: &StatsSnapshot) -> Result<(), TelemetryError> {
        let Some(sink) = self.sink.as_ref() else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_file_atomically(&sink.stats_path, &bytes)?;
        Ok(())
    }
}
