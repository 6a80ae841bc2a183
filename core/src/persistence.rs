//! Durable backing store: a checksummed JSONL write-ahead log plus a full
//! JSON snapshot written at checkpoints.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collection::{CollectionInfo, Collections, ItemPatch, ItemRecord, ItemTable, Metadata};

pub(crate) mod fsync;
mod snapshot;
mod wal;

pub use snapshot::{load_snapshot, write_snapshot};
pub use wal::{append_wal_batch, replay_wal, truncate_wal};

pub const WAL_FILE_NAME: &str = "skyvec_wal.jsonl";
pub const SNAPSHOT_FILE_NAME: &str = "skyvec_snapshot.json";

/// One committed mutation. Applying the same record twice converges to the
/// same state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalRecord {
    CreateCollection {
        name: String,
        #[serde(default)]
        metadata: Metadata,
        created_at: DateTime<Utc>,
    },
    DeleteCollection {
        name: String,
    },
    UpsertItems {
        collection: String,
        items: Vec<ItemRecord>,
    },
    UpdateItems {
        collection: String,
        patches: Vec<ItemPatch>,
    },
    DeleteItems {
        collection: String,
        ids: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid persistence data: {0}")]
    InvalidData(String),
    #[error("wal checksum mismatch on line {line}: expected {expected:#010x}, got {actual:#010x}")]
    Checksum {
        line: usize,
        expected: u32,
        actual: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Checkpointed,
    WalOnly { reason: String },
}

pub fn load_collections(
    snapshot_path: &Path,
    wal_path: &Path,
) -> Result<Collections, PersistenceError> {
    let mut collections = load_snapshot(snapshot_path)?;
    replay_wal(wal_path, &mut collections)?;
    Ok(collections)
}

/// Writes a full snapshot and truncates the WAL. Failures downgrade to
/// [`PersistOutcome::WalOnly`]; the WAL still holds every committed record.
pub fn checkpoint(
    snapshot_path: &Path,
    wal_path: &Path,
    collections: &Collections,
) -> PersistOutcome {
    match write_snapshot(snapshot_path, collections).and_then(|_| truncate_wal(wal_path)) {
        Ok(()) => PersistOutcome::Checkpointed,
        Err(error) => PersistOutcome::WalOnly {
            reason: error.to_string(),
        },
    }
}

/// How [`apply_record`] treats item records aimed at a missing collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyMode {
    /// A live commit; the collection must exist.
    Live,
    /// WAL replay; a later record in the same log may have dropped the
    /// collection after a checkpoint failed to truncate, so the record is
    /// skipped.
    Replay,
}

/// Applies a freshly committed record. Item records for an unknown
/// collection are rejected.
pub fn apply_wal_record(
    collections: &mut Collections,
    record: &WalRecord,
) -> Result<(), PersistenceError> {
    apply_record(collections, record, ApplyMode::Live)
}

/// Applies a record read back from the WAL. Item records for an unknown
/// collection are no-ops.
pub fn replay_wal_record(
    collections: &mut Collections,
    record: &WalRecord,
) -> Result<(), PersistenceError> {
    apply_record(collections, record, ApplyMode::Replay)
}

fn apply_record(
    collections: &mut Collections,
    record: &WalRecord,
    mode: ApplyMode,
) -> Result<(), PersistenceError> {
    match record {
        WalRecord::CreateCollection {
            name,
            metadata,
            created_at,
        } => {
            if collections.contains(name) {
                return Ok(());
            }
            collections.insert(ItemTable::new(CollectionInfo {
                name: name.clone(),
                metadata: metadata.clone(),
                created_at: *created_at,
            }));
            Ok(())
        }
        WalRecord::DeleteCollection { name } => {
            let _ = collections.remove(name);
            Ok(())
        }
        WalRecord::UpsertItems { collection, items } => {
            let Some(target) = target_table(collections, collection, mode)? else {
                return Ok(());
            };
            for item in items {
                target.upsert(item.clone());
            }
            Ok(())
        }
        WalRecord::UpdateItems {
            collection,
            patches,
        } => {
            let Some(target) = target_table(collections, collection, mode)? else {
                return Ok(());
            };
            for patch in patches {
                let _ = target.apply_patch(patch);
            }
            Ok(())
        }
        WalRecord::DeleteItems { collection, ids } => {
            let Some(target) = target_table(collections, collection, mode)? else {
                return Ok(());
            };
            for id in ids {
                let _ = target.remove(id);
            }
            Ok(())
        }
    }
}

fn target_table<'a>(
    collections: &'a mut Collections,
    name: &str,
    mode: ApplyMode,
) -> Result<Option<&'a mut ItemTable>, PersistenceError> {
    match (collections.get_mut(name), mode) {
        (Some(table), _) => Ok(Some(table)),
        (None, ApplyMode::Replay) => {
            tracing::debug!(collection = name, "skipping wal record for dropped collection");
            Ok(None)
        }
        (None, ApplyMode::Live) => Err(PersistenceError::InvalidData(format!(
            "collection '{name}' does not exist"
        ))),
    }
}

/// WAL + snapshot pair rooted in one data directory, with checkpoint
/// scheduling.
#[derive(Debug)]
pub struct Persistence {
    snapshot_path: PathBuf,
    wal_path: PathBuf,
    sync_on_write: bool,
    checkpoint_interval: usize,
    wal_records: u64,
}

impl Persistence {
    /// Opens the store under `data_dir` and restores its state.
    pub fn open(
        data_dir: &Path,
        sync_on_write: bool,
        checkpoint_interval: usize,
    ) -> Result<(Self, Collections), PersistenceError> {
        if checkpoint_interval == 0 {
            return Err(PersistenceError::InvalidData(
                "checkpoint interval must be > 0".to_string(),
            ));
        }
        let persistence = Self {
            snapshot_path: data_dir.join(SNAPSHOT_FILE_NAME),
            wal_path: data_dir.join(WAL_FILE_NAME),
            sync_on_write,
            checkpoint_interval,
            wal_records: 0,
        };
        let collections = load_collections(&persistence.snapshot_path, &persistence.wal_path)?;
        Ok((persistence, collections))
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    /// Appends records as one atomic batch. Nothing may be applied to memory
    /// unless this succeeds.
    pub fn append(&mut self, records: &[WalRecord]) -> Result<(), PersistenceError> {
        append_wal_batch(&self.wal_path, records, self.sync_on_write)
    }

    /// Counts freshly applied records and checkpoints when an interval
    /// boundary was crossed.
    pub fn after_commit(
        &mut self,
        records_added: usize,
        collections: &Collections,
    ) -> Option<PersistOutcome> {
        let before = self.wal_records;
        let added = records_added as u64;
        self.wal_records = before.saturating_add(added);
        if !checkpoint_due_in_range(before, added, self.checkpoint_interval) {
            return None;
        }
        Some(self.checkpoint(collections))
    }

    pub fn checkpoint(&mut self, collections: &Collections) -> PersistOutcome {
        let outcome = checkpoint(&self.snapshot_path, &self.wal_path, collections);
        match &outcome {
            PersistOutcome::Checkpointed => {
                tracing::debug!(
                    collections = collections.len(),
                    items = collections.total_items(),
                    "snapshot checkpoint written"
                );
            }
            PersistOutcome::WalOnly { reason } => {
                tracing::warn!(%reason, "snapshot checkpoint skipped, relying on wal replay");
            }
        }
        outcome
    }
}

fn checkpoint_due_in_range(
    records_before: u64,
    records_added: u64,
    checkpoint_interval: usize,
) -> bool {
    if records_added == 0 {
        return false;
    }
    let interval = checkpoint_interval as u64;
    let records_after = records_before.saturating_add(records_added);
    (records_before / interval) != (records_after / interval)
}
