use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collection::{CollectionInfo, Collections, ItemRecord, ItemTable};

use super::fsync::write_file_atomically;
use super::PersistenceError;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDocument {
    version: u32,
    collections: Vec<SnapshotCollection>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotCollection {
    #[serde(flatten)]
    info: CollectionInfo,
    items: Vec<ItemRecord>,
}

pub fn load_snapshot(path: &Path) -> Result<Collections, PersistenceError> {
    if !path.exists() {
        return Ok(Collections::new());
    }

    let raw = fs::read_to_string(path)?;
    let snapshot: SnapshotDocument = serde_json::from_str(&raw)?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(PersistenceError::InvalidData(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }

    let mut collections = Collections::new();
    for entry in snapshot.collections {
        let name = entry.info.name.clone();
        let mut table = ItemTable::new(entry.info);
        for item in entry.items {
            table.upsert(item);
        }
        if !collections.insert(table) {
            return Err(PersistenceError::InvalidData(format!(
                "duplicate collection '{name}' in snapshot"
            )));
        }
    }

    Ok(collections)
}

pub fn write_snapshot(path: &Path, collections: &Collections) -> Result<(), PersistenceError> {
    let snapshot = SnapshotDocument {
        version: SNAPSHOT_VERSION,
        collections: collections.iter().map(snapshot_collection_from).collect(),
    };

    let bytes = serde_json::to_vec(&snapshot)?;
    write_file_atomically(path, &bytes)?;
    Ok(())
}

fn snapshot_collection_from(table: &ItemTable) -> SnapshotCollection {
    SnapshotCollection {
        info: table.info().clone(),
        items: table.iter().cloned().collect(),
    }
}
