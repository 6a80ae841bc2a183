use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Metadata = serde_json::Map<String, Value>;

/// Storage-order key; grows monotonically within one collection.
pub type RowId = u64;

/// Catalog entry describing one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// One stored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    #[serde(default)]
    pub document: Option<String>,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    pub created_at: DateTime<Utc>,
}

/// Column-selective change for one existing item. `None` leaves a column
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.embedding.is_none() && self.document.is_none() && self.metadata.is_none()
    }
}

/// Dedicated item table of one collection, keyed by item id and iterated in
/// storage order.
#[derive(Debug, Clone)]
pub struct ItemTable {
    info: CollectionInfo,
    rows: BTreeMap<RowId, ItemRecord>,
    ids: HashMap<String, RowId>,
    next_row: RowId,
}

impl ItemTable {
    pub fn new(info: CollectionInfo) -> Self {
        Self {
            info,
            rows: BTreeMap::new(),
            ids: HashMap::new(),
            next_row: 0,
        }
    }

    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Inserts or fully replaces an item. A replaced item moves to the end
    /// of storage order. Returns true when the id was new.
    pub fn upsert(&mut self, record: ItemRecord) -> bool {
        let was_missing = match self.ids.remove(&record.id) {
            Some(row) => {
                self.rows.remove(&row);
                false
            }
            None => true,
        };

        let row = self.next_row;
        self.next_row = self.next_row.saturating_add(1);
        self.ids.insert(record.id.clone(), row);
        self.rows.insert(row, record);
        was_missing
    }

    /// Applies a patch in place. Unknown ids are a no-op returning false.
    pub fn apply_patch(&mut self, patch: &ItemPatch) -> bool {
        let Some(record) = self
            .ids
            .get(&patch.id)
            .and_then(|row| self.rows.get_mut(row))
        else {
            return false;
        };

        if let Some(embedding) = &patch.embedding {
            record.embedding = embedding.clone();
        }
        if let Some(document) = &patch.document {
            record.document = Some(document.clone());
        }
        if let Some(metadata) = &patch.metadata {
            record.metadata = Some(metadata.clone());
        }
        true
    }

    pub fn get(&self, id: &str) -> Option<&ItemRecord> {
        self.ids.get(id).and_then(|row| self.rows.get(row))
    }

    pub fn remove(&mut self, id: &str) -> Option<ItemRecord> {
        let row = self.ids.remove(id)?;
        self.rows.remove(&row)
    }

    /// Items in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &ItemRecord> + '_ {
        self.rows.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.rows.values().map(|record| record.id.clone()).collect()
    }
}

/// Catalog of item tables, iterated in creation order.
#[derive(Debug, Clone, Default)]
pub struct Collections {
    tables: BTreeMap<u64, ItemTable>,
    names: HashMap<String, u64>,
    next_seq: u64,
}

impl Collections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ItemTable> {
        self.names.get(name).and_then(|seq| self.tables.get(seq))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ItemTable> {
        self.names.get(name).and_then(|seq| self.tables.get_mut(seq))
    }

    /// Registers a table. Returns false, leaving the catalog unchanged, when
    /// the name is already taken.
    pub fn insert(&mut self, table: ItemTable) -> bool {
        if self.names.contains_key(table.name()) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.names.insert(table.name().to_string(), seq);
        self.tables.insert(seq, table);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<ItemTable> {
        let seq = self.names.remove(name)?;
        self.tables.remove(&seq)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemTable> + '_ {
        self.tables.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|table| table.name().to_string()).collect()
    }

    /// `(name, item count)` per collection, in creation order.
    pub fn counts(&self) -> Vec<(String, usize)> {
        self.iter()
            .map(|table| (table.name().to_string(), table.len()))
            .collect()
    }

    pub fn total_items(&self) -> usize {
        self.tables.values().map(ItemTable::len).sum()
    }
}
