use crate::collection::{Collections, ItemTable};
use crate::config::DatabaseConfig;
use crate::embedding::{embed_batch, SharedEmbeddingFunction};
use crate::error::{Error, Result};
use crate::persistence::{apply_wal_record, PersistOutcome, Persistence, WalRecord};
use crate::validation::validate_collection_name;

/// Untracked engine state: the catalog, its item tables and the optional
/// durable backing store. Telemetry is layered on top by
/// [`crate::VectorDatabase`].
pub struct Store {
    collections: Collections,
    persistence: Option<Persistence>,
    embedder: Option<SharedEmbeddingFunction>,
}

impl Store {
    pub fn in_memory(embedder: Option<SharedEmbeddingFunction>) -> Self {
        Self {
            collections: Collections::new(),
            persistence: None,
            embedder,
        }
    }

    pub fn open(config: &DatabaseConfig, embedder: Option<SharedEmbeddingFunction>) -> Result<Self> {
        config.validate()?;
        let Some(data_dir) = config.data_dir() else {
            return Ok(Self::in_memory(embedder));
        };

        let (persistence, collections) = Persistence::open(
            data_dir,
            config.wal_sync_on_write,
            config.checkpoint_interval,
        )?;
        tracing::debug!(
            data_dir = %data_dir.display(),
            collections = collections.len(),
            items = collections.total_items(),
            "restored vector store"
        );
        Ok(Self {
            collections,
            persistence: Some(persistence),
            embedder,
        })
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    /// Validates `name` and resolves its table.
    pub(crate) fn table(&self, name: &str) -> Result<&ItemTable> {
        validate_collection_name(name)?;
        self.collections
            .get(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    pub(crate) fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embed_batch(self.embedder.as_ref(), texts)
    }

    /// Durably appends `records` and then applies them to memory. A failed
    /// append leaves the in-memory state untouched.
    pub(crate) fn commit(&mut self, records: Vec<WalRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(persistence) = self.persistence.as_mut() {
            persistence.append(&records)?;
        }
        for record in &records {
            apply_wal_record(&mut self.collections, record)?;
        }
        if let Some(persistence) = self.persistence.as_mut() {
            let _ = persistence.after_commit(records.len(), &self.collections);
        }
        Ok(())
    }

    /// Forces a snapshot checkpoint. `None` for in-memory stores.
    pub fn checkpoint(&mut self) -> Option<PersistOutcome> {
        let persistence = self.persistence.as_mut()?;
        Some(persistence.checkpoint(&self.collections))
    }
}
