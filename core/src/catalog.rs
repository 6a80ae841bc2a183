//! Collection catalog: named registry of item tables.

use chrono::Utc;

use crate::collection::{CollectionInfo, Metadata};
use crate::error::{Error, Result};
use crate::persistence::WalRecord;
use crate::store::Store;
use crate::validation::validate_collection_name;

pub trait CollectionCatalog {
    /// Fails with [`Error::CollectionAlreadyExists`] when the name is taken.
    fn create_collection(&mut self, name: &str, metadata: Option<Metadata>)
        -> Result<CollectionInfo>;

    fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Existing metadata is never overwritten by `metadata`.
    fn get_or_create_collection(
        &mut self,
        name: &str,
        metadata: Option<Metadata>,
    ) -> Result<CollectionInfo>;

    /// Collections in creation order.
    fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Drops the collection and every item in it.
    fn delete_collection(&mut self, name: &str) -> Result<()>;

    fn count(&self, name: &str) -> Result<usize>;

    fn collection_exists(&self, name: &str) -> Result<bool>;
}

impl CollectionCatalog for Store {
    fn create_collection(
        &mut self,
        name: &str,
        metadata: Option<Metadata>,
    ) -> Result<CollectionInfo> {
        validate_collection_name(name)?;
        if self.collections().contains(name) {
            return Err(Error::CollectionAlreadyExists(name.to_string()));
        }

        let info = CollectionInfo {
            name: name.to_string(),
            metadata: metadata.unwrap_or_default(),
            created_at: Utc::now(),
        };
        self.commit(vec![WalRecord::CreateCollection {
            name: info.name.clone(),
            metadata: info.metadata.clone(),
            created_at: info.created_at,
        }])?;
        tracing::debug!(collection = name, "created collection");
        Ok(info)
    }

    fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        validate_collection_name(name)?;
        Ok(self.collections().get(name).map(|table| table.info().clone()))
    }

    fn get_or_create_collection(
        &mut self,
        name: &str,
        metadata: Option<Metadata>,
    ) -> Result<CollectionInfo> {
        if let Some(existing) = self.get_collection(name)? {
            return Ok(existing);
        }
        self.create_collection(name, metadata)
    }

    fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self
            .collections()
            .iter()
            .map(|table| table.info().clone())
            .collect())
    }

    fn delete_collection(&mut self, name: &str) -> Result<()> {
        let dropped = self.table(name)?.len();
        self.commit(vec![WalRecord::DeleteCollection {
            name: name.to_string(),
        }])?;
        tracing::debug!(collection = name, items = dropped, "deleted collection");
        Ok(())
    }

    fn count(&self, name: &str) -> Result<usize> {
        Ok(self.table(name)?.len())
    }

    fn collection_exists(&self, name: &str) -> Result<bool> {
        validate_collection_name(name)?;
        Ok(self.collections().contains(name))
    }
}

impl Store {
    /// Deletes every collection in a single WAL batch and returns how many
    /// were dropped.
    pub fn reset(&mut self) -> Result<usize> {
        let records: Vec<WalRecord> = self
            .collections()
            .names()
            .into_iter()
            .map(|name| WalRecord::DeleteCollection { name })
            .collect();
        let dropped = records.len();
        self.commit(records)?;
        Ok(dropped)
    }
}
