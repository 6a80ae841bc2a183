//! Record store: per-collection add, update, get and delete.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::collection::{ItemPatch, ItemRecord, ItemTable, Metadata};
use crate::error::{Error, Result};
use crate::filter::{matches, DocumentFilter, WhereFilter};
use crate::persistence::WalRecord;
use crate::store::Store;
use crate::vector::validate_vector;

/// Fields populated in get/query results. Ids are always returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Include {
    pub embeddings: bool,
    pub documents: bool,
    pub metadatas: bool,
    pub distances: bool,
}

impl Include {
    /// Embeddings, documents and metadatas.
    pub const fn get_default() -> Self {
        Self {
            embeddings: true,
            documents: true,
            metadatas: true,
            distances: false,
        }
    }

    /// Everything, including distances.
    pub const fn query_default() -> Self {
        Self {
            embeddings: true,
            documents: true,
            metadatas: true,
            distances: true,
        }
    }

    pub const fn ids_only() -> Self {
        Self {
            embeddings: false,
            documents: false,
            metadatas: false,
            distances: false,
        }
    }

    /// Parses names such as `["documents", "distances"]`.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Result<Self> {
        let mut include = Self::ids_only();
        for field in fields {
            match field.as_ref() {
                "embeddings" => include.embeddings = true,
                "documents" => include.documents = true,
                "metadatas" => include.metadatas = true,
                "distances" => include.distances = true,
                other => {
                    return Err(Error::validation(format!(
                        "unknown include field '{other}'"
                    )))
                }
            }
        }
        Ok(include)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddRequest {
    pub ids: Vec<String>,
    pub embeddings: Option<Vec<Vec<f32>>>,
    pub documents: Option<Vec<String>>,
    pub metadatas: Option<Vec<Metadata>>,
}

impl AddRequest {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn embeddings(mut self, embeddings: Vec<Vec<f32>>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    pub fn documents<I, S>(mut self, documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.documents = Some(documents.into_iter().map(Into::into).collect());
        self
    }

    pub fn metadatas(mut self, metadatas: Vec<Metadata>) -> Self {
        self.metadatas = Some(metadatas);
        self
    }
}

/// Column-selective update. Only supplied lists change stored values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRequest {
    pub ids: Vec<String>,
    pub embeddings: Option<Vec<Vec<f32>>>,
    pub documents: Option<Vec<String>>,
    pub metadatas: Option<Vec<Metadata>>,
}

impl UpdateRequest {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn embeddings(mut self, embeddings: Vec<Vec<f32>>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    pub fn documents<I, S>(mut self, documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.documents = Some(documents.into_iter().map(Into::into).collect());
        self
    }

    pub fn metadatas(mut self, metadatas: Vec<Metadata>) -> Self {
        self.metadatas = Some(metadatas);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetRequest {
    pub ids: Option<Vec<String>>,
    pub where_filter: Option<WhereFilter>,
    pub where_document: Option<DocumentFilter>,
    pub include: Include,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Default for GetRequest {
    fn default() -> Self {
        Self {
            ids: None,
            where_filter: None,
            where_document: None,
            include: Include::get_default(),
            limit: None,
            offset: 0,
        }
    }
}

impl GetRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn where_filter(mut self, filter: WhereFilter) -> Self {
        self.where_filter = Some(filter);
        self
    }

    pub fn where_document(mut self, filter: DocumentFilter) -> Self {
        self.where_document = Some(filter);
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        self.include = include;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteRequest {
    pub ids: Option<Vec<String>>,
    pub where_filter: Option<WhereFilter>,
    pub where_document: Option<DocumentFilter>,
}

impl DeleteRequest {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn matching(filter: WhereFilter) -> Self {
        Self {
            where_filter: Some(filter),
            ..Self::default()
        }
    }

    pub fn where_filter(mut self, filter: WhereFilter) -> Self {
        self.where_filter = Some(filter);
        self
    }

    pub fn where_document(mut self, filter: DocumentFilter) -> Self {
        self.where_document = Some(filter);
        self
    }

    fn has_selector(&self) -> bool {
        self.ids.is_some() || self.where_filter.is_some() || self.where_document.is_some()
    }
}

/// Parallel lists, one entry per returned item. Unrequested fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetResult {
    pub ids: Vec<String>,
    pub embeddings: Option<Vec<Vec<f32>>>,
    pub documents: Option<Vec<Option<String>>>,
    pub metadatas: Option<Vec<Option<Metadata>>>,
}

impl GetResult {
    pub(crate) fn with_include(include: Include) -> Self {
        Self {
            ids: Vec::new(),
            embeddings: include.embeddings.then(Vec::new),
            documents: include.documents.then(Vec::new),
            metadatas: include.metadatas.then(Vec::new),
        }
    }

    pub(crate) fn push(&mut self, item: &ItemRecord) {
        self.ids.push(item.id.clone());
        if let Some(embeddings) = self.embeddings.as_mut() {
            embeddings.push(item.embedding.clone());
        }
        if let Some(documents) = self.documents.as_mut() {
            documents.push(item.document.clone());
        }
        if let Some(metadatas) = self.metadatas.as_mut() {
            metadatas.push(item.metadata.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub trait RecordStore {
    /// Upserts items; an existing id is fully replaced. Returns the ids.
    fn add(&mut self, collection: &str, request: AddRequest) -> Result<Vec<String>>;

    /// Partially updates existing items; unknown ids are skipped silently.
    fn update(&mut self, collection: &str, request: UpdateRequest) -> Result<()>;

    fn get(&self, collection: &str, request: GetRequest) -> Result<GetResult>;

    /// Deletes by ids or by predicate and returns the number removed.
    fn delete(&mut self, collection: &str, request: DeleteRequest) -> Result<usize>;
}

impl RecordStore for Store {
    fn add(&mut self, collection: &str, request: AddRequest) -> Result<Vec<String>> {
        self.table(collection)?;
        let AddRequest {
            ids,
            embeddings,
            documents,
            metadatas,
        } = request;

        validate_ids(&ids)?;
        check_len("embeddings", embeddings.as_ref().map(Vec::len), ids.len())?;
        check_len("documents", documents.as_ref().map(Vec::len), ids.len())?;
        check_len("metadatas", metadatas.as_ref().map(Vec::len), ids.len())?;
        if let Some(metadatas) = metadatas.as_ref() {
            validate_metadatas(metadatas)?;
        }

        if embeddings.is_none() && documents.is_none() {
            return Err(Error::validation("add requires embeddings or documents"));
        }
        if ids.is_empty() {
            return Ok(ids);
        }

        let embeddings = match embeddings {
            Some(embeddings) => embeddings,
            None => self.embed(documents.as_deref().unwrap_or_default())?,
        };
        validate_embeddings(&ids, &embeddings)?;

        let created_at = Utc::now();
        let mut documents = documents.map(Vec::into_iter);
        let mut metadatas = metadatas.map(Vec::into_iter);
        let items: Vec<ItemRecord> = ids
            .iter()
            .zip(embeddings)
            .map(|(id, embedding)| ItemRecord {
                id: id.clone(),
                document: documents.as_mut().and_then(Iterator::next),
                embedding,
                metadata: metadatas.as_mut().and_then(Iterator::next),
                created_at,
            })
            .collect();

        self.commit(vec![WalRecord::UpsertItems {
            collection: collection.to_string(),
            items,
        }])?;
        tracing::debug!(collection, items = ids.len(), "added items");
        Ok(ids)
    }

    fn update(&mut self, collection: &str, request: UpdateRequest) -> Result<()> {
        self.table(collection)?;
        let UpdateRequest {
            ids,
            embeddings,
            documents,
            metadatas,
        } = request;

        validate_ids(&ids)?;
        check_len("embeddings", embeddings.as_ref().map(Vec::len), ids.len())?;
        check_len("documents", documents.as_ref().map(Vec::len), ids.len())?;
        check_len("metadatas", metadatas.as_ref().map(Vec::len), ids.len())?;
        if let Some(metadatas) = metadatas.as_ref() {
            validate_metadatas(metadatas)?;
        }

        let embeddings = match (embeddings, documents.as_ref()) {
            (Some(embeddings), _) => Some(embeddings),
            (None, Some(documents)) if !documents.is_empty() => Some(self.embed(documents)?),
            (None, _) => None,
        };
        if let Some(embeddings) = embeddings.as_ref() {
            validate_embeddings(&ids, embeddings)?;
        }

        let table = self.table(collection)?;
        let mut embeddings = embeddings.map(Vec::into_iter);
        let mut documents = documents.map(Vec::into_iter);
        let mut metadatas = metadatas.map(Vec::into_iter);
        let mut patches = Vec::with_capacity(ids.len());
        for id in ids {
            let patch = ItemPatch {
                embedding: embeddings.as_mut().and_then(Iterator::next),
                document: documents.as_mut().and_then(Iterator::next),
                metadata: metadatas.as_mut().and_then(Iterator::next),
                id,
            };
            if table.contains(&patch.id) && !patch.is_empty() {
                patches.push(patch);
            }
        }
        if patches.is_empty() {
            return Ok(());
        }

        let updated = patches.len();
        self.commit(vec![WalRecord::UpdateItems {
            collection: collection.to_string(),
            patches,
        }])?;
        tracing::debug!(collection, items = updated, "updated items");
        Ok(())
    }

    fn get(&self, collection: &str, request: GetRequest) -> Result<GetResult> {
        let table = self.table(collection)?;
        if let Some(filter) = request.where_filter.as_ref() {
            filter.validate()?;
        }

        let mut result = GetResult::with_include(request.include);
        if request.limit == Some(0) {
            return Ok(result);
        }

        let matching = select(
            table,
            request.ids.as_deref(),
            request.where_filter.as_ref(),
            request.where_document.as_ref(),
        )
        .skip(request.offset)
        .take(request.limit.unwrap_or(usize::MAX));
        for item in matching {
            result.push(item);
        }
        Ok(result)
    }

    fn delete(&mut self, collection: &str, request: DeleteRequest) -> Result<usize> {
        let table = self.table(collection)?;
        if !request.has_selector() {
            return Err(Error::validation(
                "delete requires ids, where or where_document; refusing to delete everything",
            ));
        }

        let doomed: Vec<String> = match request.ids.as_deref() {
            Some(ids) => select(table, Some(ids), None, None)
                .map(|item| item.id.clone())
                .collect(),
            None => {
                if let Some(filter) = request.where_filter.as_ref() {
                    filter.validate()?;
                }
                select(
                    table,
                    None,
                    request.where_filter.as_ref(),
                    request.where_document.as_ref(),
                )
                .map(|item| item.id.clone())
                .collect()
            }
        };
        if doomed.is_empty() {
            return Ok(0);
        }

        let deleted = doomed.len();
        self.commit(vec![WalRecord::DeleteItems {
            collection: collection.to_string(),
            ids: doomed,
        }])?;
        tracing::debug!(collection, items = deleted, "deleted items");
        Ok(deleted)
    }
}

/// Items in storage order, restricted to `ids` when given, then to the
/// predicates.
pub(crate) fn select<'a>(
    table: &'a ItemTable,
    ids: Option<&'a [String]>,
    where_filter: Option<&'a WhereFilter>,
    where_document: Option<&'a DocumentFilter>,
) -> impl Iterator<Item = &'a ItemRecord> + 'a {
    let wanted: Option<HashSet<&'a str>> =
        ids.map(|ids| ids.iter().map(String::as_str).collect());
    table.iter().filter(move |item| {
        wanted
            .as_ref()
            .map_or(true, |wanted| wanted.contains(item.id.as_str()))
            && matches(item, where_filter, where_document)
    })
}

fn validate_ids(ids: &[String]) -> Result<()> {
    if let Some(position) = ids.iter().position(|id| id.is_empty()) {
        return Err(Error::validation(format!(
            "ids[{position}] must be a non-empty string"
        )));
    }
    Ok(())
}

fn check_len(field: &str, len: Option<usize>, expected: usize) -> Result<()> {
    match len {
        Some(len) if len != expected => Err(Error::validation(format!(
            "{field} length ({len}) must match ids length ({expected})"
        ))),
        _ => Ok(()),
    }
}

fn validate_metadatas(metadatas: &[Metadata]) -> Result<()> {
    for (index, metadata) in metadatas.iter().enumerate() {
        if metadata.keys().any(String::is_empty) {
            return Err(Error::validation(format!(
                "metadatas[{index}] contains an empty key"
            )));
        }
    }
    Ok(())
}

/// Insert-time vector checks are argument errors, not search errors.
fn validate_embeddings(ids: &[String], embeddings: &[Vec<f32>]) -> Result<()> {
    for (id, embedding) in ids.iter().zip(embeddings) {
        validate_vector(embedding)
            .map_err(|error| Error::validation(format!("invalid embedding for '{id}': {error}")))?;
    }
    Ok(())
}
