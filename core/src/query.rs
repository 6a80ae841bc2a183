//! Exact nearest-neighbour search: filter, score with cosine distance, keep
//! the best `n_results` per query.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::collection::{ItemRecord, Metadata};
use crate::error::{Error, Result};
use crate::filter::{DocumentFilter, WhereFilter};
use crate::records::{select, Include};
use crate::store::Store;
use crate::vector::{validate_vector, PreparedCosineQuery};

pub const DEFAULT_N_RESULTS: usize = 10;

const PARALLEL_MIN_QUERIES: usize = 2;
const PARALLEL_MIN_WORK: usize = 2_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query_embeddings: Option<Vec<Vec<f32>>>,
    pub query_texts: Option<Vec<String>>,
    pub n_results: usize,
    pub where_filter: Option<WhereFilter>,
    pub where_document: Option<DocumentFilter>,
    pub include: Include,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            query_embeddings: None,
            query_texts: None,
            n_results: DEFAULT_N_RESULTS,
            where_filter: None,
            where_document: None,
            include: Include::query_default(),
        }
    }
}

impl QueryRequest {
    pub fn embeddings(query_embeddings: Vec<Vec<f32>>) -> Self {
        Self {
            query_embeddings: Some(query_embeddings),
            ..Self::default()
        }
    }

    pub fn texts<I, S>(query_texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            query_texts: Some(query_texts.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn n_results(mut self, n_results: usize) -> Self {
        self.n_results = n_results;
        self
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

    /// Number of query vectors or texts supplied.
    pub fn query_count(&self) -> usize {
        self.query_embeddings
            .as_ref()
            .map(Vec::len)
            .or_else(|| self.query_texts.as_ref().map(Vec::len))
            .unwrap_or(0)
    }
}

/// One outer entry per query vector, in query order; inner lists are ranked
/// nearest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    pub embeddings: Option<Vec<Vec<Vec<f32>>>>,
    pub documents: Option<Vec<Vec<Option<String>>>>,
    pub metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    pub distances: Option<Vec<Vec<f32>>>,
}

impl QueryResult {
    fn with_include(include: Include, queries: usize) -> Self {
        Self {
            ids: Vec::with_capacity(queries),
            embeddings: include.embeddings.then(|| Vec::with_capacity(queries)),
            documents: include.documents.then(|| Vec::with_capacity(queries)),
            metadatas: include.metadatas.then(|| Vec::with_capacity(queries)),
            distances: include.distances.then(|| Vec::with_capacity(queries)),
        }
    }

    fn push_ranked(&mut self, candidates: &[&ItemRecord], ranked: &[Neighbor]) {
        let items: Vec<&ItemRecord> = ranked
            .iter()
            .map(|neighbor| candidates[neighbor.ordinal])
            .collect();

        self.ids.push(items.iter().map(|item| item.id.clone()).collect());
        if let Some(embeddings) = self.embeddings.as_mut() {
            embeddings.push(items.iter().map(|item| item.embedding.clone()).collect());
        }
        if let Some(documents) = self.documents.as_mut() {
            documents.push(items.iter().map(|item| item.document.clone()).collect());
        }
        if let Some(metadatas) = self.metadatas.as_mut() {
            metadatas.push(items.iter().map(|item| item.metadata.clone()).collect());
        }
        if let Some(distances) = self.distances.as_mut() {
            distances.push(ranked.iter().map(|neighbor| neighbor.distance).collect());
        }
    }

    /// Total hits across all queries.
    pub fn returned_count(&self) -> usize {
        self.ids.iter().map(Vec::len).sum()
    }
}

pub trait QueryEngine {
    fn query(&self, collection: &str, request: QueryRequest) -> Result<QueryResult>;
}

impl QueryEngine for Store {
    fn query(&self, collection: &str, request: QueryRequest) -> Result<QueryResult> {
        let table = self.table(collection)?;
        if let Some(filter) = request.where_filter.as_ref() {
            filter.validate()?;
        }

        let queries = match (request.query_embeddings, request.query_texts) {
            (Some(embeddings), None) => embeddings,
            (None, Some(texts)) if texts.is_empty() => Vec::new(),
            (None, Some(texts)) => self.embed(&texts)?,
            (Some(_), Some(_)) => {
                return Err(Error::validation(
                    "query accepts query_embeddings or query_texts, not both",
                ))
            }
            (None, None) => {
                return Err(Error::validation(
                    "query requires query_embeddings or query_texts",
                ))
            }
        };
        for (index, query) in queries.iter().enumerate() {
            validate_vector(query).map_err(|error| {
                Error::validation(format!("invalid query embedding at index {index}: {error}"))
            })?;
        }

        let candidates: Vec<&ItemRecord> = select(
            table,
            None,
            request.where_filter.as_ref(),
            request.where_document.as_ref(),
        )
        .collect();
        let ranked = rank_queries(&queries, &candidates, request.n_results)?;

        let mut result = QueryResult::with_include(request.include, queries.len());
        for neighbors in &ranked {
            result.push_ranked(&candidates, neighbors);
        }
        tracing::debug!(
            collection,
            queries = queries.len(),
            candidates = candidates.len(),
            returned = result.returned_count(),
            "ranked query batch"
        );
        Ok(result)
    }
}

/// A scored candidate; `ordinal` is its position in scan order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Neighbor {
    pub(crate) ordinal: usize,
    pub(crate) distance: f32,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.ordinal.cmp(&other.ordinal))
    }
}

/// Ranks every query independently. Output order equals query order.
pub(crate) fn rank_queries(
    queries: &[Vec<f32>],
    candidates: &[&ItemRecord],
    keep: usize,
) -> Result<Vec<Vec<Neighbor>>> {
    let dimension = queries.first().map_or(0, Vec::len);
    if should_rank_in_parallel(candidates.len(), dimension, queries.len()) {
        return queries
            .par_iter()
            .map(|query| rank_one(query, candidates, keep))
            .collect();
    }
    queries
        .iter()
        .map(|query| rank_one(query, candidates, keep))
        .collect()
}

/// Keeps the `keep` nearest candidates, ties resolved by scan order, so the
/// result equals a stable ascending sort truncated to `keep`.
pub(crate) fn rank_one(
    query: &[f32],
    candidates: &[&ItemRecord],
    keep: usize,
) -> Result<Vec<Neighbor>> {
    if keep == 0 {
        return Ok(Vec::new());
    }

    let prepared = PreparedCosineQuery::new(query);
    let mut heap = BinaryHeap::with_capacity(keep.min(candidates.len()));
    for (ordinal, item) in candidates.iter().enumerate() {
        let distance = prepared
            .distance(&item.embedding)
            .map_err(Error::VectorSearch)?;
        push_bounded(&mut heap, keep, Neighbor { ordinal, distance });
    }

    Ok(heap.into_sorted_vec())
}

fn push_bounded(heap: &mut BinaryHeap<Neighbor>, keep: usize, candidate: Neighbor) {
    if heap.len() < keep {
        heap.push(candidate);
        return;
    }

    let should_replace = heap.peek().is_some_and(|worst| candidate < *worst);
    if should_replace {
        let _ = heap.pop();
        heap.push(candidate);
    }
}

fn should_rank_in_parallel(candidates: usize, dimension: usize, query_count: usize) -> bool {
    if query_count < PARALLEL_MIN_QUERIES {
        return false;
    }
    candidates
        .saturating_mul(dimension)
        .saturating_mul(query_count)
        >= PARALLEL_MIN_WORK
}
