//! Query orchestration: embed → retrieve → score → filter → rank.
//!
//! Search never fails because infrastructure failed. Embedding and store
//! errors are logged and reported as `MatchOutcome::Unavailable`, which
//! callers that only want a list see as no matches. The only error a
//! search returns is an invalid argument.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{
    validate_ann_params, validate_threshold, MatcherConfig, RetrievalStrategy, DEFAULT_NUM_CANDIDATES,
    DEFAULT_NUM_RESULTS,
};
use crate::document::{Document, DocumentFilter, DocumentId, FileDocument, ScoredDocument};
use crate::embedder::{check_output, Embedder};
use crate::error::{EmbedError, WitnessError, WitnessResult};
use crate::similarity::similarity;
use crate::store::{DocumentStore, VectorIndexDefinition, VectorSearchRequest};
use crate::utils::preview;
use crate::vector::{Embedding, ModelTag, StoredEmbedding};

/// Scored candidates between two cancellation checks during ranking.
pub const SCAN_CANCEL_CHECK_INTERVAL: usize = 256;

/// Why a search could not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    EmbeddingFailed,
    StoreUnavailable,
    Timeout,
    Cancelled,
    IndexMismatch,
}

/// Result of a search. `NoMatches` and `Unavailable` are kept apart so an
/// outage is not mistaken for an empty result.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matches(Vec<ScoredDocument>),
    NoMatches,
    Unavailable { reason: UnavailableReason, detail: String },
}

impl MatchOutcome {
    fn from_ranked(ranked: Vec<ScoredDocument>) -> Self {
        if ranked.is_empty() {
            MatchOutcome::NoMatches
        } else {
            MatchOutcome::Matches(ranked)
        }
    }

    fn unavailable(err: WitnessError) -> Self {
        let reason = match &err {
            WitnessError::Embedding(EmbedError::Timeout(_)) | WitnessError::Timeout(_) => UnavailableReason::Timeout,
            WitnessError::Embedding(_) => UnavailableReason::EmbeddingFailed,
            WitnessError::Cancelled => UnavailableReason::Cancelled,
            WitnessError::DimensionMismatch { .. }
            | WitnessError::IndexNotFound(_)
            | WitnessError::InvalidArgument(_)
            | WitnessError::UnsupportedOperation(_) => UnavailableReason::IndexMismatch,
            _ => UnavailableReason::StoreUnavailable,
        };
        MatchOutcome::Unavailable { reason, detail: err.to_string() }
    }

    /// The ranked documents; empty for `NoMatches` and `Unavailable`.
    pub fn into_matches(self) -> Vec<ScoredDocument> {
        match self {
            MatchOutcome::Matches(matches) => matches,
            _ => Vec::new(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, MatchOutcome::Unavailable { .. })
    }
}

/// What a matcher searches: one collection, the field holding the embedded
/// text, and the collection's vector index if it has one.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScope {
    pub collection: String,
    pub text_field: String,
    pub index: Option<VectorIndexDefinition>,
    /// When set, `text_field` keeps only this many characters of the
    /// embedded text.
    pub preview_chars: Option<usize>,
}

impl MatchScope {
    pub fn new(collection: impl Into<String>, text_field: impl Into<String>) -> Self {
        MatchScope { collection: collection.into(), text_field: text_field.into(), index: None, preview_chars: None }
    }

    pub fn with_index(mut self, index: VectorIndexDefinition) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_preview(mut self, max_chars: usize) -> Self {
        self.preview_chars = Some(max_chars);
        self
    }

    fn stored_text(&self, text: &str) -> String {
        match self.preview_chars {
            Some(max_chars) => preview(text, max_chars),
            None => text.to_string(),
        }
    }
}

// Resolved retrieval path for one query.
enum Plan<'a> {
    Scan { limit: Option<usize> },
    Ann { index: &'a VectorIndexDefinition, num_results: usize, num_candidates: usize },
}

#[derive(Debug, Clone)]
pub struct Matcher {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn DocumentStore>,
    scope: Arc<MatchScope>,
    config: MatcherConfig,
}

impl Matcher {
    /// Builds a matcher, failing fast on configuration that could only
    /// produce mismatched queries later.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn DocumentStore>,
        scope: MatchScope,
        config: MatcherConfig,
    ) -> WitnessResult<Self> {
        config.validate()?;
        let tag = embedder.model_tag();
        if let Some(index) = &scope.index {
            if index.collection != scope.collection {
                return Err(WitnessError::Configuration(format!(
                    "Index '{}' belongs to collection '{}', not '{}'",
                    index.name, index.collection, scope.collection
                )));
            }
            if index.dimensions != tag.dimensions {
                return Err(WitnessError::Configuration(format!(
                    "Index '{}' expects {} dimensions but model {} produces {}",
                    index.name, index.dimensions, tag.model, tag.dimensions
                )));
            }
            if let Some(model) = index.model.as_ref().filter(|m| *m != tag) {
                return Err(WitnessError::Configuration(format!(
                    "Index '{}' holds {} embeddings but the embedder is {}",
                    index.name, model, tag
                )));
            }
        }
        if let RetrievalStrategy::Ann { .. } = config.strategy {
            if scope.index.is_none() || !store.supports_vector_search() {
                return Err(WitnessError::Configuration(format!(
                    "ANN retrieval requested for '{}' but no vector index is available",
                    scope.collection
                )));
            }
        }
        info!(collection = %scope.collection, model = %tag, strategy = ?config.strategy, "Matcher ready");
        Ok(Matcher { embedder, store, scope: Arc::new(scope), config })
    }

    pub fn scope(&self) -> &MatchScope {
        &self.scope
    }

    pub fn model_tag(&self) -> &ModelTag {
        self.embedder.model_tag()
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Documents whose text is close to `query_text`, best first, with the
    /// configured retrieval strategy.
    pub async fn find_similar(&self, query_text: &str, threshold: f32) -> WitnessResult<MatchOutcome> {
        self.find_similar_with_cancel(query_text, threshold, &CancellationToken::new()).await
    }

    pub async fn find_similar_with_cancel(
        &self,
        query_text: &str,
        threshold: f32,
        cancel: &CancellationToken,
    ) -> WitnessResult<MatchOutcome> {
        self.find_similar_using(query_text, threshold, self.config.strategy, cancel).await
    }

    /// `find_similar` with an explicit strategy for this one query.
    pub async fn find_similar_using(
        &self,
        query_text: &str,
        threshold: f32,
        strategy: RetrievalStrategy,
        cancel: &CancellationToken,
    ) -> WitnessResult<MatchOutcome> {
        validate_threshold(threshold)?;
        if let RetrievalStrategy::Ann { num_results, num_candidates } = strategy {
            validate_ann_params(num_results, num_candidates)?;
        }
        let plan = self.plan(strategy);
        Ok(self.run(query_text, Some(threshold), plan, cancel).await)
    }

    /// The `num_results` nearest documents by the ANN index, unfiltered.
    /// Falls back to a capped full scan when no index is available.
    pub async fn find_top_matches(
        &self,
        query_text: &str,
        num_results: usize,
        num_candidates: usize,
    ) -> WitnessResult<MatchOutcome> {
        validate_ann_params(num_results, num_candidates)?;
        let plan = match self.available_index() {
            Some(index) => Plan::Ann { index, num_results, num_candidates },
            None => Plan::Scan { limit: Some(num_results) },
        };
        Ok(self.run(query_text, None, plan, &CancellationToken::new()).await)
    }

    fn available_index(&self) -> Option<&VectorIndexDefinition> {
        self.scope.index.as_ref().filter(|_| self.store.supports_vector_search())
    }

    fn plan(&self, strategy: RetrievalStrategy) -> Plan<'_> {
        match (strategy, self.available_index()) {
            (RetrievalStrategy::Ann { num_results, num_candidates }, Some(index)) => {
                Plan::Ann { index, num_results, num_candidates }
            }
            (RetrievalStrategy::Auto, Some(index)) => Plan::Ann {
                index,
                num_results: DEFAULT_NUM_RESULTS,
                num_candidates: DEFAULT_NUM_CANDIDATES,
            },
            (RetrievalStrategy::Ann { num_results, .. }, None) => {
                warn!(collection = %self.scope.collection, "No vector index available, falling back to full scan");
                Plan::Scan { limit: Some(num_results) }
            }
            _ => Plan::Scan { limit: self.config.scan_limit },
        }
    }

    async fn run(
        &self,
        query_text: &str,
        threshold: Option<f32>,
        plan: Plan<'_>,
        cancel: &CancellationToken,
    ) -> MatchOutcome {
        let query = match self.embed_with_limits(query_text, cancel).await {
            Ok(query) => query,
            Err(err) => {
                warn!(collection = %self.scope.collection, error = %err, "Query embedding failed, reporting no matches");
                return MatchOutcome::unavailable(err);
            }
        };

        let (candidates, cap) = match &plan {
            Plan::Scan { limit } => {
                let fetched = self
                    .store_call(self.store.find_all(&self.scope.collection, DocumentFilter::HasEmbedding), cancel)
                    .await;
                (fetched, *limit)
            }
            Plan::Ann { index, num_results, num_candidates } => {
                let request = VectorSearchRequest::new(index, query.clone()).with_limits(*num_results, *num_candidates);
                let fetched = self.store_call(self.store.vector_search(&self.scope.collection, request), cancel).await;
                (fetched, Some(*num_results))
            }
        };
        let candidates = match candidates {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(collection = %self.scope.collection, error = %err, "Candidate retrieval failed, reporting no matches");
                return MatchOutcome::unavailable(err);
            }
        };

        let mut ranked = match self.rank(candidates, &query, threshold, cancel) {
            Ok(ranked) => ranked,
            Err(err) => return MatchOutcome::unavailable(err),
        };
        if let Some(cap) = cap {
            ranked.truncate(cap);
        }
        debug!(collection = %self.scope.collection, matches = ranked.len(), "Search completed");
        MatchOutcome::from_ranked(ranked)
    }

    /// Scores candidates, drops those below `threshold`, and sorts best
    /// first. The sort is stable, so equal scores keep retrieval order.
    fn rank(
        &self,
        candidates: Vec<Document>,
        query: &Embedding,
        threshold: Option<f32>,
        cancel: &CancellationToken,
    ) -> WitnessResult<Vec<ScoredDocument>> {
        let tag = self.embedder.model_tag();
        let mut scored = Vec::new();

        for (position, document) in candidates.into_iter().enumerate() {
            if position % SCAN_CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(WitnessError::Cancelled);
            }
            let Some(stored) = document.embedding.as_ref() else {
                continue;
            };
            if stored.model != *tag {
                debug!(document_id = %document.id, stored = %stored.model, query = %tag, "Skipping embedding from another model");
                continue;
            }
            let score = match similarity(query, &stored.vector) {
                Ok(score) => score,
                Err(err) => {
                    warn!(document_id = %document.id, error = %err, "Skipping candidate that cannot be scored");
                    continue;
                }
            };
            if threshold.map_or(true, |t| score >= t) {
                scored.push(ScoredDocument::new(document, score));
            }
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        Ok(scored)
    }

    /// Embeds `text` and inserts `fields` with the embedding in one store call.
    ///
    /// When embedding fails nothing is stored and the error is returned,
    /// unless `store_unembedded` is set, in which case the document is kept
    /// without an embedding and stays invisible to search.
    pub async fn embed_and_store(&self, text: &str, fields: Map<String, Value>) -> WitnessResult<DocumentId> {
        let cancel = CancellationToken::new();
        let embedding = match self.embed_with_limits(text, &cancel).await {
            Ok(vector) => Some(StoredEmbedding { model: self.model_tag().clone(), vector }),
            Err(WitnessError::Embedding(err)) if self.config.store_unembedded => {
                warn!(collection = %self.scope.collection, error = %err, "Embedding failed, storing document without embedding");
                None
            }
            Err(err) => return Err(err),
        };

        let embedded = embedding.is_some();
        let id = self
            .store_call(self.store.insert_one(&self.scope.collection, Document::new(fields, embedding)), &cancel)
            .await?;
        info!(collection = %self.scope.collection, document_id = %id, embedded, "Stored document");
        Ok(id)
    }

    /// `embed_and_store` for many items, at most `ingest_concurrency` in
    /// flight. Results are in input order.
    pub async fn embed_and_store_many(
        &self,
        items: Vec<(String, Map<String, Value>)>,
    ) -> Vec<WitnessResult<DocumentId>> {
        stream::iter(items)
            .map(|(text, fields)| async move { self.embed_and_store(&text, fields).await })
            .buffered(self.config.ingest_concurrency)
            .collect()
            .await
    }

    /// Embeds each file's full content and stores it with a content preview.
    /// Returns one outcome per file, in input order.
    pub async fn ingest_files(&self, files: Vec<FileDocument>) -> Vec<(String, WitnessResult<DocumentId>)> {
        let names: Vec<String> = files.iter().map(|f| f.filename.clone()).collect();
        let items = files
            .into_iter()
            .map(|file| (file.content.clone(), file.into_fields()))
            .collect();
        names.into_iter().zip(self.embed_and_store_many(items).await).collect()
    }

    /// Replaces the text of an existing document and re-embeds it. The full
    /// text is embedded; the stored field follows the scope's preview limit.
    /// The old text and embedding stay in place if embedding fails.
    pub async fn update_text(&self, id: &str, text: &str) -> WitnessResult<Document> {
        let cancel = CancellationToken::new();
        let mut document = self
            .store_call(self.store.get(&self.scope.collection, id), &cancel)
            .await?
            .ok_or_else(|| WitnessError::NotFound(id.to_string()))?;

        let vector = self.embed_with_limits(text, &cancel).await?;
        document.fields.insert(self.scope.text_field.clone(), Value::String(self.scope.stored_text(text)));
        document.embedding = Some(StoredEmbedding { model: self.model_tag().clone(), vector });

        self.store_call(self.store.replace_one(&self.scope.collection, document), &cancel).await?;
        info!(collection = %self.scope.collection, document_id = %id, "Re-embedded edited document");
        self.store_call(self.store.get(&self.scope.collection, id), &cancel)
            .await?
            .ok_or_else(|| WitnessError::NotFound(id.to_string()))
    }

    async fn embed_with_limits(&self, text: &str, cancel: &CancellationToken) -> WitnessResult<Embedding> {
        let timeout = self.config.embed_timeout;
        let embedding = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WitnessError::Cancelled),
            result = tokio::time::timeout(timeout, self.embedder.embed(text)) => match result {
                Ok(embedded) => embedded?,
                Err(_) => return Err(EmbedError::Timeout(timeout).into()),
            },
        };
        check_output(self.embedder.model_tag(), &embedding)?;
        Ok(embedding)
    }

    async fn store_call<T, F>(&self, call: F, cancel: &CancellationToken) -> WitnessResult<T>
    where
        F: Future<Output = WitnessResult<T>>,
    {
        let timeout = self.config.store_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WitnessError::Cancelled),
            result = tokio::time::timeout(timeout, call) => result
                .unwrap_or_else(|_| Err(WitnessError::Timeout(format!("store call exceeded {:?}", timeout)))),
        }
    }
}
