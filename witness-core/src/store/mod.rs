//! Document store adapter.
//!
//! The matcher sees the store only through `DocumentStore`: insert, scan
//! with a filter and, when the backend has one, a native vector-index
//! query. `MemoryDocumentStore` is the in-process backend.

pub mod memory;

pub use memory::{MemoryDocumentStore, StoreOptions, CollectionStats};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::config::{AnnConfig, DEFAULT_NUM_CANDIDATES, DEFAULT_NUM_RESULTS};
use crate::distance::DistanceMetric;
use crate::document::{Document, DocumentFilter, DocumentId};
use crate::error::{WitnessError, WitnessResult};
use crate::vector::{Embedding, ModelTag};

#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Inserts a document (with its embedding, if any) in one step and
    /// returns its id. An empty `document.id` gets a fresh id.
    async fn insert_one(&self, collection: &str, document: Document) -> WitnessResult<DocumentId>;

    /// Every matching document, in insertion order. Unknown collections are empty.
    async fn find_all(&self, collection: &str, filter: DocumentFilter) -> WitnessResult<Vec<Document>>;

    async fn get(&self, collection: &str, id: &str) -> WitnessResult<Option<Document>>;

    /// Replaces an existing document wholesale, keeping its position and creation time.
    async fn replace_one(&self, collection: &str, document: Document) -> WitnessResult<()>;

    async fn delete_one(&self, collection: &str, id: &str) -> WitnessResult<bool>;

    async fn collections(&self) -> WitnessResult<Vec<String>>;

    /// Whether `vector_search` is backed by a native index.
    fn supports_vector_search(&self) -> bool {
        false
    }

    /// Approximate nearest neighbours of `request.query_vector`, in the
    /// index's own order. Callers re-rank with their own score.
    async fn vector_search(
        &self,
        _collection: &str,
        _request: VectorSearchRequest,
    ) -> WitnessResult<Vec<Document>> {
        Err(WitnessError::UnsupportedOperation("vector search".to_string()))
    }
}

/// A native vector index declared on a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexDefinition {
    pub collection: String,
    pub name: String,
    /// Field path the index covers.
    pub path: String,
    pub dimensions: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub ann: AnnConfig,
    /// When set, only embeddings from this model are indexed.
    #[serde(default)]
    pub model: Option<ModelTag>,
}

impl VectorIndexDefinition {
    pub fn new(collection: impl Into<String>, name: impl Into<String>, path: impl Into<String>, dimensions: usize) -> Self {
        VectorIndexDefinition {
            collection: collection.into(),
            name: name.into(),
            path: path.into(),
            dimensions,
            metric: DistanceMetric::Euclidean,
            ann: AnnConfig::default(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: ModelTag) -> Self {
        self.model = Some(model);
        self
    }

    pub fn validate(&self) -> WitnessResult<()> {
        if self.name.is_empty() || self.path.is_empty() || self.collection.is_empty() {
            return Err(WitnessError::Configuration("Vector index needs a collection, name and path".to_string()));
        }
        if self.dimensions == 0 {
            return Err(WitnessError::Configuration("Vector index dimensions must be greater than 0".to_string()));
        }
        if let Some(model) = &self.model {
            if model.dimensions != self.dimensions {
                return Err(WitnessError::Configuration(format!(
                    "Vector index '{}' has {} dimensions but model {} has {}",
                    self.name, self.dimensions, model, model.dimensions
                )));
            }
        }
        self.ann.validate()
    }
}

/// Parameters of a native ANN query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchRequest {
    pub query_vector: Embedding,
    pub path: String,
    pub index_name: String,
    /// Final result cap.
    pub num_results: usize,
    /// Search breadth; larger is slower and more accurate.
    pub num_candidates: usize,
    /// Must equal both the query length and the index dimension.
    pub num_dimensions: usize,
    pub metric: DistanceMetric,
}

impl VectorSearchRequest {
    /// A Euclidean query with default breadth and cap for the given index.
    pub fn new(index: &VectorIndexDefinition, query_vector: Embedding) -> Self {
        VectorSearchRequest {
            query_vector,
            path: index.path.clone(),
            index_name: index.name.clone(),
            num_results: DEFAULT_NUM_RESULTS,
            num_candidates: DEFAULT_NUM_CANDIDATES,
            num_dimensions: index.dimensions,
            metric: DistanceMetric::Euclidean,
        }
    }

    pub fn with_limits(mut self, num_results: usize, num_candidates: usize) -> Self {
        self.num_results = num_results;
        self.num_candidates = num_candidates;
        self
    }
}
