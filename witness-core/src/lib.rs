pub mod config;
pub mod distance;
pub mod document;
pub mod embedder;
pub mod error;
pub mod hnsw;
pub mod matcher;
pub mod similarity;
pub mod store;
pub mod vector;
pub(crate) mod utils;

// Re-export key types/traits for easier use
pub use config::{AnnConfig, MatcherConfig, RetrievalStrategy, DEFAULT_THRESHOLD};
pub use distance::DistanceMetric;
pub use document::{Document, DocumentFilter, DocumentId, FileDocument, IncidentReport, ScoredDocument};
pub use embedder::Embedder;
pub use error::{EmbedError, WitnessError, WitnessResult};
pub use matcher::{MatchOutcome, MatchScope, Matcher, UnavailableReason};
pub use similarity::{similarity, similarity_percentage};
pub use store::{DocumentStore, MemoryDocumentStore, StoreOptions, VectorIndexDefinition, VectorSearchRequest};
pub use vector::{Embedding, ModelTag, StoredEmbedding};
