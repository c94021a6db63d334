use std::sync::Arc;
use witness_core::document::CONTENT_PREVIEW_CHARS;
use witness_core::{
    Embedder, FileDocument, IncidentReport, MatchScope, Matcher, MemoryDocumentStore, ModelTag, RetrievalStrategy,
    VectorIndexDefinition, WitnessError, WitnessResult,
};

use crate::config::ServerConfig;

/// Collection holding incident reports.
pub const REPORTS_COLLECTION: &str = "complaints";
/// Collection holding uploaded files.
pub const DOCUMENTS_COLLECTION: &str = "documents";
/// Field path declared on the reports vector index.
pub const REPORTS_INDEX_PATH: &str = "culprit_embedding";

/// Holds the shared state accessible by all request handlers.
///
/// The store is opened once at start-up and closed by the shutdown hook.
/// Each matcher is bound to one collection; all of them share the store
/// and the embedder.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<MemoryDocumentStore>,
    pub reports: Matcher,
    pub documents: Matcher,
}

impl AppState {
    /// Builds the state around an already opened store.
    pub fn with_store(
        config: ServerConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<MemoryDocumentStore>,
    ) -> WitnessResult<Self> {
        let reports_scope = MatchScope::new(REPORTS_COLLECTION, IncidentReport::TEXT_FIELD).with_index(
            store
                .index_definition(REPORTS_COLLECTION)
                .ok_or_else(|| WitnessError::Configuration(format!("No vector index on '{}'", REPORTS_COLLECTION)))?,
        );
        let reports = Matcher::new(embedder.clone(), store.clone(), reports_scope, config.matcher_config())?;

        // Uploads have no vector index; ANN requests fall back to a scan.
        let mut documents_config = config.matcher_config();
        if matches!(documents_config.strategy, RetrievalStrategy::Ann { .. }) {
            documents_config.strategy = RetrievalStrategy::Auto;
        }
        let documents = Matcher::new(
            embedder,
            store.clone(),
            MatchScope::new(DOCUMENTS_COLLECTION, FileDocument::TEXT_FIELD).with_preview(CONTENT_PREVIEW_CHARS),
            documents_config,
        )?;

        Ok(AppState { config: Arc::new(config), store, reports, documents })
    }

    /// The matcher bound to `collection`, if the server searches it.
    pub fn matcher_for(&self, collection: &str) -> Option<&Matcher> {
        match collection {
            REPORTS_COLLECTION => Some(&self.reports),
            DOCUMENTS_COLLECTION => Some(&self.documents),
            _ => None,
        }
    }
}

/// The vector index declared on the reports collection. It only holds
/// embeddings from the configured model.
pub fn reports_index(config: &ServerConfig) -> VectorIndexDefinition {
    VectorIndexDefinition::new(
        REPORTS_COLLECTION,
        config.index_name.clone(),
        REPORTS_INDEX_PATH,
        config.embedding_dimensions,
    )
    .with_model(ModelTag::new(config.embedding_model.clone(), config.embedding_dimensions))
}
