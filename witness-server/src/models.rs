//! Defines the data structures used for API request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use witness_core::store::CollectionStats;
use witness_core::{Document, DocumentId, FileDocument, ScoredDocument};

// --- Request Bodies ---

/// Query string of `GET /reports/similar` and `GET /documents/similar`.
#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub query: String,
    pub threshold: Option<f32>,
    pub limit: Option<usize>,
}

/// Query string of `GET /find-match`.
#[derive(Debug, Deserialize)]
pub struct FindMatchQuery {
    pub info: String,
    pub collection: Option<String>,
    pub num_results: Option<usize>,
    pub num_candidates: Option<usize>,
}

/// Request body for a batch file upload.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub files: Vec<FileDocument>,
}

/// Request body for editing a report's culprit description.
#[derive(Debug, Deserialize)]
pub struct UpdateCulpritRequest {
    pub culprit: String,
}

// --- Response Bodies ---

/// A stored document as returned over HTTP. Embeddings are never sent.
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: DocumentId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub embedded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(document: Document) -> Self {
        let embedded = document.has_embedding();
        let document = document.without_embedding();
        DocumentResponse {
            id: document.id,
            fields: document.fields,
            embedded,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

/// One ranked match.
#[derive(Debug, Serialize)]
pub struct MatchItem {
    pub document: DocumentResponse,
    pub score: f32,
    pub similarity_percentage: f32,
}

impl From<ScoredDocument> for MatchItem {
    fn from(scored: ScoredDocument) -> Self {
        MatchItem {
            document: scored.document.into(),
            score: scored.score,
            similarity_percentage: scored.percentage,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MatchesResponse {
    pub matches: Vec<MatchItem>,
}

impl From<Vec<ScoredDocument>> for MatchesResponse {
    fn from(matches: Vec<ScoredDocument>) -> Self {
        MatchesResponse { matches: matches.into_iter().map(MatchItem::from).collect() }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: DocumentId,
    pub message: String,
}

/// Outcome for one uploaded file.
#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub stored: usize,
    pub failed: usize,
    pub results: Vec<UploadResult>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store_open: bool,
    pub model: String,
    pub dimensions: usize,
    pub collections: BTreeMap<String, CollectionStats>,
}

// --- Generic Responses ---

/// Generic success response (e.g., for deletion).
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}
