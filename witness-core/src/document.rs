//! Documents held by the store and the ranked form returned by the matcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::similarity::similarity_percentage;
use crate::utils::preview;
use crate::vector::StoredEmbedding;

/// Identifier assigned by the store on insert.
pub type DocumentId = String;

/// Characters of file content kept on an uploaded document.
pub const CONTENT_PREVIEW_CHARS: usize = 500;

/// A stored record: free-text fields plus an optional embedding.
///
/// A document without an embedding has not been embedded yet. It is kept
/// by the store but never scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<StoredEmbedding>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A new, not yet persisted document. The store assigns the id.
    pub fn new(fields: Map<String, Value>, embedding: Option<StoredEmbedding>) -> Self {
        let now = Utc::now();
        Document {
            id: DocumentId::new(),
            fields,
            embedding,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    /// String value of a field, if present and a string.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// The document without its embedding, for responses.
    pub fn without_embedding(mut self) -> Self {
        self.embedding = None;
        self
    }
}

/// Selection for `DocumentStore::find_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFilter {
    #[default]
    All,
    HasEmbedding,
}

impl DocumentFilter {
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            DocumentFilter::All => true,
            DocumentFilter::HasEmbedding => document.has_embedding(),
        }
    }
}

/// A document ranked against a query. `score` is the raw similarity used
/// for thresholding and ordering; `percentage` is its display form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
    pub percentage: f32,
}

impl ScoredDocument {
    pub fn new(document: Document, score: f32) -> Self {
        ScoredDocument { document, score, percentage: similarity_percentage(score) }
    }
}

fn default_status() -> String {
    "Pending".to_string()
}

/// A user-submitted incident report. `culprit` is the embedded text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub name: String,
    pub location: String,
    pub contact_info: String,
    pub severity: String,
    pub culprit: String,
    pub relationship_to_culprit: String,
    #[serde(default)]
    pub other_info: String,
    #[serde(default = "default_status")]
    pub status: String,
}

impl IncidentReport {
    pub const TEXT_FIELD: &'static str = "culprit";

    /// The report as store fields.
    pub fn into_fields(self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(self.name));
        fields.insert("location".into(), Value::String(self.location));
        fields.insert("contact_info".into(), Value::String(self.contact_info));
        fields.insert("severity".into(), Value::String(self.severity));
        fields.insert("culprit".into(), Value::String(self.culprit));
        fields.insert("relationship_to_culprit".into(), Value::String(self.relationship_to_culprit));
        fields.insert("other_info".into(), Value::String(self.other_info));
        fields.insert("status".into(), Value::String(self.status));
        fields
    }
}

/// An uploaded text file. The whole content is embedded; only a preview is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDocument {
    pub filename: String,
    pub content: String,
}

impl FileDocument {
    pub const TEXT_FIELD: &'static str = "content";

    pub fn into_fields(self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("filename".into(), Value::String(self.filename));
        fields.insert(
            Self::TEXT_FIELD.into(),
            Value::String(preview(&self.content, CONTENT_PREVIEW_CHARS)),
        );
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{Embedding, ModelTag};

    fn report() -> IncidentReport {
        serde_json::from_value(serde_json::json!({
            "name": "Test User",
            "location": "Test City",
            "contact_info": "test@email.com",
            "severity": "Medium",
            "culprit": "A person wearing a black jacket and blue jeans",
            "relationship_to_culprit": "Stranger"
        }))
        .unwrap()
    }

    #[test]
    fn test_report_defaults_and_fields() {
        let report = report();
        assert_eq!(report.status, "Pending");
        assert_eq!(report.other_info, "");

        let doc = Document::new(report.into_fields(), None);
        assert_eq!(doc.text_field("culprit"), Some("A person wearing a black jacket and blue jeans"));
        assert_eq!(doc.text_field("status"), Some("Pending"));
        assert!(!doc.has_embedding());
    }

    #[test]
    fn test_file_document_keeps_preview_only() {
        let content = "x".repeat(CONTENT_PREVIEW_CHARS + 20);
        let fields = FileDocument { filename: "a.txt".into(), content }.into_fields();
        assert_eq!(fields["content"].as_str().unwrap().len(), CONTENT_PREVIEW_CHARS);
        assert_eq!(fields["filename"], "a.txt");
    }

    #[test]
    fn test_filter_matches() {
        let embedded = Document::new(
            Map::new(),
            Some(StoredEmbedding { model: ModelTag::new("m", 2), vector: Embedding::from(vec![0.0, 1.0]) }),
        );
        let bare = Document::new(Map::new(), None);
        assert!(DocumentFilter::HasEmbedding.matches(&embedded));
        assert!(!DocumentFilter::HasEmbedding.matches(&bare));
        assert!(DocumentFilter::All.matches(&bare));
        assert!(!embedded.clone().without_embedding().has_embedding());
    }

    #[test]
    fn test_scored_document_percentage() {
        let scored = ScoredDocument::new(Document::new(Map::new(), None), 0.876543);
        assert_eq!(scored.percentage, 87.65);
        let negative = ScoredDocument::new(Document::new(Map::new(), None), -0.3);
        assert_eq!(negative.percentage, 0.0);
    }
}
