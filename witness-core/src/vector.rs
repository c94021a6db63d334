use ndarray::Array1;
use serde::{Serialize, Deserialize};

/// Dense embedding vector.
///
/// Wraps `ndarray::Array1<f32>` for the distance math but serializes as a
/// plain number array, which is the one representation both the full-scan
/// path and the ANN index read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(pub Array1<f32>);

impl std::ops::Deref for Embedding {
    type Target = Array1<f32>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(vec: Vec<f32>) -> Self {
        Embedding(Array1::from(vec))
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0.to_vec()
    }
}

impl Embedding {
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// True when every component is finite. NaN or infinite components make
    /// distances meaningless, so embedders reject such responses.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

/// Identifies the coordinate space an embedding lives in. Vectors with
/// different tags are never compared.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelTag {
    pub model: String,
    pub dimensions: usize,
}

impl ModelTag {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        ModelTag { model: model.into(), dimensions }
    }
}

impl std::fmt::Display for ModelTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}d", self.model, self.dimensions)
    }
}

/// An embedding as persisted on a document, tagged with its model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub model: ModelTag,
    pub vector: Embedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_serializes_as_plain_array() {
        let emb = Embedding::from(vec![1.0, 0.5, -2.0]);
        let json = serde_json::to_string(&emb).unwrap();
        assert_eq!(json, "[1.0,0.5,-2.0]");

        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, emb);
        assert_eq!(back.dimensions(), 3);
    }

    #[test]
    fn test_is_finite() {
        assert!(Embedding::from(vec![0.0, 1.0]).is_finite());
        assert!(!Embedding::from(vec![f32::NAN, 1.0]).is_finite());
        assert!(!Embedding::from(vec![f32::INFINITY]).is_finite());
    }

    #[test]
    fn test_model_tag_display() {
        let tag = ModelTag::new("text-embedding-004", 768);
        assert_eq!(tag.to_string(), "text-embedding-004@768d");
    }
}
