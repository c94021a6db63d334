//! Text-to-vector contract.
//!
//! Implementations call out to an embedding model (the remote client lives
//! in witness-server). They report which model they speak for so stored
//! vectors can be tagged and never compared across coordinate spaces.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::EmbedError;
use crate::vector::{Embedding, ModelTag};

#[async_trait]
pub trait Embedder: Send + Sync + Debug {
    /// Embeds one text. Empty input and every transport or decoding failure
    /// come back as a typed `EmbedError`.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError>;

    /// Model and output dimension of the vectors this embedder produces.
    fn model_tag(&self) -> &ModelTag;
}

/// Rejects blank text before any network call.
pub fn ensure_non_empty(text: &str) -> Result<&str, EmbedError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(EmbedError::EmptyInput)
    } else {
        Ok(trimmed)
    }
}

/// Checks an embedder's output against its declared tag.
pub fn check_output(tag: &ModelTag, embedding: &Embedding) -> Result<(), EmbedError> {
    if embedding.dimensions() != tag.dimensions {
        return Err(EmbedError::Malformed(format!(
            "model {} returned {} values, expected {}",
            tag.model,
            embedding.dimensions(),
            tag.dimensions
        )));
    }
    if !embedding.is_finite() {
        return Err(EmbedError::Malformed(format!("model {} returned non-finite values", tag.model)));
    }
    Ok(())
}
