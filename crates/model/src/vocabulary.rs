use async_trait::async_trait;
use qhse_common::text::tokenize;
use qhse_common::{QhseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::traits::Embedder;

/// Token to index mapping built from the corpus questions
///
/// Indices start at 1; slot 0 of an embedding collects out-of-vocabulary
/// tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenVocabulary {
    token_to_index: BTreeMap<String, usize>,
}

impl TokenVocabulary {
    /// Build a vocabulary; the first occurrence of a token fixes its index
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut token_to_index = BTreeMap::new();
        let mut next = 1;

        for text in texts {
            for token in tokenize(text) {
                token_to_index.entry(token).or_insert_with(|| {
                    let index = next;
                    next += 1;
                    index
                });
            }
        }

        Self { token_to_index }
    }

    /// Load vocabulary from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            QhseError::file_system(format!("Failed to read vocabulary {}: {}", path.display(), e))
        })?;
        let vocabulary: Self = serde_json::from_str(&data)?;
        vocabulary.validate()?;
        Ok(vocabulary)
    }

    /// Save vocabulary as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Vocabulary saved: {} tokens -> {}", self.len(), path.display());
        Ok(())
    }

    /// Index for a token, if known
    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.token_to_index.get(token).copied()
    }

    /// Number of known tokens
    pub fn len(&self) -> usize {
        self.token_to_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_index.is_empty()
    }

    /// Indices must be unique and within 1..=len
    fn validate(&self) -> Result<()> {
        let mut seen = vec![false; self.len() + 1];
        for (token, &index) in &self.token_to_index {
            if index == 0 || index > self.len() || seen[index] {
                return Err(QhseError::corpus(format!(
                    "Vocabulary index {} for token '{}' is out of range or duplicated",
                    index, token
                )));
            }
            seen[index] = true;
        }
        Ok(())
    }
}

/// Offline embedder: L2-normalized token counts over a fixed vocabulary
#[derive(Debug, Clone)]
pub struct VocabularyEmbedder {
    vocabulary: TokenVocabulary,
    name: String,
}

impl VocabularyEmbedder {
    pub fn new(vocabulary: TokenVocabulary) -> Self {
        let name = format!("vocabulary-bow-{}", vocabulary.len());
        Self { vocabulary, name }
    }

    /// Embedding dimension (vocabulary size plus the out-of-vocabulary slot)
    pub fn dimension(&self) -> usize {
        self.vocabulary.len() + 1
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension()];
        for token in tokenize(text) {
            let slot = self.vocabulary.index_of(&token).unwrap_or(0);
            vector[slot] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for VocabularyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode(text))
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    async fn test_connection(&self) -> Result<bool> {
        Ok(!self.vocabulary.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TokenVocabulary {
        TokenVocabulary::build(["What is QHSE?", "What is a near miss?"])
    }

    #[test]
    fn test_build_assigns_first_occurrence_indices() {
        let vocab = sample();
        assert_eq!(vocab.index_of("what"), Some(1));
        assert_eq!(vocab.index_of("is"), Some(2));
        assert_eq!(vocab.index_of("qhse"), Some(3));
        assert_eq!(vocab.index_of("a"), Some(4));
        assert_eq!(vocab.index_of("miss"), Some(6));
        assert_eq!(vocab.len(), 6);
        assert_eq!(vocab.index_of("audit"), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab").join("token_to_index.json");
        let vocab = sample();
        vocab.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["qhse"], 3);
        assert_eq!(TokenVocabulary::load(&path).unwrap(), vocab);
    }

    #[test]
    fn test_load_rejects_duplicate_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"audit": 1, "risk": 1}"#).unwrap();
        assert!(TokenVocabulary::load(&path).is_err());
    }

    #[tokio::test]
    async fn test_embedding_is_normalized() {
        let embedder = VocabularyEmbedder::new(sample());
        let vector = embedder.embed("what is qhse").await.unwrap();
        assert_eq!(vector.len(), embedder.dimension());
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(vector[0], 0.0);
    }

    #[tokio::test]
    async fn test_unknown_tokens_use_slot_zero() {
        let embedder = VocabularyEmbedder::new(sample());
        let vector = embedder.embed("asdkjasbd").await.unwrap();
        assert_eq!(vector[0], 1.0);
        assert!(vector[1..].iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = VocabularyEmbedder::new(sample());
        let vector = embedder.embed("").await.unwrap();
        assert!(vector.iter().all(|v| *v == 0.0));
    }
}
