use chrono::{DateTime, Utc};
use qhse_common::{QhseError, Result};
use qhse_model::Embedder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

use crate::corpus::QaPair;

/// SHA-256 over the corpus questions in order
///
/// Each question is followed by a NUL byte so `["ab", "c"]` and `["a", "bc"]`
/// hash differently.
pub fn corpus_fingerprint(pairs: &[QaPair]) -> String {
    let mut hasher = Sha256::new();
    for pair in pairs {
        hasher.update(pair.question.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// One embedded corpus question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub question: String,
    pub embedding: Vec<f32>,
}

/// Persisted corpus embeddings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingIndex {
    /// Embedder that produced the vectors
    pub embedding_model: String,

    /// Length of every vector
    pub embedding_dim: usize,

    /// Fingerprint of the questions the index was built from
    pub corpus_fingerprint: String,

    /// Build time
    pub created_at: DateTime<Utc>,

    /// One entry per QA pair, in corpus order
    pub entries: Vec<IndexEntry>,
}

impl EmbeddingIndex {
    /// Embed every corpus question
    pub async fn build(pairs: &[QaPair], embedder: &dyn Embedder) -> Result<Self> {
        info!(
            "Embedding {} corpus questions with {}",
            pairs.len(),
            embedder.model_name()
        );

        let questions: Vec<String> = pairs.iter().map(|p| p.question.clone()).collect();
        let embeddings = embedder.embed_batch(&questions).await?;

        if embeddings.len() != questions.len() {
            return Err(QhseError::embedding(format!(
                "Embedder returned {} vectors for {} questions",
                embeddings.len(),
                questions.len()
            )));
        }

        let embedding_dim = embeddings.first().map(Vec::len).unwrap_or(0);
        let entries = questions
            .into_iter()
            .zip(embeddings)
            .map(|(question, embedding)| IndexEntry {
                question,
                embedding,
            })
            .collect();

        let index = Self {
            embedding_model: embedder.model_name().to_string(),
            embedding_dim,
            corpus_fingerprint: corpus_fingerprint(pairs),
            created_at: Utc::now(),
            entries,
        };
        index.check_dimensions()?;
        Ok(index)
    }

    /// Load index from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            QhseError::file_system(format!(
                "Failed to read embedding index {}: {}",
                path.display(),
                e
            ))
        })?;
        let index: Self = serde_json::from_str(&data)?;
        index.check_dimensions()?;
        Ok(index)
    }

    /// Save index as JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(self)?)?;
        info!(
            "Embedding index saved: {} entries (dim {}) -> {}",
            self.entries.len(),
            self.embedding_dim,
            path.display()
        );
        Ok(())
    }

    /// Check the index still describes `pairs` as embedded by `model`
    pub fn validate_against(&self, pairs: &[QaPair], model: &str) -> Result<()> {
        if self.embedding_model != model {
            return Err(QhseError::corpus(format!(
                "Embedding index was built with '{}', current embedder is '{}'",
                self.embedding_model, model
            )));
        }
        if self.entries.len() != pairs.len() {
            return Err(QhseError::corpus(format!(
                "Embedding index has {} entries but the corpus has {} pairs",
                self.entries.len(),
                pairs.len()
            )));
        }
        let fingerprint = corpus_fingerprint(pairs);
        if self.corpus_fingerprint != fingerprint {
            return Err(QhseError::corpus(
                "Embedding index fingerprint does not match the QA corpus",
            ));
        }
        Ok(())
    }

    /// Pair the stored vectors with their answers
    pub fn into_corpus(self, pairs: Vec<QaPair>) -> Result<EmbeddedCorpus> {
        let embeddings = self.entries.into_iter().map(|e| e.embedding).collect();
        EmbeddedCorpus::from_parts(pairs, embeddings)
    }

    /// Load the index at `path`, rebuilding it when missing or stale
    ///
    /// Rebuilding only happens when `auto_embed` is set; otherwise a missing
    /// or stale index is an error.
    pub async fn load_or_build(
        path: &Path,
        pairs: Vec<QaPair>,
        embedder: &dyn Embedder,
        auto_embed: bool,
    ) -> Result<EmbeddedCorpus> {
        let existing = if path.exists() {
            match Self::load(path)
                .and_then(|index| index.validate_against(&pairs, embedder.model_name()).map(|_| index))
            {
                Ok(index) => Some(index),
                Err(e) if auto_embed => {
                    warn!("Embedding index is stale, rebuilding: {}", e);
                    None
                }
                Err(e) => return Err(e),
            }
        } else if auto_embed {
            info!("No embedding index at {}, building one", path.display());
            None
        } else {
            return Err(QhseError::not_found(format!(
                "Embedding index {} does not exist",
                path.display()
            )));
        };

        let index = match existing {
            Some(index) => {
                info!(
                    "Embedding index loaded: {} entries (model: {})",
                    index.entries.len(),
                    index.embedding_model
                );
                index
            }
            None => {
                let index = Self::build(&pairs, embedder).await?;
                index.save(path)?;
                index
            }
        };

        index.into_corpus(pairs)
    }

    fn check_dimensions(&self) -> Result<()> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.embedding.len() != self.embedding_dim)
        {
            return Err(QhseError::corpus(format!(
                "Embedding for '{}' has dimension {}, expected {}",
                entry.question,
                entry.embedding.len(),
                self.embedding_dim
            )));
        }
        Ok(())
    }
}

/// QA pairs aligned with their question embeddings
#[derive(Debug, Clone, Default)]
pub struct EmbeddedCorpus {
    pairs: Vec<QaPair>,
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddedCorpus {
    /// Both sequences must have the same length and all vectors one dimension
    pub fn from_parts(pairs: Vec<QaPair>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if pairs.len() != embeddings.len() {
            return Err(QhseError::corpus(format!(
                "{} QA pairs but {} embeddings",
                pairs.len(),
                embeddings.len()
            )));
        }
        let mut corpus = Self::default();
        for (pair, embedding) in pairs.into_iter().zip(embeddings) {
            corpus.push(pair, embedding)?;
        }
        Ok(corpus)
    }

    /// Append a pair; its vector must match the existing dimension
    pub fn push(&mut self, pair: QaPair, embedding: Vec<f32>) -> Result<()> {
        if let Some(dim) = self.dimension() {
            if embedding.len() != dim {
                return Err(QhseError::corpus(format!(
                    "Embedding for '{}' has dimension {}, expected {}",
                    pair.question,
                    embedding.len(),
                    dim
                )));
            }
        }
        self.pairs.push(pair);
        self.embeddings.push(embedding);
        Ok(())
    }

    pub fn pairs(&self) -> &[QaPair] {
        &self.pairs
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn pair(&self, index: usize) -> Option<&QaPair> {
        self.pairs.get(index)
    }

    /// Vector dimension, if any entry exists
    pub fn dimension(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
