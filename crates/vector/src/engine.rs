use qhse_common::text::normalize;
use qhse_common::Result;
use qhse_model::Embedder;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::index::EmbeddedCorpus;
use crate::responses::ResponseTable;
use crate::similarity::{best_match, rank};

/// Reply when the corpus has nothing to offer
pub const FALLBACK_RESPONSE: &str = "I am not sure how to respond to that.";

/// Where an answer came from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerSource {
    /// Exact hit in the response table
    Table,
    /// Nearest corpus question
    Match { index: usize, score: f32 },
    /// Empty corpus
    Fallback,
}

/// Answer text with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

/// Question answering over the response table and the embedded QA corpus
pub struct QaEngine {
    responses: ResponseTable,
    corpus: EmbeddedCorpus,
    embedder: Arc<dyn Embedder>,
}

impl QaEngine {
    pub fn new(responses: ResponseTable, corpus: EmbeddedCorpus, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            responses,
            corpus,
            embedder,
        }
    }

    /// Answer a free-text query
    ///
    /// Table hits return without touching the embedder.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let normalized = normalize(query);
        if let Some(text) = self.responses.lookup(&normalized) {
            debug!("Response table hit: '{}'", normalized);
            return Ok(Answer {
                text: text.to_string(),
                source: AnswerSource::Table,
            });
        }

        if self.corpus.is_empty() {
            return Ok(Self::fallback());
        }

        let embedding = self.embedder.embed(query).await?;
        Ok(match best_match(&embedding, self.corpus.embeddings()) {
            Some(best) => {
                debug!(
                    "Best corpus match for '{}': #{} (score {:.4})",
                    normalized, best.index, best.score
                );
                self.corpus_answer(best.index, best.score)
            }
            None => Self::fallback(),
        })
    }

    /// Every corpus answer, most similar first
    pub async fn ranked(&self, query: &str) -> Result<Vec<Answer>> {
        if self.corpus.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        Ok(rank(&embedding, self.corpus.embeddings())
            .into_iter()
            .map(|m| self.corpus_answer(m.index, m.score))
            .collect())
    }

    pub fn responses(&self) -> &ResponseTable {
        &self.responses
    }

    pub fn corpus(&self) -> &EmbeddedCorpus {
        &self.corpus
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.model_name()
    }

    fn corpus_answer(&self, index: usize, score: f32) -> Answer {
        match self.corpus.pair(index) {
            Some(pair) => Answer {
                text: pair.answer.clone(),
                source: AnswerSource::Match { index, score },
            },
            None => Self::fallback(),
        }
    }

    fn fallback() -> Answer {
        Answer {
            text: FALLBACK_RESPONSE.to_string(),
            source: AnswerSource::Fallback,
        }
    }
}
