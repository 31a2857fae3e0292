//! QHSE model runtimes
//!
//! Capability traits for embedding and classification, plus the
//! implementations behind them: an Ollama embedding client, a local
//! bag-of-words embedder and a small dense network.

mod dense;
mod ollama;
mod traits;
mod types;
mod vocabulary;

pub use dense::{Activation, DenseNetwork, LayerSpec, ModelTopology, TrainingOptions, TrainingReport};
pub use ollama::OllamaClient;
pub use traits::{Classifier, Embedder};
pub use types::{EmbedRequest, EmbedResponse};
pub use vocabulary::{TokenVocabulary, VocabularyEmbedder};
