use qhse_analytics::{check_model_compatibility, FeatureVocabulary};
use qhse_common::{AppConfig, EmbeddingBackend, QhseError, Result};
use qhse_model::{DenseNetwork, Embedder, OllamaClient, TokenVocabulary, VocabularyEmbedder};
use qhse_vector::{load_qa_pairs, EmbeddingIndex, QaEngine, QaPair, ResponseTable};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::feedback::FeedbackQueue;

/// Shared application state
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Chat question answering
    pub engine: QaEngine,

    /// Feature layout for observation rows
    pub feature_vocabulary: FeatureVocabulary,

    /// Pending chat feedback
    pub feedback: FeedbackQueue,

    /// Observation classifier, swapped by the model upload and training endpoints
    classifier: RwLock<Option<Arc<DenseNetwork>>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        engine: QaEngine,
        feature_vocabulary: FeatureVocabulary,
        classifier: Option<DenseNetwork>,
    ) -> Self {
        let feedback = FeedbackQueue::new(config.feedback_log_path.clone());
        Self {
            config,
            engine,
            feature_vocabulary,
            feedback,
            classifier: RwLock::new(classifier.map(Arc::new)),
        }
    }

    /// Build everything the server needs, in dependency order
    ///
    /// Any failure aborts startup except a missing or unusable classifier,
    /// which only disables predictions.
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        info!("Initializing QHSE Expert state...");

        let engine = build_engine(&config).await?;
        let feature_vocabulary = FeatureVocabulary::load(config.feature_vocab_path.as_deref())?;
        let classifier = load_classifier(&config, &feature_vocabulary);

        info!(
            "State ready: {} responses, {} QA pairs, classifier {}",
            engine.responses().len(),
            engine.corpus().len(),
            if classifier.is_some() { "loaded" } else { "not loaded" }
        );
        Ok(Self::new(config, engine, feature_vocabulary, classifier))
    }

    /// Current classifier, if one is loaded
    pub async fn classifier(&self) -> Option<Arc<DenseNetwork>> {
        self.classifier.read().await.clone()
    }

    /// Validate, persist and hot-swap a classifier
    pub async fn install_classifier(&self, network: DenseNetwork) -> Result<()> {
        check_model_compatibility(network.topology(), &self.feature_vocabulary)?;
        network.save(
            &self.config.model_topology_path(),
            &self.config.model_weights_path(),
        )?;

        *self.classifier.write().await = Some(Arc::new(network));
        info!("Classifier installed");
        Ok(())
    }
}

/// Response table, QA corpus, embedder and embedding index combined
pub async fn build_engine(config: &AppConfig) -> Result<QaEngine> {
    let responses = ResponseTable::load(config.responses_path.as_deref())?;
    let pairs = load_qa_pairs(config.qa_pairs_path.as_deref())?;
    let embedder = build_embedder(config, &pairs).await?;

    let corpus = EmbeddingIndex::load_or_build(
        &config.embeddings_path,
        pairs,
        embedder.as_ref(),
        config.auto_embed,
    )
    .await?;

    Ok(QaEngine::new(responses, corpus, embedder))
}

/// Embedder for the configured backend
pub async fn build_embedder(config: &AppConfig, pairs: &[QaPair]) -> Result<Arc<dyn Embedder>> {
    match config.embedding_backend {
        EmbeddingBackend::Ollama => {
            let client = OllamaClient::new(
                config.ollama_base_url.clone(),
                config.embedding_model.clone(),
                Duration::from_secs(config.embed_timeout_secs),
            )?;
            match client.test_connection().await {
                Ok(true) => info!("Ollama reachable at {}", config.ollama_base_url),
                _ => warn!(
                    "Ollama not reachable at {}; embedding calls will fail until it is",
                    config.ollama_base_url
                ),
            }
            Ok(Arc::new(client))
        }
        EmbeddingBackend::Vocabulary => {
            let vocabulary = load_or_build_vocabulary(&config.vocabulary_path, pairs, config.auto_embed)?;
            Ok(Arc::new(VocabularyEmbedder::new(vocabulary)))
        }
    }
}

/// Token vocabulary at `path`, built from the corpus questions when missing
pub fn load_or_build_vocabulary(
    path: &Path,
    pairs: &[QaPair],
    build_missing: bool,
) -> Result<TokenVocabulary> {
    if path.exists() {
        let vocabulary = TokenVocabulary::load(path)?;
        info!("Vocabulary loaded: {} tokens", vocabulary.len());
        return Ok(vocabulary);
    }
    if !build_missing {
        return Err(QhseError::not_found(format!(
            "Vocabulary {} does not exist",
            path.display()
        )));
    }

    let vocabulary = TokenVocabulary::build(pairs.iter().map(|p| p.question.as_str()));
    vocabulary.save(path)?;
    Ok(vocabulary)
}

fn load_classifier(config: &AppConfig, vocabulary: &FeatureVocabulary) -> Option<DenseNetwork> {
    let topology_path = config.model_topology_path();
    let weights_path = config.model_weights_path();
    if !topology_path.exists() || !weights_path.exists() {
        info!("No saved classifier in {}", config.model_dir.display());
        return None;
    }

    let loaded = DenseNetwork::load(&topology_path, &weights_path).and_then(|network| {
        check_model_compatibility(network.topology(), vocabulary)?;
        Ok(network)
    });
    match loaded {
        Ok(network) => {
            info!("Classifier loaded from {}", config.model_dir.display());
            Some(network)
        }
        Err(e) => {
            warn!("Saved classifier ignored: {}", e);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use qhse_model::ModelTopology;

    /// Offline config rooted in a temporary directory
    pub(crate) fn test_config(dir: &Path) -> AppConfig {
        AppConfig {
            data_dir: dir.to_path_buf(),
            embeddings_path: dir.join("qa_embeddings.json"),
            vocabulary_path: dir.join("token_to_index.json"),
            model_dir: dir.join("models"),
            feedback_log_path: dir.join("feedback.jsonl"),
            log_dir: dir.join("log"),
            embedding_backend: EmbeddingBackend::Vocabulary,
            ..AppConfig::default()
        }
    }

    pub(crate) async fn test_state(dir: &Path) -> AppState {
        AppState::initialize(test_config(dir)).await.unwrap()
    }

    #[tokio::test]
    async fn test_initialize_builds_index_and_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        assert!(dir.path().join("qa_embeddings.json").exists());
        assert!(dir.path().join("token_to_index.json").exists());
        assert!(!state.engine.corpus().is_empty());
        assert!(state.classifier().await.is_none());

        // Second start reuses the persisted files
        let again = test_state(dir.path()).await;
        assert_eq!(again.engine.corpus().len(), state.engine.corpus().len());
    }

    #[tokio::test]
    async fn test_initialize_without_auto_embed_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            auto_embed: false,
            ..test_config(dir.path())
        };
        assert!(AppState::initialize(config).await.is_err());
    }

    #[tokio::test]
    async fn test_install_classifier_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let width = state.feature_vocabulary.feature_width();
        let topology = ModelTopology::observation_classifier(width, state.feature_vocabulary.version);

        state
            .install_classifier(DenseNetwork::new_random(topology, 7).unwrap())
            .await
            .unwrap();
        assert!(state.classifier().await.is_some());

        let reloaded = test_state(dir.path()).await;
        assert!(reloaded.classifier().await.is_some());
    }

    #[tokio::test]
    async fn test_incompatible_classifier_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let topology = ModelTopology::observation_classifier(4, state.feature_vocabulary.version);

        let result = state
            .install_classifier(DenseNetwork::new_random(topology, 7).unwrap())
            .await;
        assert!(result.is_err());
        assert!(state.classifier().await.is_none());
    }
}
