use crate::error::QhseError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Which runtime produces text embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Remote Ollama embedding endpoint
    Ollama,
    /// Local bag-of-words over the corpus vocabulary
    Vocabulary,
}

impl FromStr for EmbeddingBackend {
    type Err = QhseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "vocabulary" | "vocab" | "local" => Ok(Self::Vocabulary),
            other => Err(QhseError::config(format!(
                "Unknown embedding backend '{}', expected 'ollama' or 'vocabulary'",
                other
            ))),
        }
    }
}

/// QHSE Expert application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base directory for generated data (embeddings, models, feedback)
    pub data_dir: PathBuf,

    /// Response table override; the compiled-in table is used when unset
    pub responses_path: Option<PathBuf>,

    /// QA corpus override; the compiled-in corpus is used when unset
    pub qa_pairs_path: Option<PathBuf>,

    /// Embedding index file path
    pub embeddings_path: PathBuf,

    /// Token vocabulary file path
    pub vocabulary_path: PathBuf,

    /// Feature vocabulary override for the predictive path
    pub feature_vocab_path: Option<PathBuf>,

    /// Directory holding the classifier topology and weights
    pub model_dir: PathBuf,

    /// Feedback log (JSON lines)
    pub feedback_log_path: PathBuf,

    /// Built frontend served under /ui when present
    pub static_dir: Option<PathBuf>,

    /// Embedding runtime
    pub embedding_backend: EmbeddingBackend,

    /// Ollama API base URL
    pub ollama_base_url: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Timeout for a single embedding request
    pub embed_timeout_secs: u64,

    /// Rebuild missing or stale embeddings at startup instead of failing
    pub auto_embed: bool,

    /// Server bind address
    pub server_host: String,

    /// Server port
    pub server_port: u16,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// WebSocket ping interval
    pub heartbeat_interval_secs: u64,

    /// WebSocket clients silent for longer than this are dropped
    pub client_timeout_secs: u64,

    /// Default epoch count for server-side training
    pub training_epochs: usize,

    /// Upper bound for multipart uploads
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            responses_path: None,
            qa_pairs_path: None,
            embeddings_path: PathBuf::from("./data/qa_embeddings.json"),
            vocabulary_path: PathBuf::from("./data/token_to_index.json"),
            feature_vocab_path: None,
            model_dir: PathBuf::from("./data/models/observations"),
            feedback_log_path: PathBuf::from("./data/feedback.jsonl"),
            static_dir: None,
            embedding_backend: EmbeddingBackend::Ollama,
            ollama_base_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embed_timeout_secs: 30,
            auto_embed: true,
            server_host: "0.0.0.0".to_string(),
            server_port: 5000,
            log_dir: PathBuf::from("./data/log"),
            log_level: "info".to_string(),
            heartbeat_interval_secs: 5,
            client_timeout_secs: 10,
            training_epochs: 10,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, QhseError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let defaults = Self::default();
        let data_dir = Self::get_env_path("DATA_DIR").unwrap_or(defaults.data_dir);

        let config = Self {
            responses_path: Self::get_env_path("RESPONSES_PATH"),
            qa_pairs_path: Self::get_env_path("QA_PAIRS_PATH"),
            embeddings_path: Self::get_env_path("EMBEDDINGS_PATH")
                .unwrap_or_else(|| data_dir.join("qa_embeddings.json")),
            vocabulary_path: Self::get_env_path("VOCABULARY_PATH")
                .unwrap_or_else(|| data_dir.join("token_to_index.json")),
            feature_vocab_path: Self::get_env_path("FEATURE_VOCAB_PATH"),
            model_dir: Self::get_env_path("MODEL_DIR")
                .unwrap_or_else(|| data_dir.join("models").join("observations")),
            feedback_log_path: Self::get_env_path("FEEDBACK_LOG_PATH")
                .unwrap_or_else(|| data_dir.join("feedback.jsonl")),
            static_dir: Self::get_env_path("STATIC_DIR"),
            embedding_backend: match std::env::var("EMBEDDING_BACKEND") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.embedding_backend,
            },
            ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                .unwrap_or(defaults.ollama_base_url),
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embed_timeout_secs: Self::get_env_parsed("EMBED_TIMEOUT_SECS")
                .unwrap_or(defaults.embed_timeout_secs),
            auto_embed: Self::get_env_bool("AUTO_EMBED").unwrap_or(defaults.auto_embed),
            server_host: std::env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: Self::get_env_parsed("SERVER_PORT")
                .or_else(|| Self::get_env_parsed("PORT"))
                .unwrap_or(defaults.server_port),
            log_dir: Self::get_env_path("LOG_DIR").unwrap_or_else(|| data_dir.join("log")),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            heartbeat_interval_secs: Self::get_env_parsed("HEARTBEAT_INTERVAL_SECS")
                .unwrap_or(defaults.heartbeat_interval_secs),
            client_timeout_secs: Self::get_env_parsed("CLIENT_TIMEOUT_SECS")
                .unwrap_or(defaults.client_timeout_secs),
            training_epochs: Self::get_env_parsed("TRAINING_EPOCHS")
                .unwrap_or(defaults.training_epochs),
            max_upload_bytes: Self::get_env_parsed("MAX_UPLOAD_BYTES")
                .unwrap_or(defaults.max_upload_bytes),
            data_dir,
        };

        config.validate()?;

        // Ensure required directories exist
        config.ensure_directories()?;

        Ok(config)
    }

    /// Get PathBuf from environment variable
    fn get_env_path(key: &str) -> Option<PathBuf> {
        std::env::var(key).ok().map(PathBuf::from)
    }

    fn get_env_parsed<T: FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
    }

    fn get_env_bool(key: &str) -> Option<bool> {
        std::env::var(key).ok().and_then(|s| parse_bool(&s))
    }

    /// Ensure required directories exist, create if not
    pub fn ensure_directories(&self) -> Result<(), QhseError> {
        let dirs = vec![&self.data_dir, &self.model_dir, &self.log_dir];

        for dir in dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    QhseError::config(format!(
                        "Failed to create directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Classifier topology file
    pub fn model_topology_path(&self) -> PathBuf {
        self.model_dir.join("model.json")
    }

    /// Classifier weight blob
    pub fn model_weights_path(&self) -> PathBuf {
        self.model_dir.join("weights.bin")
    }

    /// Get server bind address (host:port)
    pub fn server_bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), QhseError> {
        if self.embedding_backend == EmbeddingBackend::Ollama {
            if self.embedding_model.trim().is_empty() {
                return Err(QhseError::config("Embedding model name cannot be empty"));
            }

            if !self.ollama_base_url.starts_with("http://")
                && !self.ollama_base_url.starts_with("https://")
            {
                return Err(QhseError::config(
                    "Ollama base URL must start with http:// or https://",
                ));
            }
        }

        // Validate port range
        if self.server_port == 0 {
            return Err(QhseError::config("Server port cannot be 0"));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(QhseError::config("Heartbeat interval must be positive"));
        }

        if self.client_timeout_secs <= self.heartbeat_interval_secs {
            return Err(QhseError::config(
                "Client timeout must be longer than the heartbeat interval",
            ));
        }

        if self.training_epochs == 0 {
            return Err(QhseError::config("Training epochs must be positive"));
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server_port, 5000);
        assert_eq!(config.embedding_backend, EmbeddingBackend::Ollama);
        assert!(config.auto_embed);
    }

    #[test]
    fn test_server_bind_address() {
        let config = AppConfig::default();
        assert_eq!(config.server_bind_address(), "0.0.0.0:5000");
    }

    #[test]
    fn test_model_paths() {
        let config = AppConfig::default();
        assert!(config.model_topology_path().ends_with("model.json"));
        assert!(config.model_weights_path().ends_with("weights.bin"));
    }

    #[test]
    fn test_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid_config = AppConfig::default();
        invalid_config.ollama_base_url = "localhost:11434".to_string();
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = AppConfig::default();
        invalid_config.client_timeout_secs = invalid_config.heartbeat_interval_secs;
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_vocabulary_backend_skips_ollama_checks() {
        let mut config = AppConfig::default();
        config.embedding_backend = EmbeddingBackend::Vocabulary;
        config.ollama_base_url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("ollama".parse::<EmbeddingBackend>().unwrap(), EmbeddingBackend::Ollama);
        assert_eq!("Vocab".parse::<EmbeddingBackend>().unwrap(), EmbeddingBackend::Vocabulary);
        assert!("bert".parse::<EmbeddingBackend>().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
