/// QHSE Expert error types
#[derive(Debug, thiserror::Error)]
pub enum QhseError {
    /// A model was requested before one was loaded
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    /// Embedding runtime error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Classifier topology, weights or inference error
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// QA corpus or embedding index inconsistency
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error
    #[error("File system error: {0}")]
    FileSystem(String),

    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QhseError {
    /// Create model-not-loaded error
    pub fn model_not_loaded<S: Into<String>>(msg: S) -> Self {
        Self::ModelNotLoaded(msg.into())
    }

    /// Create embedding error
    pub fn embedding<S: Into<String>>(msg: S) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create classifier error
    pub fn classifier<S: Into<String>>(msg: S) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create corpus error
    pub fn corpus<S: Into<String>>(msg: S) -> Self {
        Self::Corpus(msg.into())
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create file system error
    pub fn file_system<S: Into<String>>(msg: S) -> Self {
        Self::FileSystem(msg.into())
    }

    /// Create network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

impl QhseError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Serialization(_) => 400,
            Self::Json(_) => 400,
            Self::NotFound(_) => 404,
            Self::Network(_) => 503,
            Self::ModelNotLoaded(_) => 500,
            Self::Embedding(_) => 500,
            Self::Classifier(_) => 500,
            Self::Corpus(_) => 500,
            Self::Config(_) => 500,
            Self::FileSystem(_) => 500,
            Self::Internal(_) => 500,
            Self::Io(_) => 500,
            Self::Other(_) => 500,
        }
    }

    /// Whether the message is safe to show to an API client as-is
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(QhseError::invalid_input("bad").status_code(), 400);
        assert_eq!(QhseError::not_found("gone").status_code(), 404);
        assert_eq!(QhseError::model_not_loaded("classifier").status_code(), 500);
        assert_eq!(QhseError::network("down").status_code(), 503);
    }

    #[test]
    fn test_client_error() {
        assert!(QhseError::invalid_input("bad").is_client_error());
        assert!(!QhseError::embedding("timeout").is_client_error());
    }

    #[test]
    fn test_display() {
        let err = QhseError::model_not_loaded("no classifier has been saved yet");
        assert_eq!(err.to_string(), "Model not loaded: no classifier has been saved yet");
    }
}
