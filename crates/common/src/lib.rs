pub mod config;
pub mod error;
pub mod logger;
pub mod text;

// Re-export commonly used types
pub use config::{AppConfig, EmbeddingBackend};
pub use error::QhseError;
pub type Result<T> = std::result::Result<T, QhseError>;
