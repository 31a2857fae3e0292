use serde::{Deserialize, Serialize};

use crate::feedback::FeedbackRecord;

/// Chat answer over HTTP
#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub response: String,
}

/// Result of a model upload
#[derive(Debug, Serialize)]
pub struct SaveModelResponse {
    pub message: String,
    pub input_dim: usize,
    pub parameters: usize,
}

/// Result of server-side training
#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub message: String,
    pub samples: usize,
    pub epochs: usize,
    pub loss: Option<f32>,
    pub accuracy: Option<f32>,
    /// Per-epoch loss
    pub loss_history: Vec<f32>,
    /// Per-epoch accuracy
    pub accuracy_history: Vec<f32>,
}

/// Queued chat feedback
#[derive(Debug, Serialize)]
pub struct FeedbackListResponse {
    pub pending: usize,
    pub records: Vec<FeedbackRecord>,
}

/// Result of draining the feedback queue
#[derive(Debug, Serialize)]
pub struct FeedbackApplyResponse {
    pub applied: usize,
}

/// Service health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub responses: usize,
    pub corpus_size: usize,
    pub embedding_model: String,
    pub classifier_loaded: bool,
    pub feature_vocabulary_version: u32,
    pub pending_feedback: usize,
}
