use chrono::{DateTime, Utc};
use qhse_common::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Thumbs up or down on an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Up,
    Down,
}

/// One piece of user feedback from the chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Client message id the feedback refers to
    pub id: String,
    pub feedback: FeedbackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(id: impl Into<String>, feedback: FeedbackKind) -> Self {
        Self {
            id: id.into(),
            feedback,
            query: None,
            answer: None,
            received_at: Utc::now(),
        }
    }
}

/// Pending feedback, flushed to an append-only JSONL log on apply
pub struct FeedbackQueue {
    pending: RwLock<Vec<FeedbackRecord>>,
    log_path: PathBuf,
}

impl FeedbackQueue {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            pending: RwLock::new(Vec::new()),
            log_path: log_path.into(),
        }
    }

    pub async fn push(&self, record: FeedbackRecord) {
        info!("Feedback {:?} for message {}", record.feedback, record.id);
        self.pending.write().await.push(record);
    }

    /// Snapshot of records not yet applied
    pub async fn pending(&self) -> Vec<FeedbackRecord> {
        self.pending.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Drain the queue into the feedback log and return how many were written
    ///
    /// On a write failure the drained records go back to the front of the
    /// queue.
    pub async fn apply(&self) -> Result<usize> {
        let drained: Vec<FeedbackRecord> = std::mem::take(&mut *self.pending.write().await);
        if drained.is_empty() {
            return Ok(0);
        }

        match self.append(&drained).await {
            Ok(()) => {
                info!(
                    "Applied {} feedback records -> {}",
                    drained.len(),
                    self.log_path.display()
                );
                Ok(drained.len())
            }
            Err(e) => {
                warn!("Failed to write feedback log: {}", e);
                let mut pending = self.pending.write().await;
                let newer = std::mem::replace(&mut *pending, drained);
                pending.extend(newer);
                Err(e)
            }
        }
    }

    async fn append(&self, records: &[FeedbackRecord]) -> Result<()> {
        if let Some(parent) = self.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut lines = String::new();
        for record in records {
            lines.push_str(&serde_json::to_string(record)?);
            lines.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_drains_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback").join("feedback.jsonl");
        let queue = FeedbackQueue::new(&path);

        let mut record = FeedbackRecord::new("7", FeedbackKind::Up);
        record.answer = Some("Wear a helmet.".to_string());
        queue.push(record).await;
        queue.push(FeedbackRecord::new("8", FeedbackKind::Down)).await;
        assert_eq!(queue.len().await, 2);

        assert_eq!(queue.apply().await.unwrap(), 2);
        assert_eq!(queue.len().await, 0);
        assert_eq!(queue.apply().await.unwrap(), 0);

        let log = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = log
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["feedback"], "up");
        assert_eq!(lines[0]["answer"], "Wear a helmet.");
        assert!(lines[1].get("answer").is_none());
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let queue = FeedbackQueue::new(dir.path());
        queue.push(FeedbackRecord::new("1", FeedbackKind::Down)).await;

        assert!(queue.apply().await.is_err());
        let pending = queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "1");
    }
}
