use qhse_common::{QhseError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

const DEFAULT_QA_PAIRS: &str = include_str!("../../../data/qa_pairs.json");

/// Question/answer pair from the QA corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// Compiled-in QA corpus
pub fn default_qa_pairs() -> Result<Vec<QaPair>> {
    parse_qa_pairs(DEFAULT_QA_PAIRS)
}

/// Load the QA corpus from `path`, or the compiled-in one when no path is set
pub fn load_qa_pairs(path: Option<&Path>) -> Result<Vec<QaPair>> {
    let pairs = match path {
        Some(path) => {
            let data = std::fs::read_to_string(path).map_err(|e| {
                QhseError::file_system(format!("Failed to read QA pairs {}: {}", path.display(), e))
            })?;
            parse_qa_pairs(&data)?
        }
        None => default_qa_pairs()?,
    };
    info!("QA corpus loaded: {} pairs", pairs.len());
    Ok(pairs)
}

fn parse_qa_pairs(data: &str) -> Result<Vec<QaPair>> {
    let pairs: Vec<QaPair> = serde_json::from_str(data)?;
    if let Some(position) = pairs.iter().position(|p| p.question.trim().is_empty()) {
        return Err(QhseError::corpus(format!(
            "QA pair {} has an empty question",
            position
        )));
    }
    Ok(pairs)
}
