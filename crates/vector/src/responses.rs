use qhse_common::text::normalize;
use qhse_common::{QhseError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_RESPONSES: &str = include_str!("../../../data/responses.json");

/// Canned answers keyed by normalized question text
#[derive(Debug, Clone, Default)]
pub struct ResponseTable {
    entries: HashMap<String, String>,
}

impl ResponseTable {
    /// Build a table, normalizing every key
    ///
    /// When two keys normalize to the same text the first one is kept.
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut table = HashMap::new();
        for (key, value) in entries {
            let normalized = normalize(key.as_ref());
            if normalized.is_empty() {
                warn!("Skipping response with empty key: {:?}", key.as_ref());
                continue;
            }
            table.entry(normalized).or_insert_with(|| value.into());
        }
        Self { entries: table }
    }

    /// Parse a JSON object of `question -> answer`
    ///
    /// Keys are read in file order, so the earlier of two duplicates wins.
    pub fn from_json(data: &str) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(data)?;
        let mut entries = Vec::with_capacity(object.len());
        for (key, value) in object {
            match value {
                serde_json::Value::String(answer) => entries.push((key, answer)),
                other => {
                    return Err(QhseError::serialization(format!(
                        "Response for '{}' must be a string, got {}",
                        key, other
                    )))
                }
            }
        }
        Ok(Self::new(entries))
    }

    /// Compiled-in response table
    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_RESPONSES)
    }

    /// Load the table from `path`, or the compiled-in one when no path is set
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let table = match path {
            Some(path) => {
                let data = std::fs::read_to_string(path).map_err(|e| {
                    QhseError::file_system(format!(
                        "Failed to read responses {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_json(&data)?
            }
            None => Self::builtin()?,
        };
        info!("Response table loaded: {} entries", table.len());
        Ok(table)
    }

    /// Exact lookup of an already-normalized query
    pub fn lookup(&self, normalized: &str) -> Option<&str> {
        self.entries.get(normalized).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
