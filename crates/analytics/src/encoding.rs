use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use qhse_common::{QhseError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::spreadsheet::ObservationRow;

/// Version of the built-in feature vocabulary
pub const FEATURE_VOCABULARY_VERSION: u32 = 1;

const DEFAULT_MAX_TEXT_LEN: usize = 30;
const DATE_FEATURES: usize = 3;

/// Categories and locations the classifier was trained against
///
/// Fixed and versioned so a feature vector means the same thing at training
/// and at prediction time, whatever the uploaded batch contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVocabulary {
    pub version: u32,
    pub categories: Vec<String>,
    pub locations: Vec<String>,
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,
}

fn default_max_text_len() -> usize {
    DEFAULT_MAX_TEXT_LEN
}

impl Default for FeatureVocabulary {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            version: FEATURE_VOCABULARY_VERSION,
            categories: owned(&["PPE", "ACCESS", "ELECTRICAL", "EXCAVATION", "GENERAL"]),
            locations: owned(&["SITE", "WORKSHOP", "OFFICE", "WAREHOUSE", "YARD"]),
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }
}

impl FeatureVocabulary {
    /// Load vocabulary from JSON, or the built-in one when no path is set
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let vocabulary = match path {
            Some(path) => {
                let data = std::fs::read_to_string(path).map_err(|e| {
                    QhseError::file_system(format!(
                        "Failed to read feature vocabulary {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let vocabulary: Self = serde_json::from_str(&data)?;
                vocabulary.validate()?;
                vocabulary
            }
            None => Self::default(),
        };

        info!(
            "Feature vocabulary v{}: {} categories, {} locations, text length {} ({} features)",
            vocabulary.version,
            vocabulary.categories.len(),
            vocabulary.locations.len(),
            vocabulary.max_text_len,
            vocabulary.feature_width()
        );
        Ok(vocabulary)
    }

    /// Length of every encoded row
    pub fn feature_width(&self) -> usize {
        DATE_FEATURES + self.categories.len() + self.max_text_len + self.locations.len()
    }

    pub fn category_index(&self, category: &str) -> Option<usize> {
        position_ignore_case(&self.categories, category)
    }

    pub fn location_index(&self, location: &str) -> Option<usize> {
        position_ignore_case(&self.locations, location)
    }

    /// Encode one observation row
    ///
    /// Layout: date (3), category one-hot, scaled text codes, location one-hot.
    pub fn encode_row(&self, row: &ObservationRow) -> Vec<f32> {
        let mut features = Vec::with_capacity(self.feature_width());

        features.extend(date_features(row.date));
        push_one_hot(
            &mut features,
            self.categories.len(),
            row.category.as_deref().and_then(|c| self.category_index(c)),
        );
        features.extend(
            encode_text(&row.observation, self.max_text_len)
                .into_iter()
                .map(|code| (code / 255.0).min(1.0)),
        );
        push_one_hot(
            &mut features,
            self.locations.len(),
            row.location.as_deref().and_then(|l| self.location_index(l)),
        );

        features
    }

    fn validate(&self) -> Result<()> {
        if self.max_text_len == 0 {
            return Err(QhseError::config("Feature vocabulary max_text_len must be positive"));
        }
        for (kind, items) in [("category", &self.categories), ("location", &self.locations)] {
            for (i, item) in items.iter().enumerate() {
                if item.trim().is_empty() {
                    return Err(QhseError::config(format!("Empty {} in feature vocabulary", kind)));
                }
                if position_ignore_case(&items[..i], item).is_some() {
                    return Err(QhseError::config(format!(
                        "Duplicate {} '{}' in feature vocabulary",
                        kind, item
                    )));
                }
            }
        }
        Ok(())
    }
}

fn position_ignore_case(items: &[String], value: &str) -> Option<usize> {
    let value = value.trim();
    items.iter().position(|item| item.trim().eq_ignore_ascii_case(value))
}

fn push_one_hot(features: &mut Vec<f32>, width: usize, hot: Option<usize>) {
    features.extend((0..width).map(|i| if Some(i) == hot { 1.0 } else { 0.0 }));
}

fn date_features(date: Option<NaiveDate>) -> [f32; 3] {
    match date {
        Some(date) => [
            (date.year() - 2000) as f32 / 100.0,
            date.month() as f32 / 12.0,
            date.day() as f32 / 31.0,
        ],
        None => [0.0; 3],
    }
}

/// Character codes of `text`, truncated or zero-padded to `max_len`
///
/// Always returns exactly `max_len` values.
pub fn encode_text(text: &str, max_len: usize) -> Vec<f32> {
    let mut codes: Vec<f32> = text.chars().take(max_len).map(|c| c as u32 as f32).collect();
    codes.resize(max_len, 0.0);
    codes
}

/// Parse a spreadsheet date
///
/// Accepts ISO dates (optionally with a time), `dd/mm/yyyy`, `mm/dd/yyyy`
/// and Excel serial day numbers.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }

    raw.parse::<f64>().ok().and_then(excel_serial_date)
}

/// Convert an Excel serial day number (1900 date system)
pub(crate) fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let day = serial.floor() as i64;
    // Serial 60 is Excel's phantom 1900-02-29; later serials are shifted by it
    let epoch = match day {
        60 => return None,
        d if d < 60 => NaiveDate::from_ymd_opt(1899, 12, 31)?,
        _ => NaiveDate::from_ymd_opt(1899, 12, 30)?,
    };
    epoch.checked_add_signed(Duration::days(day))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(observation: &str) -> ObservationRow {
        ObservationRow {
            row: 2,
            date: NaiveDate::from_ymd_opt(2024, 6, 15),
            location: Some(" workshop ".to_string()),
            observation: observation.to_string(),
            category: Some("ppe".to_string()),
            label: None,
        }
    }

    #[test]
    fn test_encode_text_is_length_stable() {
        assert_eq!(encode_text("", 30).len(), 30);
        assert_eq!(encode_text("short", 30).len(), 30);
        assert_eq!(encode_text(&"x".repeat(100), 30).len(), 30);
        assert_eq!(encode_text("AB", 4), vec![65.0, 66.0, 0.0, 0.0]);
    }

    #[test]
    fn test_encode_row_layout() {
        let vocab = FeatureVocabulary::default();
        let features = vocab.encode_row(&row("A"));
        assert_eq!(features.len(), vocab.feature_width());
        assert_eq!(vocab.feature_width(), 3 + 5 + 30 + 5);

        assert!((features[0] - 0.24).abs() < 1e-6);
        assert!((features[1] - 0.5).abs() < 1e-6);
        assert!((features[2] - 15.0 / 31.0).abs() < 1e-6);

        // PPE is the first category
        assert_eq!(&features[3..8], &[1.0, 0.0, 0.0, 0.0, 0.0]);
        assert!((features[8] - 65.0 / 255.0).abs() < 1e-6);
        assert_eq!(features[9], 0.0);
        // WORKSHOP is the second location
        assert_eq!(&features[38..43], &[0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unknown_values_encode_as_zeros() {
        let vocab = FeatureVocabulary::default();
        let mut observation = row("é€");
        observation.date = None;
        observation.category = Some("Chemical".to_string());
        observation.location = None;

        let features = vocab.encode_row(&observation);
        assert_eq!(features.len(), vocab.feature_width());
        assert!(features[..8].iter().all(|v| *v == 0.0));
        // Codes above 255 clamp to 1
        assert_eq!(features[9], 1.0);
        assert!(features[38..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5);
        assert_eq!(parse_date("2024-03-05"), expected);
        assert_eq!(parse_date("05/03/2024"), expected);
        assert_eq!(parse_date("2024-03-05 08:30:00"), expected);
        assert_eq!(parse_date("45356"), expected);
        assert_eq!(parse_date("25/12/2023"), NaiveDate::from_ymd_opt(2023, 12, 25));
        assert_eq!(parse_date("12/25/2023"), NaiveDate::from_ymd_opt(2023, 12, 25));
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_excel_serials_around_leap_bug() {
        assert_eq!(excel_serial_date(1.0), NaiveDate::from_ymd_opt(1900, 1, 1));
        assert_eq!(excel_serial_date(59.0), NaiveDate::from_ymd_opt(1900, 2, 28));
        assert_eq!(excel_serial_date(60.0), None);
        assert_eq!(excel_serial_date(61.0), NaiveDate::from_ymd_opt(1900, 3, 1));
        assert_eq!(excel_serial_date(45356.75), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(excel_serial_date(0.0), None);
    }

    #[test]
    fn test_load_custom_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        std::fs::write(
            &path,
            r#"{"version": 2, "categories": ["PPE", "Fire"], "locations": ["Site"]}"#,
        )
        .unwrap();

        let vocab = FeatureVocabulary::load(Some(&path)).unwrap();
        assert_eq!(vocab.version, 2);
        assert_eq!(vocab.max_text_len, 30);
        assert_eq!(vocab.feature_width(), 3 + 2 + 30 + 1);
        assert_eq!(vocab.category_index("fire"), Some(1));
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        std::fs::write(
            &path,
            r#"{"version": 2, "categories": ["PPE", "ppe"], "locations": []}"#,
        )
        .unwrap();
        assert!(FeatureVocabulary::load(Some(&path)).is_err());
    }
}
