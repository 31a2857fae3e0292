//! QHSE predictive analytics
//!
//! Safety observation spreadsheets, feature encoding and unsafe act /
//! unsafe condition predictions

pub mod encoding;
pub mod predict;
pub mod spreadsheet;

// Re-export main types
pub use encoding::{encode_text, parse_date, FeatureVocabulary, FEATURE_VOCABULARY_VERSION};
pub use predict::{
    build_training_set, check_model_compatibility, predict_observations, ChartData, Prediction,
    PredictionReport, TrainingSet, UNSAFE_ACT, UNSAFE_CONDITION,
};
pub use spreadsheet::{parse_label, read_observations, ObservationRow, SpreadsheetFormat};
