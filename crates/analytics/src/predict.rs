use qhse_common::{QhseError, Result};
use qhse_model::{Classifier, ModelTopology};
use serde::Serialize;
use tracing::{info, warn};

use crate::encoding::FeatureVocabulary;
use crate::spreadsheet::ObservationRow;

pub const UNSAFE_ACT: &str = "Unsafe Act";
pub const UNSAFE_CONDITION: &str = "Unsafe Condition";

/// Scores at or above this are predicted as unsafe acts
const DECISION_THRESHOLD: f32 = 0.5;
const UNCATEGORIZED: &str = "Uncategorized";

/// Prediction for one observation row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub row: usize,
    pub date: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub observation: String,
    /// Classifier output in `[0, 1]`
    pub score: f32,
    /// `"Unsafe Act"` or `"Unsafe Condition"`
    pub prediction: String,
}

/// Per-category counts ready for a grouped bar chart
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub labels: Vec<String>,
    pub unsafe_acts: Vec<usize>,
    pub unsafe_conditions: Vec<usize>,
}

impl ChartData {
    /// Group predictions by category, in order of first appearance
    pub fn from_predictions(predictions: &[Prediction]) -> Self {
        let mut chart = Self::default();
        for prediction in predictions {
            let label = prediction.category.as_deref().unwrap_or(UNCATEGORIZED);
            let slot = match chart.labels.iter().position(|l| l == label) {
                Some(slot) => slot,
                None => {
                    chart.labels.push(label.to_string());
                    chart.unsafe_acts.push(0);
                    chart.unsafe_conditions.push(0);
                    chart.labels.len() - 1
                }
            };

            if prediction.prediction == UNSAFE_ACT {
                chart.unsafe_acts[slot] += 1;
            } else {
                chart.unsafe_conditions[slot] += 1;
            }
        }
        chart
    }
}

/// Response body of the prediction endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionReport {
    pub predictions: Vec<Prediction>,
    pub chart_data: ChartData,
}

/// Encoded features and labels for training
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub features: Vec<Vec<f32>>,
    pub labels: Vec<f32>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of rows labelled as unsafe acts
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|y| **y >= DECISION_THRESHOLD).count()
    }
}

/// Check a saved model can consume features from `vocabulary`
///
/// Models uploaded without a recorded vocabulary version are accepted when
/// their input width matches.
pub fn check_model_compatibility(topology: &ModelTopology, vocabulary: &FeatureVocabulary) -> Result<()> {
    if topology.input_dim != vocabulary.feature_width() {
        return Err(QhseError::classifier(format!(
            "Model expects {} features but feature vocabulary v{} produces {}",
            topology.input_dim,
            vocabulary.version,
            vocabulary.feature_width()
        )));
    }

    match topology.feature_vocabulary_version {
        Some(version) if version != vocabulary.version => Err(QhseError::classifier(format!(
            "Model was trained with feature vocabulary v{}, server uses v{}",
            version, vocabulary.version
        ))),
        Some(_) => Ok(()),
        None => {
            warn!("Model does not record a feature vocabulary version");
            Ok(())
        }
    }
}

/// Classify every row and aggregate the chart
pub fn predict_observations(
    classifier: &dyn Classifier,
    vocabulary: &FeatureVocabulary,
    rows: &[ObservationRow],
) -> Result<PredictionReport> {
    if classifier.input_dim() != vocabulary.feature_width() {
        return Err(QhseError::classifier(format!(
            "Classifier expects {} features, vocabulary produces {}",
            classifier.input_dim(),
            vocabulary.feature_width()
        )));
    }

    let features: Vec<Vec<f32>> = rows.iter().map(|row| vocabulary.encode_row(row)).collect();
    let scores = classifier.classify_batch(&features)?;

    let predictions: Vec<Prediction> = rows
        .iter()
        .zip(scores)
        .map(|(row, score)| Prediction {
            row: row.row,
            date: row.date.map(|d| d.format("%Y-%m-%d").to_string()),
            location: row.location.clone(),
            category: row.category.clone(),
            observation: row.observation.clone(),
            score,
            prediction: if score >= DECISION_THRESHOLD {
                UNSAFE_ACT
            } else {
                UNSAFE_CONDITION
            }
            .to_string(),
        })
        .collect();

    let chart_data = ChartData::from_predictions(&predictions);
    info!(
        "Predicted {} rows: {} unsafe acts",
        predictions.len(),
        chart_data.unsafe_acts.iter().sum::<usize>()
    );

    Ok(PredictionReport {
        predictions,
        chart_data,
    })
}

/// Encode labelled rows; rows without a label are skipped
pub fn build_training_set(vocabulary: &FeatureVocabulary, rows: &[ObservationRow]) -> Result<TrainingSet> {
    let mut set = TrainingSet::default();
    for row in rows {
        if let Some(label) = row.label_value() {
            set.features.push(vocabulary.encode_row(row));
            set.labels.push(label);
        }
    }

    if set.is_empty() {
        return Err(QhseError::invalid_input(
            "No labelled rows. Fill the 'Unsafe Act / Unsafe Condition' column",
        ));
    }

    info!(
        "Training set: {} rows ({} unsafe acts), {} skipped without label",
        set.len(),
        set.positives(),
        rows.len() - set.len()
    );
    Ok(set)
}
