//! Dense feed-forward classifier
//!
//! A small multi-layer perceptron with a sigmoid output unit. The topology is
//! stored as JSON and the parameters as a flat little-endian `f32` blob: for
//! each layer the kernel (`input x units`, row-major) followed by the bias.

use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use qhse_common::{QhseError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::traits::Classifier;

pub const TOPOLOGY_FORMAT: &str = "qhse-dense";
pub const TOPOLOGY_FORMAT_VERSION: u32 = 1;

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-7;
const PROBABILITY_EPSILON: f32 = 1e-7;

/// Layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
    Linear,
}

impl Activation {
    fn apply(self, values: &mut Array2<f32>) {
        match self {
            Self::Relu => values.mapv_inplace(|v| v.max(0.0)),
            Self::Sigmoid => values.mapv_inplace(sigmoid),
            Self::Linear => {}
        }
    }

    /// Derivative expressed through the activation output
    fn derivative_from_output(self, output: f32) -> f32 {
        match self {
            Self::Relu => {
                if output > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Sigmoid => output * (1.0 - output),
            Self::Linear => 1.0,
        }
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// One dense layer of the topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub units: usize,
    pub activation: Activation,
}

/// Network topology persisted next to the weight blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTopology {
    pub format: String,
    pub format_version: u32,
    pub input_dim: usize,
    /// Version of the feature vocabulary the inputs were encoded with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_vocabulary_version: Option<u32>,
    pub layers: Vec<LayerSpec>,
}

impl ModelTopology {
    pub fn new(input_dim: usize, layers: Vec<LayerSpec>) -> Self {
        Self {
            format: TOPOLOGY_FORMAT.to_string(),
            format_version: TOPOLOGY_FORMAT_VERSION,
            input_dim,
            feature_vocabulary_version: None,
            layers,
        }
    }

    /// 128 -> 64 -> 1 network used for safety observations
    pub fn observation_classifier(input_dim: usize, feature_vocabulary_version: u32) -> Self {
        let mut topology = Self::new(
            input_dim,
            vec![
                LayerSpec {
                    units: 128,
                    activation: Activation::Relu,
                },
                LayerSpec {
                    units: 64,
                    activation: Activation::Relu,
                },
                LayerSpec {
                    units: 1,
                    activation: Activation::Sigmoid,
                },
            ],
        );
        topology.feature_vocabulary_version = Some(feature_vocabulary_version);
        topology
    }

    /// `(fan_in, units)` per layer
    fn layer_shapes(&self) -> Vec<(usize, usize)> {
        let mut fan_in = self.input_dim;
        self.layers
            .iter()
            .map(|layer| {
                let shape = (fan_in, layer.units);
                fan_in = layer.units;
                shape
            })
            .collect()
    }

    /// Total number of `f32` parameters, rejecting sizes that overflow
    pub fn parameter_count(&self) -> Result<usize> {
        self.layer_shapes()
            .iter()
            .try_fold(0usize, |total, (fan_in, units)| {
                fan_in
                    .checked_mul(*units)
                    .and_then(|kernel| kernel.checked_add(*units))
                    .and_then(|layer| total.checked_add(layer))
            })
            .ok_or_else(|| QhseError::classifier("Topology has too many parameters"))
    }

    /// Size of the weight blob in bytes
    pub fn weight_byte_len(&self) -> Result<usize> {
        self.parameter_count()?
            .checked_mul(4)
            .ok_or_else(|| QhseError::classifier("Topology has too many parameters"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.format != TOPOLOGY_FORMAT {
            return Err(QhseError::classifier(format!(
                "Unsupported topology format '{}'",
                self.format
            )));
        }
        if self.format_version != TOPOLOGY_FORMAT_VERSION {
            return Err(QhseError::classifier(format!(
                "Unsupported topology version {}",
                self.format_version
            )));
        }
        if self.input_dim == 0 {
            return Err(QhseError::classifier("Input dimension must be positive"));
        }
        if self.layers.iter().any(|layer| layer.units == 0) {
            return Err(QhseError::classifier("Every layer needs at least one unit"));
        }
        self.weight_byte_len()?;
        match self.layers.last() {
            Some(LayerSpec {
                units: 1,
                activation: Activation::Sigmoid,
            }) => Ok(()),
            _ => Err(QhseError::classifier(
                "The output layer must be a single sigmoid unit",
            )),
        }
    }
}

#[derive(Debug, Clone)]
struct DenseLayer {
    kernel: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

type LayerGradient = (Array2<f32>, Array1<f32>);

/// Options for [`DenseNetwork::train`]
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub seed: u64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}

/// Per-epoch loss and accuracy over the whole training set
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub epochs: usize,
    pub samples: usize,
    pub loss: Vec<f32>,
    pub accuracy: Vec<f32>,
}

impl TrainingReport {
    pub fn final_accuracy(&self) -> Option<f32> {
        self.accuracy.last().copied()
    }

    pub fn final_loss(&self) -> Option<f32> {
        self.loss.last().copied()
    }
}

/// Dense feed-forward network with a sigmoid output
#[derive(Debug, Clone)]
pub struct DenseNetwork {
    topology: ModelTopology,
    layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    /// Create a network with He-uniform initialized kernels and zero biases
    pub fn new_random(topology: ModelTopology, seed: u64) -> Result<Self> {
        topology.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);

        let layers = topology
            .layer_shapes()
            .into_iter()
            .zip(&topology.layers)
            .map(|((fan_in, units), spec)| {
                let limit = (6.0 / fan_in as f32).sqrt();
                DenseLayer {
                    kernel: Array2::from_shape_fn((fan_in, units), |_| {
                        rng.gen_range(-limit..limit)
                    }),
                    bias: Array1::zeros(units),
                    activation: spec.activation,
                }
            })
            .collect();

        Ok(Self { topology, layers })
    }

    /// Rebuild a network from its topology and weight blob
    pub fn from_parts(topology: ModelTopology, weights: &[u8]) -> Result<Self> {
        topology.validate()?;

        let expected = topology.weight_byte_len()?;
        if weights.len() != expected {
            return Err(QhseError::classifier(format!(
                "Weight blob has {} bytes, topology needs {}",
                weights.len(),
                expected
            )));
        }

        let values: Vec<f32> = weights
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(QhseError::classifier("Weight blob contains non-finite values"));
        }

        let mut offset = 0;
        let mut layers = Vec::with_capacity(topology.layers.len());
        for ((fan_in, units), spec) in topology.layer_shapes().into_iter().zip(&topology.layers) {
            let kernel_len = fan_in * units;
            let kernel =
                Array2::from_shape_vec((fan_in, units), values[offset..offset + kernel_len].to_vec())
                    .map_err(|e| QhseError::classifier(format!("Bad kernel shape: {}", e)))?;
            offset += kernel_len;
            let bias = Array1::from(values[offset..offset + units].to_vec());
            offset += units;

            layers.push(DenseLayer {
                kernel,
                bias,
                activation: spec.activation,
            });
        }

        Ok(Self { topology, layers })
    }

    /// Serialize all parameters in topology order
    pub fn to_weight_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.topology.weight_byte_len().unwrap_or_default());
        for layer in &self.layers {
            for value in layer.kernel.iter().chain(layer.bias.iter()) {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        bytes
    }

    pub fn topology(&self) -> &ModelTopology {
        &self.topology
    }

    /// Load topology JSON and weight blob from disk
    pub fn load(topology_path: &Path, weights_path: &Path) -> Result<Self> {
        let topology: ModelTopology =
            serde_json::from_str(&std::fs::read_to_string(topology_path)?)?;
        let weights = std::fs::read(weights_path)?;
        let network = Self::from_parts(topology, &weights)?;

        info!(
            "Classifier loaded: {} inputs, {} parameters",
            network.topology.input_dim,
            network.topology.parameter_count()?
        );
        Ok(network)
    }

    /// Persist topology JSON and weight blob, creating parent directories
    pub fn save(&self, topology_path: &Path, weights_path: &Path) -> Result<()> {
        for path in [topology_path, weights_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(topology_path, serde_json::to_string_pretty(&self.topology)?)?;
        std::fs::write(weights_path, self.to_weight_bytes())?;

        info!("Classifier saved to {}", topology_path.display());
        Ok(())
    }

    /// Forward pass returning the activation of every layer, input first
    fn forward(&self, inputs: ArrayView2<f32>) -> Vec<Array2<f32>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(inputs.to_owned());

        for layer in &self.layers {
            let mut z = activations[activations.len() - 1].dot(&layer.kernel) + &layer.bias;
            layer.activation.apply(&mut z);
            activations.push(z);
        }

        activations
    }

    /// Output probabilities, one row per input row
    pub fn predict(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        self.forward(inputs).pop().unwrap_or_else(|| Array2::zeros((0, 1)))
    }

    /// Gradients of binary cross-entropy for each layer, in layer order
    fn backward(&self, activations: &[Array2<f32>], targets: &Array2<f32>) -> Vec<LayerGradient> {
        let batch = targets.nrows() as f32;
        let output = &activations[activations.len() - 1];
        // Sigmoid output with cross-entropy collapses to (p - y)
        let mut delta = (output - targets) / batch;
        let mut gradients = Vec::with_capacity(self.layers.len());

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let input = &activations[i];
            gradients.push((input.t().dot(&delta), delta.sum_axis(Axis(0))));

            if i > 0 {
                let previous = self.layers[i - 1].activation;
                let mut next = delta.dot(&layer.kernel.t());
                next.zip_mut_with(input, |d, &a| *d *= previous.derivative_from_output(a));
                delta = next;
            }
        }

        gradients.reverse();
        gradients
    }

    /// Train with mini-batch Adam on binary labels
    pub fn train(
        &mut self,
        features: &[Vec<f32>],
        labels: &[f32],
        options: &TrainingOptions,
    ) -> Result<TrainingReport> {
        let samples = features.len();
        let input_dim = self.topology.input_dim;

        if samples == 0 {
            return Err(QhseError::invalid_input("Training set is empty"));
        }
        if labels.len() != samples {
            return Err(QhseError::invalid_input(format!(
                "{} feature rows but {} labels",
                samples,
                labels.len()
            )));
        }
        if let Some(row) = features.iter().position(|row| row.len() != input_dim) {
            return Err(QhseError::invalid_input(format!(
                "Row {} has {} features, expected {}",
                row,
                features[row].len(),
                input_dim
            )));
        }
        if labels.iter().any(|y| !(0.0..=1.0).contains(y)) {
            return Err(QhseError::invalid_input("Labels must lie in [0, 1]"));
        }
        if options.epochs == 0 || options.batch_size == 0 {
            return Err(QhseError::invalid_input("Epochs and batch size must be positive"));
        }

        let x = Array2::from_shape_vec(
            (samples, input_dim),
            features.iter().flatten().copied().collect(),
        )
        .map_err(|e| QhseError::internal(format!("Bad training matrix: {}", e)))?;
        let y = Array2::from_shape_vec((samples, 1), labels.to_vec())
            .map_err(|e| QhseError::internal(format!("Bad label matrix: {}", e)))?;

        let mut optimizer = AdamState::new(&self.layers);
        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut order: Vec<usize> = (0..samples).collect();
        let mut report = TrainingReport {
            epochs: options.epochs,
            samples,
            loss: Vec::with_capacity(options.epochs),
            accuracy: Vec::with_capacity(options.epochs),
        };

        for epoch in 1..=options.epochs {
            order.shuffle(&mut rng);

            for batch in order.chunks(options.batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb = y.select(Axis(0), batch);
                let activations = self.forward(xb.view());
                let gradients = self.backward(&activations, &yb);
                optimizer.step(&mut self.layers, &gradients, options.learning_rate);
            }

            let predictions = self.predict(x.view());
            let loss = binary_cross_entropy(&predictions, &y);
            let accuracy = binary_accuracy(&predictions, &y);
            debug!("Epoch {}/{}: loss={:.4}, accuracy={:.4}", epoch, options.epochs, loss, accuracy);
            report.loss.push(loss);
            report.accuracy.push(accuracy);
        }

        info!(
            "Training finished: {} samples, {} epochs, final accuracy {:.3}",
            samples,
            options.epochs,
            report.final_accuracy().unwrap_or_default()
        );
        Ok(report)
    }
}

impl Classifier for DenseNetwork {
    fn input_dim(&self) -> usize {
        self.topology.input_dim
    }

    fn classify(&self, features: &[f32]) -> Result<f32> {
        if features.len() != self.topology.input_dim {
            return Err(QhseError::invalid_input(format!(
                "Feature vector has {} values, classifier expects {}",
                features.len(),
                self.topology.input_dim
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(QhseError::invalid_input("Feature vector contains non-finite values"));
        }

        let row = ArrayView2::from_shape((1, features.len()), features)
            .map_err(|e| QhseError::internal(format!("Bad feature shape: {}", e)))?;
        Ok(self.predict(row)[[0, 0]])
    }
}

/// First and second moment estimates for every parameter
struct AdamState {
    first: Vec<LayerGradient>,
    second: Vec<LayerGradient>,
    step: i32,
}

impl AdamState {
    fn new(layers: &[DenseLayer]) -> Self {
        let zeros = || -> Vec<LayerGradient> {
            layers
                .iter()
                .map(|l| (Array2::zeros(l.kernel.raw_dim()), Array1::zeros(l.bias.len())))
                .collect()
        };
        Self {
            first: zeros(),
            second: zeros(),
            step: 0,
        }
    }

    fn step(&mut self, layers: &mut [DenseLayer], gradients: &[LayerGradient], learning_rate: f32) {
        self.step += 1;
        let correction = (1.0 - ADAM_BETA2.powi(self.step)).sqrt() / (1.0 - ADAM_BETA1.powi(self.step));
        let rate = learning_rate * correction;

        for (i, layer) in layers.iter_mut().enumerate() {
            let (grad_kernel, grad_bias) = &gradients[i];
            let (m_kernel, m_bias) = &mut self.first[i];
            let (v_kernel, v_bias) = &mut self.second[i];

            Zip::from(&mut layer.kernel)
                .and(m_kernel)
                .and(v_kernel)
                .and(grad_kernel)
                .for_each(|w, m, v, &g| adam_update(w, m, v, g, rate));
            Zip::from(&mut layer.bias)
                .and(m_bias)
                .and(v_bias)
                .and(grad_bias)
                .for_each(|w, m, v, &g| adam_update(w, m, v, g, rate));
        }
    }
}

fn adam_update(weight: &mut f32, first: &mut f32, second: &mut f32, gradient: f32, rate: f32) {
    *first = ADAM_BETA1 * *first + (1.0 - ADAM_BETA1) * gradient;
    *second = ADAM_BETA2 * *second + (1.0 - ADAM_BETA2) * gradient * gradient;
    *weight -= rate * *first / (second.sqrt() + ADAM_EPSILON);
}

fn binary_cross_entropy(predictions: &Array2<f32>, targets: &Array2<f32>) -> f32 {
    let n = targets.len().max(1) as f32;
    let total: f32 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(&p, &y)| {
            let p = p.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / n
}

fn binary_accuracy(predictions: &Array2<f32>, targets: &Array2<f32>) -> f32 {
    let n = targets.len().max(1) as f32;
    let correct = predictions
        .iter()
        .zip(targets.iter())
        .filter(|(p, y)| (**p >= 0.5) == (**y >= 0.5))
        .count();
    correct as f32 / n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_topology() -> ModelTopology {
        ModelTopology::new(
            2,
            vec![
                LayerSpec {
                    units: 3,
                    activation: Activation::Relu,
                },
                LayerSpec {
                    units: 1,
                    activation: Activation::Sigmoid,
                },
            ],
        )
    }

    #[test]
    fn test_parameter_count() {
        // (2*3 + 3) + (3*1 + 1)
        assert_eq!(small_topology().parameter_count().unwrap(), 13);
        let observation = ModelTopology::observation_classifier(43, 1);
        assert_eq!(
            observation.parameter_count().unwrap(),
            43 * 128 + 128 + 128 * 64 + 64 + 64 + 1
        );
    }

    #[test]
    fn test_oversized_topology_rejected() {
        let topology: ModelTopology = serde_json::from_str(
            r#"{"format":"qhse-dense","format_version":1,"input_dim":4611686018427387904,
                "layers":[{"units":1,"activation":"sigmoid"}]}"#,
        )
        .unwrap();
        assert!(topology.parameter_count().is_ok());
        assert!(topology.weight_byte_len().is_err());
        assert!(topology.validate().is_err());

        let err = DenseNetwork::from_parts(topology, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, QhseError::Classifier(_)));

        let topology = ModelTopology::new(
            usize::MAX,
            vec![LayerSpec {
                units: 2,
                activation: Activation::Sigmoid,
            }],
        );
        assert!(topology.parameter_count().is_err());
    }

    #[test]
    fn test_validate_requires_sigmoid_output() {
        let mut topology = small_topology();
        topology.layers[1].activation = Activation::Linear;
        assert!(topology.validate().is_err());

        let mut topology = small_topology();
        topology.format = "tfjs-layers".to_string();
        assert!(topology.validate().is_err());
    }

    #[test]
    fn test_from_parts_rejects_wrong_length() {
        let err = DenseNetwork::from_parts(small_topology(), &[0u8; 12]).unwrap_err();
        assert!(err.to_string().contains("52"));
    }

    #[test]
    fn test_from_parts_known_weights() {
        // Identity-ish hidden layer, output = sigmoid(h0 - h1)
        let kernel1 = [1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0];
        let bias1 = [0.0f32; 3];
        let kernel2 = [1.0f32, -1.0, 0.0];
        let bias2 = [0.0f32];
        let bytes: Vec<u8> = kernel1
            .iter()
            .chain(&bias1)
            .chain(&kernel2)
            .chain(&bias2)
            .flat_map(|v| v.to_le_bytes())
            .collect();

        let network = DenseNetwork::from_parts(small_topology(), &bytes).unwrap();
        assert_eq!(network.to_weight_bytes(), bytes);
        assert!((network.classify(&[0.0, 0.0]).unwrap() - 0.5).abs() < 1e-6);
        assert!(network.classify(&[3.0, 0.0]).unwrap() > 0.9);
        assert!(network.classify(&[0.0, 3.0]).unwrap() < 0.1);
    }

    #[test]
    fn test_classify_checks_width() {
        let network = DenseNetwork::new_random(small_topology(), 7).unwrap();
        assert!(network.classify(&[1.0]).is_err());
        assert!(network.classify(&[1.0, f32::NAN]).is_err());
        let score = network.classify(&[0.2, 0.4]).unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_save_and_load_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let topology_path = dir.path().join("model").join("model.json");
        let weights_path = dir.path().join("model").join("weights.bin");

        let network = DenseNetwork::new_random(ModelTopology::observation_classifier(8, 1), 3).unwrap();
        network.save(&topology_path, &weights_path).unwrap();
        let loaded = DenseNetwork::load(&topology_path, &weights_path).unwrap();

        let row = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
        assert_eq!(loaded.topology().feature_vocabulary_version, Some(1));
        assert_eq!(network.classify(&row).unwrap(), loaded.classify(&row).unwrap());
    }

    #[test]
    fn test_training_learns_threshold() {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..200 {
            let x0 = (i % 20) as f32 / 19.0;
            let x1 = (i / 20) as f32 / 9.0;
            features.push(vec![x0, x1]);
            labels.push(if x0 > 0.5 { 1.0 } else { 0.0 });
        }

        let topology = ModelTopology::new(
            2,
            vec![
                LayerSpec {
                    units: 16,
                    activation: Activation::Relu,
                },
                LayerSpec {
                    units: 1,
                    activation: Activation::Sigmoid,
                },
            ],
        );
        let mut network = DenseNetwork::new_random(topology, 11).unwrap();
        let options = TrainingOptions {
            epochs: 150,
            batch_size: 16,
            learning_rate: 0.01,
            seed: 5,
        };
        let report = network.train(&features, &labels, &options).unwrap();

        assert_eq!(report.loss.len(), 150);
        assert!(report.final_loss().unwrap() < report.loss[0]);
        assert!(report.final_accuracy().unwrap() >= 0.9);
    }

    #[test]
    fn test_training_rejects_mismatched_rows() {
        let mut network = DenseNetwork::new_random(small_topology(), 1).unwrap();
        let result = network.train(&[vec![0.0, 1.0], vec![1.0]], &[0.0, 1.0], &TrainingOptions::default());
        assert!(result.is_err());
        let result = network.train(&[vec![0.0, 1.0]], &[2.0], &TrainingOptions::default());
        assert!(result.is_err());
    }
}
