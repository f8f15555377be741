//! Dense feed-forward network loaded from a JSON model file.
//!
//! ```json
//! {
//!   "labels": ["normal", "abnormal"],
//!   "layers": [
//!     { "weights": [[...7 values...], ...], "bias": [...], "activation": "relu" },
//!     { "weights": [[...], [...]], "bias": [0.0, 0.0], "activation": "softmax" }
//!   ]
//! }
//! ```
//!
//! Each layer's `weights` has one row per output unit.

use super::{InferenceError, InferenceModel};
use crate::core::features::FEATURE_COUNT;
use crate::core::Label;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a model file.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid model: {0}")]
    Invalid(String),
}

/// Layer activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Softmax,
}

/// A fully connected layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    fn inputs(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }

    fn outputs(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut out: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();

        match self.activation {
            Activation::Linear => {}
            Activation::Relu => out.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Softmax => softmax(&mut out),
        }
        out
    }
}

fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}

fn default_labels() -> Vec<String> {
    vec![
        Label::Normal.as_str().to_string(),
        Label::Abnormal.as_str().to_string(),
    ]
}

/// Serialized model definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    pub layers: Vec<DenseLayer>,
}

/// Interpreter-style context around a [`ModelSpec`].
#[derive(Debug, Clone)]
pub struct DenseModel {
    spec: ModelSpec,
    input: Vec<f32>,
    output: Vec<f32>,
}

impl DenseModel {
    /// Validate a model definition.
    pub fn new(spec: ModelSpec) -> Result<Self, ModelLoadError> {
        let first = spec
            .layers
            .first()
            .ok_or_else(|| ModelLoadError::Invalid("model has no layers".into()))?;
        if first.inputs() != FEATURE_COUNT {
            return Err(ModelLoadError::Invalid(format!(
                "first layer takes {} inputs, expected {FEATURE_COUNT}",
                first.inputs()
            )));
        }

        let mut width = FEATURE_COUNT;
        for (i, layer) in spec.layers.iter().enumerate() {
            if layer.outputs() == 0 || layer.weights.iter().any(|row| row.len() != width) {
                return Err(ModelLoadError::Invalid(format!(
                    "layer {i} weights do not match input width {width}"
                )));
            }
            if layer.bias.len() != layer.outputs() {
                return Err(ModelLoadError::Invalid(format!(
                    "layer {i} has {} biases for {} units",
                    layer.bias.len(),
                    layer.outputs()
                )));
            }
            width = layer.outputs();
        }

        if width != spec.labels.len() {
            return Err(ModelLoadError::Invalid(format!(
                "model has {width} outputs but {} labels",
                spec.labels.len()
            )));
        }

        Ok(Self {
            spec,
            input: Vec::new(),
            output: Vec::new(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ModelLoadError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl InferenceModel for DenseModel {
    fn input_len(&self) -> usize {
        FEATURE_COUNT
    }

    fn labels(&self) -> &[String] {
        &self.spec.labels
    }

    fn set_input(&mut self, input: &[f32]) -> Result<(), InferenceError> {
        if input.len() != FEATURE_COUNT {
            return Err(InferenceError::ShapeMismatch {
                expected: FEATURE_COUNT,
                actual: input.len(),
            });
        }
        self.input.clear();
        self.input.extend_from_slice(input);
        Ok(())
    }

    fn invoke(&mut self) -> Result<(), InferenceError> {
        if self.input.is_empty() {
            return Err(InferenceError::Invocation("input tensor not set".into()));
        }

        let mut activations = self.input.clone();
        for layer in &self.spec.layers {
            activations = layer.forward(&activations);
        }
        if activations.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::Invocation("non-finite model output".into()));
        }

        self.output = activations;
        Ok(())
    }

    fn output(&self) -> Result<Vec<f32>, InferenceError> {
        if self.output.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        Ok(self.output.clone())
    }
}
