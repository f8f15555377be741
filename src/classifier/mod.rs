//! Motion classifier.
//!
//! The [`Classifier`] owns a single long-lived inference context. Model
//! contexts keep their input and output tensors between calls, so every
//! `set_input -> invoke -> output` sequence runs under one lock. Argmax and
//! label lookup happen after the lock is released.

pub mod dense;
pub mod export;

pub use dense::{DenseModel, ModelLoadError};
pub use export::to_c_array;

use crate::core::features::FeatureVector;
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised while running the model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("input shape mismatch: model expects {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("model invocation failed: {0}")]
    Invocation(String),
    #[error("model produced no usable output")]
    EmptyOutput,
    #[error("model output index {0} has no label")]
    UnknownClass(usize),
    #[error("inference context poisoned by an earlier panic")]
    Poisoned,
}

/// A stateful inference engine (interpreter-style).
///
/// Implementations hold their tensors internally; callers must not
/// interleave calls from different requests.
pub trait InferenceModel: Send {
    /// Number of input values per sample.
    fn input_len(&self) -> usize;

    /// Class names in output order.
    fn labels(&self) -> &[String];

    /// Copy a sample into the input tensor.
    fn set_input(&mut self, input: &[f32]) -> Result<(), InferenceError>;

    /// Run the model on the current input tensor.
    fn invoke(&mut self) -> Result<(), InferenceError>;

    /// Read the output tensor.
    fn output(&self) -> Result<Vec<f32>, InferenceError>;
}

/// Thread-safe adapter mapping feature vectors to labels.
pub struct Classifier {
    context: Mutex<Box<dyn InferenceModel>>,
    labels: Vec<String>,
}

impl Classifier {
    /// Take ownership of an inference context.
    pub fn new(model: Box<dyn InferenceModel>) -> Self {
        let labels = model.labels().to_vec();
        Self {
            context: Mutex::new(model),
            labels,
        }
    }

    /// Class names in model output order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Run one sample and return the raw output tensor.
    pub fn scores(&self, features: &FeatureVector) -> Result<Vec<f32>, InferenceError> {
        let input = features.to_f32();
        let mut context = self.context.lock().map_err(|_| InferenceError::Poisoned)?;
        context.set_input(&input)?;
        context.invoke()?;
        context.output()
    }

    /// Classify a feature vector.
    pub fn classify(&self, features: &FeatureVector) -> Result<String, InferenceError> {
        let scores = self.scores(features)?;
        let index = argmax(&scores).ok_or(InferenceError::EmptyOutput)?;
        let label = self
            .labels
            .get(index)
            .cloned()
            .ok_or(InferenceError::UnknownClass(index))?;

        tracing::debug!(label = %label, index, "classified reading");
        Ok(label)
    }
}

/// Index of the largest score; the first one wins ties. `None` when empty
/// or when any score is NaN.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    if scores.iter().any(|s| s.is_nan()) {
        return None;
    }

    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}
