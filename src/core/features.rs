//! Feature vector construction from loosely-typed request bodies.
//!
//! The classifier consumes a fixed 7-element vector in the order
//! `[x, y, z, gx, gy, gz, knee_angle]`. Bodies arrive as arbitrary JSON, so
//! every field is checked explicitly and a missing key is reported by name.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Number of model inputs.
pub const FEATURE_COUNT: usize = 7;

/// Required keys, in vector order.
pub const REQUIRED_FIELDS: [&str; 6] = ["x", "y", "z", "gx", "gy", "gz"];

/// Optional trailing key; defaults to zero.
pub const KNEE_ANGLE_FIELD: &str = "knee_angle";

/// Validation failures while building a feature vector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' must be a number")]
    InvalidField(&'static str),
    #[error("request body must be a JSON object")]
    NotAnObject,
}

/// Ordered classifier input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        self.0
    }

    /// Single-precision copy for model input tensors.
    pub fn to_f32(&self) -> [f32; FEATURE_COUNT] {
        self.0.map(|v| v as f32)
    }
}

/// Build a feature vector from a JSON request body.
///
/// Fails on the first absent required key (`null` counts as absent).
pub fn build_features(raw: &Value) -> Result<FeatureVector, FeatureError> {
    let body = raw.as_object().ok_or(FeatureError::NotAnObject)?;

    let mut values = [0.0; FEATURE_COUNT];
    for (slot, field) in values.iter_mut().zip(REQUIRED_FIELDS) {
        *slot = match body.get(field) {
            None | Some(Value::Null) => return Err(FeatureError::MissingField(field)),
            Some(v) => v.as_f64().ok_or(FeatureError::InvalidField(field))?,
        };
    }

    values[FEATURE_COUNT - 1] = match body.get(KNEE_ANGLE_FIELD) {
        None | Some(Value::Null) => 0.0,
        Some(v) => v
            .as_f64()
            .ok_or(FeatureError::InvalidField(KNEE_ANGLE_FIELD))?,
    };

    Ok(FeatureVector(values))
}
