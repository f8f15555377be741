//! Sensor reading types shared across the pipeline.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::features::FeatureVector;

/// Classifier output label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Normal,
    Abnormal,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Normal => "normal",
            Label::Abnormal => "abnormal",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true when a stored prediction counts as abnormal motion.
///
/// Anything that is not "normal" (ignoring case) is abnormal, including
/// class names a future model may introduce.
pub fn is_abnormal(prediction: &str) -> bool {
    !prediction.eq_ignore_ascii_case(Label::Normal.as_str())
}

/// A single classified motion sample belonging to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub user_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    pub knee_angle: f64,
    pub timestamp: DateTime<Utc>,
    pub prediction: String,
}

impl Reading {
    /// Assemble a reading from a validated feature vector and its label.
    pub fn new(
        user_id: impl Into<String>,
        features: &FeatureVector,
        timestamp: DateTime<Utc>,
        prediction: impl Into<String>,
    ) -> Self {
        let [x, y, z, gx, gy, gz, knee_angle] = features.values();
        Self {
            user_id: user_id.into(),
            x,
            y,
            z,
            gx,
            gy,
            gz,
            knee_angle,
            timestamp,
            prediction: prediction.into(),
        }
    }

    /// Euclidean norm of the acceleration triple.
    pub fn acceleration_magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_abnormal(&self) -> bool {
        is_abnormal(&self.prediction)
    }
}

/// Server clock used for ingestion timestamps.
///
/// Truncated to milliseconds so every repository stores it without loss.
pub fn ingestion_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
