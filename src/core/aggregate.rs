//! Summary statistics over a window of readings.

use crate::core::reading::Reading;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

/// Decimal places for the abnormal percentage.
pub const PERCENTAGE_PLACES: u32 = 2;

/// Decimal places for the average acceleration magnitude.
pub const MAGNITUDE_PLACES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// Statistics are undefined over an empty window.
    #[error("no readings in window")]
    NoData,
}

/// Window statistics as reported by the assessment endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub total_readings: usize,
    pub abnormal_percentage: f64,
    pub average_acceleration_magnitude: f64,
}

/// Compute counts, abnormal ratio and mean acceleration magnitude.
pub fn summarize(readings: &[Reading]) -> Result<WindowSummary, AggregateError> {
    if readings.is_empty() {
        return Err(AggregateError::NoData);
    }

    let total = readings.len();
    let abnormal = readings.iter().filter(|r| r.is_abnormal()).count();
    let abnormal_percentage = 100.0 * abnormal as f64 / total as f64;

    let average_magnitude = readings
        .iter()
        .map(Reading::acceleration_magnitude)
        .collect::<Vec<f64>>()
        .mean();

    Ok(WindowSummary {
        total_readings: total,
        abnormal_percentage: round_half_up(abnormal_percentage, PERCENTAGE_PLACES),
        average_acceleration_magnitude: round_half_up(average_magnitude, MAGNITUDE_PLACES),
    })
}

/// Round to `places` decimals, ties away from zero.
///
/// Works on the shortest decimal representation of `value`, so `2.675`
/// rounds to `2.68` even though its binary form is slightly below it.
pub fn round_half_up(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    // Display for f64 never uses exponent notation.
    let repr = value.abs().to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let places = places as usize;
    if frac_part.len() <= places || int_part.len() > 30 {
        return value;
    }

    let kept = format!("{int_part}{}", &frac_part[..places]);
    let Ok(mut scaled) = kept.parse::<u128>() else {
        return value;
    };
    if frac_part.as_bytes()[places] >= b'5' {
        scaled += 1;
    }

    let digits = format!("{scaled:0>width$}", width = places + 1);
    let (whole, frac) = digits.split_at(digits.len() - places);
    let rounded: f64 = format!("{whole}.{frac}0").parse().unwrap_or(value.abs());

    if value.is_sign_negative() {
        -rounded
    } else {
        rounded
    }
}
