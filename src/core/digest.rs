//! Textual digest of recent readings used to ground assistant replies.
//!
//! Line format:
//!
//! ```text
//! 2024-05-01 09:30 - Prediction: normal, Accel: (0.12,9.81,-0.50), Gyro: (1.00,0.00,-2.25)
//! ```

use crate::core::reading::Reading;
use crate::core::windowing::most_recent;
use chrono_tz::Tz;

/// Default number of readings embedded in a prompt.
pub const DEFAULT_DIGEST_LIMIT: usize = 20;

/// Timestamp format, minute precision.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Result of digesting a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Digest {
    /// The window held no readings.
    NoData,
    /// Rendered lines, most recent first.
    Lines(Vec<String>),
}

impl Digest {
    pub fn is_empty(&self) -> bool {
        matches!(self, Digest::NoData)
    }

    /// Lines joined with newlines, if any.
    pub fn block(&self) -> Option<String> {
        match self {
            Digest::NoData => None,
            Digest::Lines(lines) => Some(lines.join("\n")),
        }
    }
}

/// Render one reading as a digest line.
pub fn render_line(reading: &Reading, tz: Tz) -> String {
    format!(
        "{} - Prediction: {}, Accel: ({:.2},{:.2},{:.2}), Gyro: ({:.2},{:.2},{:.2})",
        reading.timestamp.with_timezone(&tz).format(TIMESTAMP_FORMAT),
        reading.prediction,
        reading.x,
        reading.y,
        reading.z,
        reading.gx,
        reading.gy,
        reading.gz,
    )
}

/// Digest the `limit` most recent readings of an already-windowed set.
pub fn digest(readings: &[Reading], limit: usize, tz: Tz) -> Digest {
    if readings.is_empty() {
        return Digest::NoData;
    }

    let lines = most_recent(readings, limit)
        .iter()
        .map(|r| render_line(r, tz))
        .collect();
    Digest::Lines(lines)
}
