//! Core telemetry pipeline.
//!
//! This module contains:
//! - Feature vector construction from request bodies
//! - The reading model persisted per user
//! - The trailing time window used by every query
//! - Window statistics and the assistant grounding digest

pub mod aggregate;
pub mod digest;
pub mod features;
pub mod reading;
pub mod windowing;

// Re-export commonly used types
pub use aggregate::{round_half_up, summarize, AggregateError, WindowSummary};
pub use digest::{digest, render_line, Digest, DEFAULT_DIGEST_LIMIT};
pub use features::{build_features, FeatureError, FeatureVector, FEATURE_COUNT};
pub use reading::{ingestion_time, is_abnormal, Label, Reading};
pub use windowing::{most_recent, RecentWindow, DEFAULT_WINDOW_DAYS};
