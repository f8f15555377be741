//! Knee Telemetry - motion classification and analytics for a knee wearable.
//!
//! Readings (3-axis acceleration, 3-axis gyroscope, knee angle) are
//! classified as normal or abnormal motion on ingest, stored per user, and
//! summarized over a trailing three-day window.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Knee Telemetry                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌─────────────────┐       │
//! │  │  Features  │──▶│ Classifier │──▶│ Telemetry Store │       │
//! │  │ (validate) │   │  (mutex)   │   │  (append-only)  │       │
//! │  └────────────┘   └────────────┘   └─────────────────┘       │
//! │                                            │ window query    │
//! │                                            ▼                 │
//! │                    ┌─────────────┐   ┌─────────────┐         │
//! │                    │  Dialogue   │◀──│  Aggregate  │         │
//! │                    │  Composer   │   │  + Digest   │         │
//! │                    └─────────────┘   └─────────────┘         │
//! │                           │                                  │
//! │                           ▼                                  │
//! │                    text generation                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use knee_telemetry::{build_features, Classifier, DenseModel};
//!
//! let model = DenseModel::load("model.json").expect("Failed to load model");
//! let classifier = Classifier::new(Box::new(model));
//!
//! let raw = serde_json::json!({"x": 0.1, "y": 9.7, "z": 0.3, "gx": 1.2, "gy": 0.0, "gz": -0.4});
//! let features = build_features(&raw).expect("invalid reading");
//! println!("{}", classifier.classify(&features).expect("inference failed"));
//! ```

pub mod classifier;
pub mod config;
pub mod core;
pub mod dialogue;
pub mod generation;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use classifier::{Classifier, DenseModel, InferenceError, InferenceModel, ModelLoadError};
pub use config::{Config, ConfigError, StoreBackend};
pub use core::{
    build_features, digest, summarize, AggregateError, Digest, FeatureError, FeatureVector, Label,
    Reading, RecentWindow, WindowSummary,
};
pub use dialogue::{ChatError, DialogueComposer, NO_DATA_REPLY};
pub use generation::{GeminiClient, GenerationConfig, GenerationError, TextGenerator};
pub use store::{ReadingRepository, StoreError, TelemetryStore};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
