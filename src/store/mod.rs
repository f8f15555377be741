//! Telemetry store facade.
//!
//! Repositories are append-only and blocking; [`TelemetryStore`] runs them on
//! the blocking thread pool and owns the trailing-window query semantics.
//! A store that cannot be reached answers every call with
//! [`StoreError::Unavailable`], which callers keep apart from an empty result.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryRepository;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepository;

use crate::core::reading::Reading;
use crate::core::windowing::{most_recent, RecentWindow};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store cannot be reached.
    #[error("telemetry store unavailable: {0}")]
    Unavailable(String),
    /// The store answered but the operation failed.
    #[error("telemetry store query failed: {0}")]
    Query(String),
}

/// Append-only reading repository.
pub trait ReadingRepository: Send + Sync {
    /// Persist one reading.
    fn insert(&self, reading: &Reading) -> Result<(), StoreError>;

    /// Readings for `user_id` with `timestamp >= since`, in insertion order.
    fn find_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError>;
}

/// Repository used when the configured store could not be opened.
#[derive(Debug, Clone)]
pub struct OfflineRepository {
    reason: String,
}

impl OfflineRepository {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ReadingRepository for OfflineRepository {
    fn insert(&self, _reading: &Reading) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    fn find_since(&self, _user_id: &str, _since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }
}

/// Append and windowed-query access to persisted readings.
#[derive(Clone)]
pub struct TelemetryStore {
    repository: Arc<dyn ReadingRepository>,
    window: RecentWindow,
}

impl TelemetryStore {
    pub fn new(repository: Arc<dyn ReadingRepository>, window: RecentWindow) -> Self {
        Self { repository, window }
    }

    /// In-process store with the default window.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRepository::new()), RecentWindow::default())
    }

    /// Store that rejects every call.
    pub fn offline(reason: impl Into<String>) -> Self {
        Self::new(
            Arc::new(OfflineRepository::new(reason)),
            RecentWindow::default(),
        )
    }

    pub fn window(&self) -> RecentWindow {
        self.window
    }

    /// Persist a classified reading.
    pub async fn append(&self, reading: Reading) -> Result<(), StoreError> {
        let repository = Arc::clone(&self.repository);
        run_blocking(move || repository.insert(&reading)).await
    }

    /// Readings for `user_id` inside the window ending at `now`.
    pub async fn query_window(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError> {
        let repository = Arc::clone(&self.repository);
        let user_id = user_id.to_string();
        let since = self.window.start(now);
        let readings = run_blocking(move || repository.find_since(&user_id, since)).await?;

        tracing::debug!(count = readings.len(), since = %since, "window query");
        Ok(readings)
    }

    /// Up to `limit` windowed readings, newest first.
    pub async fn query_recent(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        let readings = self.query_window(user_id, now).await?;
        Ok(most_recent(&readings, limit))
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
}
