//! In-process reading repository.

use super::{ReadingRepository, StoreError};
use crate::core::reading::Reading;
use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// Vector-backed repository, insertion ordered.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    rows: RwLock<Vec<Reading>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadingRepository for MemoryRepository {
    fn insert(&self, reading: &Reading) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        rows.push(reading.clone());
        Ok(())
    }

    fn find_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(rows
            .iter()
            .filter(|r| r.user_id == user_id && r.timestamp >= since)
            .cloned()
            .collect())
    }
}
