//! Assistant replies grounded in a user's recent readings.

use crate::core::digest::{digest, Digest};
use crate::generation::{GenerationError, TextGenerator};
use crate::store::{StoreError, TelemetryStore};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Reply when the window holds no readings. The generator is not called.
pub const NO_DATA_REPLY: &str = "I couldn't find any recent data for you.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Upstream(#[from] GenerationError),
}

/// Prompt sent to the text generator.
///
/// Every digest line is embedded verbatim and in order.
pub fn build_prompt(user_id: &str, digest_block: &str, window_days: i64, message: &str) -> String {
    format!(
        "You are a helpful and empathetic virtual physiotherapy assistant.\n\
         \n\
         Here is the recent knee movement data for user '{user_id}' over the past {window_days} days:\n\
         {digest_block}\n\
         \n\
         The user says: \"{message}\"\n\
         \n\
         Based on the above sensor data and user's message, reply with a personalized response. \
         Give motivational, health-related or corrective feedback."
    )
}

/// Builds prompts from stored readings and forwards them to a generator.
#[derive(Clone)]
pub struct DialogueComposer {
    store: TelemetryStore,
    digest_limit: usize,
    timezone: Tz,
}

impl DialogueComposer {
    pub fn new(store: TelemetryStore, digest_limit: usize, timezone: Tz) -> Self {
        Self {
            store,
            digest_limit,
            timezone,
        }
    }

    /// Digest of the user's window ending at `now`.
    pub async fn digest_for(&self, user_id: &str, now: DateTime<Utc>) -> Result<Digest, StoreError> {
        let readings = self
            .store
            .query_recent(user_id, now, self.digest_limit)
            .await?;
        Ok(digest(&readings, self.digest_limit, self.timezone))
    }

    /// Answer `message` for `user_id`.
    pub async fn reply<G: TextGenerator>(
        &self,
        generator: &G,
        user_id: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ChatError> {
        let Some(block) = self.digest_for(user_id, now).await?.block() else {
            tracing::info!(user_id, "no recent readings, skipping generation");
            return Ok(NO_DATA_REPLY.to_string());
        };

        let window_days = self.store.window().lookback().num_days();
        let prompt = build_prompt(user_id, &block, window_days, message);
        let reply = generator.generate(&prompt).await.map_err(|e| {
            tracing::error!(user_id, error = %e, "text generation failed");
            e
        })?;
        Ok(reply)
    }
}
