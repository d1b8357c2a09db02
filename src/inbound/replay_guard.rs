use std::fmt;
use std::time::Duration;

use moka::future::Cache;
use thiserror::Error;
use tracing::debug;

/// Upper bound on remembered deliveries; the TTL normally keeps far fewer
const MAX_TRACKED_DELIVERIES: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Duplicate message: {0}")]
pub struct DuplicateMessage(pub String);

/// Remembers deliveries seen inside the freshness window.
///
/// A signed envelope stays valid for the whole window, so without this a captured
/// request can be replayed until it goes stale. Entries live for twice the window
/// since the accepted skew applies to both past and future timestamps.
#[derive(Clone)]
pub struct ReplayGuard {
    window: Duration,
    seen: Cache<String, i64>,
}

impl ReplayGuard {
    pub fn new(window: Duration) -> Self {
        let seen = Cache::builder()
            .max_capacity(MAX_TRACKED_DELIVERIES)
            .time_to_live(window.saturating_mul(2))
            .build();

        Self { window, seen }
    }

    /// Record `replay_key`, or reject it if it is already recorded.
    ///
    /// Check and insert are one atomic step, so concurrent duplicates admit exactly one.
    pub async fn check_and_record(
        &self,
        replay_key: &str,
        signed_at: i64,
    ) -> Result<(), DuplicateMessage> {
        let entry = self.seen.entry_by_ref(replay_key).or_insert(signed_at).await;

        if entry.is_fresh() {
            Ok(())
        } else {
            debug!(replay_key = %replay_key, first_signed_at = *entry.value(), "Rejecting replayed message");
            Err(DuplicateMessage(replay_key.to_string()))
        }
    }

    /// Number of live entries, after flushing pending expirations
    pub async fn len(&self) -> u64 {
        self.seen.run_pending_tasks().await;
        self.seen.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
