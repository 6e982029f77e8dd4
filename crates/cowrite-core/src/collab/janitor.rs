//! Storage hygiene for presence rows left behind by crashed editors.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::error::Result;
use crate::store::PresenceStore;
use crate::util::{duration_millis, now_millis};

/// Delete presence rows last seen more than `retention` ago
pub async fn sweep_stale_presence<S: PresenceStore>(store: &S, retention: Duration) -> Result<u64> {
    let cutoff = now_millis().saturating_sub(duration_millis(retention));
    let purged = store.purge_older_than(cutoff).await?;
    if purged > 0 {
        tracing::info!(purged, "Purged stale presence rows");
    }
    Ok(purged)
}

/// Sweep every `every` until the returned task is aborted
pub fn spawn_presence_janitor<S: PresenceStore>(
    store: Arc<S>,
    retention: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(error) = sweep_stale_presence(store.as_ref(), retention).await {
                tracing::warn!("Presence sweep failed: {error}");
            }
        }
    })
}
