//! Collaborative editing session components.
//!
//! A session is assembled from four parts that share one backend:
//! the loader resolves the live document, the synchronizer owns local
//! content and debounced saves, the presence tracker heartbeats and polls
//! the roster, and the version manager snapshots and restores history.
//! Store failures are logged and turned into [`SessionEvent`]s at this
//! boundary; nothing here tears a session down because a call failed.

mod janitor;
mod loader;
mod presence;
mod session;
mod synchronizer;
#[cfg(test)]
mod test_support;
mod versions;

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

pub use janitor::{spawn_presence_janitor, sweep_stale_presence};
pub use loader::SessionLoader;
pub use presence::PresenceTracker;
pub use session::EditorSession;
pub use synchronizer::ContentSynchronizer;
pub use versions::VersionManager;

/// Capacity of a session's event channel
const EVENT_CAPACITY: usize = 32;

/// Notifications a session emits to its host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A collaborator's save replaced local content
    RemoteContentApplied,
    Saved,
    /// The save failed; local content is kept and retried by the next save
    SaveFailed(String),
    /// A snapshot was written with this version number
    SnapshotCreated(i64),
}

/// Run `future` with an upper bound, mapping expiry to [`Error::Timeout`]
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &'static str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| Error::Timeout(what))?
}
