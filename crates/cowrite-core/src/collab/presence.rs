//! Heartbeats and the roster of other editors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

use super::bounded;
use crate::config::CollabConfig;
use crate::error::Result;
use crate::models::{Collaborator, FileId, PresenceUpdate, UserId};
use crate::store::{PresenceStore, UserDirectory};
use crate::util::{duration_millis, now_millis};

struct PresenceState<S> {
    store: Arc<S>,
    file_id: FileId,
    user_id: UserId,
    freshness: Duration,
    io_timeout: Duration,
    roster: watch::Sender<Vec<Collaborator>>,
}

impl<S: PresenceStore + UserDirectory> PresenceState<S> {
    async fn heartbeat(&self, cursor_position: Option<i64>) -> Result<()> {
        let update = PresenceUpdate {
            cursor_position,
            last_seen_at: now_millis(),
        };
        bounded(
            self.io_timeout,
            "presence heartbeat",
            self.store.upsert_presence(&self.file_id, &self.user_id, update),
        )
        .await
    }

    async fn refresh_roster(&self) -> Result<Vec<Collaborator>> {
        let since = now_millis().saturating_sub(duration_millis(self.freshness));
        let records = bounded(
            self.io_timeout,
            "presence poll",
            self.store.list_fresh(&self.file_id, since, &self.user_id),
        )
        .await?;

        let user_ids: Vec<UserId> = records.iter().map(|record| record.user_id.clone()).collect();
        let names = if user_ids.is_empty() {
            HashMap::new()
        } else {
            bounded(
                self.io_timeout,
                "name lookup",
                self.store.resolve_names(&user_ids),
            )
            .await
            .unwrap_or_else(|error| {
                tracing::warn!(file_id = %self.file_id, "Collaborator name lookup failed: {error}");
                HashMap::new()
            })
        };

        let collaborators: Vec<Collaborator> = records
            .into_iter()
            .map(|record| Collaborator {
                display_name: names
                    .get(&record.user_id)
                    .cloned()
                    .unwrap_or_else(|| record.user_id.to_string()),
                user_id: record.user_id,
                cursor_position: record.cursor_position,
                last_seen_at: record.last_seen_at,
            })
            .collect();

        self.roster.send_replace(collaborators.clone());
        Ok(collaborators)
    }
}

/// Keeps this editor's presence row alive and polls for the others.
///
/// Rows older than the freshness window are invisible, so a tracker that
/// dies without [`PresenceTracker::stop`] simply ages out of every roster.
pub struct PresenceTracker<S> {
    state: Arc<PresenceState<S>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: PresenceStore + UserDirectory> PresenceTracker<S> {
    /// Announce presence, then start the heartbeat and roster poll loops.
    pub async fn start(
        store: Arc<S>,
        file_id: FileId,
        user_id: UserId,
        config: &CollabConfig,
    ) -> Self {
        let (roster, _) = watch::channel(Vec::new());
        let state = Arc::new(PresenceState {
            store,
            file_id,
            user_id,
            freshness: config.presence_freshness(),
            io_timeout: config.io_timeout(),
            roster,
        });

        if let Err(error) = state.heartbeat(None).await {
            tracing::warn!(file_id = %state.file_id, "Initial presence heartbeat failed: {error}");
        }

        let heartbeat = tokio::spawn({
            let state = Arc::clone(&state);
            let every = config.heartbeat_interval();
            async move {
                let mut ticker = interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if let Err(error) = state.heartbeat(None).await {
                        tracing::warn!(file_id = %state.file_id, "Presence heartbeat failed: {error}");
                    }
                }
            }
        });

        let poll = tokio::spawn({
            let state = Arc::clone(&state);
            let every = config.roster_poll_interval();
            async move {
                let mut ticker = interval(every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if let Err(error) = state.refresh_roster().await {
                        tracing::warn!(file_id = %state.file_id, "Roster refresh failed: {error}");
                    }
                }
            }
        });

        Self {
            state,
            tasks: Mutex::new(vec![heartbeat, poll]),
        }
    }

    /// Other editors seen within the freshness window, updated on every poll
    pub fn roster(&self) -> watch::Receiver<Vec<Collaborator>> {
        self.state.roster.subscribe()
    }

    /// Poll immediately instead of waiting for the next tick
    pub async fn refresh_roster(&self) -> Result<Vec<Collaborator>> {
        self.state.refresh_roster().await
    }

    /// Record a new cursor position along with a heartbeat
    pub async fn update_cursor_position(&self, position: i64) -> Result<()> {
        self.state.heartbeat(Some(position)).await
    }

    /// Stop both loops and delete this editor's row. Deletion is best effort.
    pub async fn stop(&self) {
        self.abort_tasks();
        if let Err(error) = bounded(
            self.state.io_timeout,
            "presence delete",
            self.state
                .store
                .delete_presence(&self.state.file_id, &self.state.user_id),
        )
        .await
        {
            tracing::warn!(file_id = %self.state.file_id, "Failed to remove presence row: {error}");
        }
    }

    fn abort_tasks(&self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

impl<S> Drop for PresenceTracker<S> {
    fn drop(&mut self) {
        for task in self
            .tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn file() -> FileId {
        FileId::from("file-1")
    }

    async fn beat(store: &MemoryStore, user: &str, age: Duration) {
        store
            .upsert_presence(
                &file(),
                &UserId::from(user),
                PresenceUpdate {
                    cursor_position: None,
                    last_seen_at: now_millis() - duration_millis(age),
                },
            )
            .await
            .unwrap();
    }

    async fn last_seen(store: &MemoryStore) -> i64 {
        store.list_fresh(&file(), 0, &UserId::from("x")).await.unwrap()[0].last_seen_at
    }

    #[tokio::test]
    async fn roster_excludes_self_and_stale_rows() {
        let store = MemoryStore::default();
        store.upsert_profile(&UserId::from("bob"), "Bob").await.unwrap();
        beat(&store, "bob", Duration::from_secs(60)).await;
        beat(&store, "carol", Duration::from_secs(10)).await;
        beat(&store, "dave", Duration::from_secs(301)).await;

        let tracker = PresenceTracker::start(
            Arc::new(store.clone()),
            file(),
            UserId::from("alice"),
            &CollabConfig::default(),
        )
        .await;
        let mut roster = tracker.refresh_roster().await.unwrap();
        roster.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let names: Vec<(&str, &str)> = roster
            .iter()
            .map(|c| (c.user_id.as_str(), c.display_name.as_str()))
            .collect();
        assert_eq!(names, vec![("bob", "Bob"), ("carol", "carol")]);
        tracker.stop().await;
    }

    #[tokio::test]
    async fn start_announces_and_stop_removes_presence() {
        let store = MemoryStore::default();
        let observer = UserId::from("observer");
        let tracker = PresenceTracker::start(
            Arc::new(store.clone()),
            file(),
            UserId::from("alice"),
            &CollabConfig::default(),
        )
        .await;

        let rows = store.list_fresh(&file(), 0, &observer).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, UserId::from("alice"));

        tracker.stop().await;
        assert!(store.list_fresh(&file(), 0, &observer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cursor_position_survives_plain_heartbeats() {
        let store = MemoryStore::default();
        let tracker = PresenceTracker::start(
            Arc::new(store.clone()),
            file(),
            UserId::from("alice"),
            &CollabConfig::default(),
        )
        .await;

        tracker.update_cursor_position(42).await.unwrap();
        tracker.state.heartbeat(None).await.unwrap();

        let rows = store.list_fresh(&file(), 0, &UserId::from("x")).await.unwrap();
        assert_eq!(rows[0].cursor_position, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_refreshes_last_seen_every_interval() {
        let store = MemoryStore::default();
        let config = CollabConfig::default();
        let tracker = PresenceTracker::start(
            Arc::new(store.clone()),
            file(),
            UserId::from("alice"),
            &config,
        )
        .await;
        beat(&store, "alice", Duration::from_secs(200)).await;
        let backdated = last_seen(&store).await;

        tokio::time::sleep(config.heartbeat_interval() - Duration::from_secs(1)).await;
        assert_eq!(last_seen(&store).await, backdated);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let refreshed = last_seen(&store).await;
        assert!(refreshed > backdated);
        assert!(refreshed >= now_millis() - duration_millis(Duration::from_secs(5)));

        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn poll_picks_up_peers_that_join_later() {
        let store = MemoryStore::default();
        let alice = PresenceTracker::start(
            Arc::new(store.clone()),
            file(),
            UserId::from("alice"),
            &CollabConfig::default(),
        )
        .await;
        let mut roster = alice.roster();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(roster.borrow_and_update().is_empty());

        let bob = PresenceTracker::start(
            Arc::new(store.clone()),
            file(),
            UserId::from("bob"),
            &CollabConfig::default(),
        )
        .await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let seen: Vec<UserId> = roster.borrow().iter().map(|c| c.user_id.clone()).collect();
        assert_eq!(seen, vec![UserId::from("bob")]);

        bob.stop().await;
        alice.stop().await;
    }
}
