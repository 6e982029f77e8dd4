//! Snapshot history: manual and automatic snapshots, listing, and restore.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::{bounded, SessionEvent};
use crate::config::CollabConfig;
use crate::error::{Error, Result};
use crate::models::{
    restored_from_note, ContentUpdate, DocumentId, DocumentSession, FileId, NewVersion, UserId,
    VersionEntry, VersionRecord, AUTO_SNAPSHOT_NOTE, BEFORE_RESTORE_NOTE, SYSTEM_AUTHOR,
    UNKNOWN_AUTHOR,
};
use crate::store::{ContentStore, UserDirectory, VersionStore};

struct VersionState<S> {
    store: Arc<S>,
    document_id: DocumentId,
    file_id: FileId,
    user_id: UserId,
    io_timeout: Duration,
    auto_delay: Duration,
    events: broadcast::Sender<SessionEvent>,
    content: watch::Receiver<String>,
    /// Content of the last snapshot this session wrote or skipped as unchanged
    last_snapshotted: Mutex<Option<String>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<S> VersionState<S> {
    fn last_snapshotted(&self) -> MutexGuard<'_, Option<String>> {
        self.last_snapshotted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: ContentStore + VersionStore + UserDirectory> VersionState<S> {
    async fn snapshot(&self, content: &str, note: Option<&str>) -> Result<Option<VersionRecord>> {
        let latest = bounded(
            self.io_timeout,
            "version lookup",
            self.store.latest_version(&self.document_id),
        )
        .await?;
        if latest.is_some_and(|latest| latest.content == content) {
            tracing::debug!(document_id = %self.document_id, "Content unchanged since last version; skipping snapshot");
            *self.last_snapshotted() = Some(content.to_string());
            return Ok(None);
        }
        self.append(content, note).await.map(Some)
    }

    async fn append(&self, content: &str, note: Option<&str>) -> Result<VersionRecord> {
        let version = NewVersion {
            document_id: self.document_id,
            file_id: self.file_id.clone(),
            content: content.to_string(),
            version_note: note.map(str::to_string),
            created_by: Some(self.user_id.clone()),
        };
        let record = bounded(
            self.io_timeout,
            "version append",
            self.store.append_version(version),
        )
        .await?;

        tracing::debug!(
            document_id = %self.document_id,
            version_number = record.version_number,
            note = ?record.version_note,
            "Created version"
        );
        *self.last_snapshotted() = Some(record.content.clone());
        let _ = self.events.send(SessionEvent::SnapshotCreated(record.version_number));
        Ok(record)
    }

    /// Arm the auto-snapshot timer unless one is armed or the content is already captured
    fn on_content_changed(self: &Arc<Self>) {
        let mut timer = self.timer();
        if timer.is_some() {
            return;
        }
        let current = self.content.borrow().clone();
        if self.last_snapshotted().as_deref() == Some(current.as_str()) {
            return;
        }

        tracing::debug!(document_id = %self.document_id, delay = ?self.auto_delay, "Auto-snapshot armed");
        let state = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(state.auto_delay).await;
            state.timer().take();
            let content = state.content.borrow().clone();
            if let Err(error) = state.snapshot(&content, Some(AUTO_SNAPSHOT_NOTE)).await {
                tracing::warn!(document_id = %state.document_id, "Auto-snapshot failed: {error}");
            }
        }));
    }
}

/// Version history of one document as seen by one session.
///
/// Version numbers come from the store's atomic append, so concurrent
/// snapshots from different sessions never reuse a number.
pub struct VersionManager<S> {
    state: Arc<VersionState<S>>,
    observer: JoinHandle<()>,
}

impl<S: ContentStore + VersionStore + UserDirectory> VersionManager<S> {
    /// Start watching `content` for the automatic snapshot timer
    pub fn start(
        store: Arc<S>,
        document: &DocumentSession,
        user_id: UserId,
        content: watch::Receiver<String>,
        config: &CollabConfig,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let state = Arc::new(VersionState {
            store,
            document_id: document.document_id,
            file_id: document.file_id.clone(),
            user_id,
            io_timeout: config.io_timeout(),
            auto_delay: config.auto_snapshot_delay(),
            events,
            content: content.clone(),
            last_snapshotted: Mutex::new(Some(document.content.clone())),
            timer: Mutex::new(None),
        });

        let observer = tokio::spawn({
            let state = Arc::clone(&state);
            let mut content = content;
            async move {
                while content.changed().await.is_ok() {
                    state.on_content_changed();
                }
            }
        });

        Self { state, observer }
    }

    /// Snapshot `content` unless it equals the most recent version
    pub async fn snapshot(&self, content: &str, note: Option<&str>) -> Result<Option<VersionRecord>> {
        self.state.snapshot(content, note).await
    }

    /// All versions, newest first, with creator names resolved in one lookup
    pub async fn list_versions(&self) -> Result<Vec<VersionEntry>> {
        let records = bounded(
            self.state.io_timeout,
            "version listing",
            self.state.store.list_versions(&self.state.document_id),
        )
        .await?;

        let creators: Vec<UserId> = records
            .iter()
            .filter_map(|record| record.created_by.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let names = if creators.is_empty() {
            HashMap::new()
        } else {
            bounded(
                self.state.io_timeout,
                "name lookup",
                self.state.store.resolve_names(&creators),
            )
            .await
            .unwrap_or_else(|error| {
                tracing::warn!(document_id = %self.state.document_id, "Creator name lookup failed: {error}");
                HashMap::new()
            })
        };

        Ok(records
            .into_iter()
            .map(|record| {
                let creator_name = match &record.created_by {
                    None => SYSTEM_AUTHOR.to_string(),
                    Some(user_id) => names
                        .get(user_id)
                        .cloned()
                        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
                };
                VersionEntry {
                    record,
                    creator_name,
                }
            })
            .collect())
    }

    /// Look up version `version_number` of this document
    pub async fn find_version(&self, version_number: i64) -> Result<VersionRecord> {
        let state = &self.state;
        bounded(
            state.io_timeout,
            "version listing",
            state.store.list_versions(&state.document_id),
        )
        .await?
        .into_iter()
        .find(|record| record.version_number == version_number)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "version {version_number} of document {}",
                state.document_id
            ))
        })
    }

    /// Make version `version_number` live again.
    ///
    /// Writes exactly two versions: `current_content` before the overwrite
    /// and the restored content after it. The restored version is untouched.
    pub async fn restore(&self, current_content: &str, version_number: i64) -> Result<VersionRecord> {
        let target = self.find_version(version_number).await?;
        self.restore_to(current_content, &target).await?;
        Ok(target)
    }

    /// Make `target` live, bracketed by the two restore snapshots.
    ///
    /// An error means the live content was not replaced. Once it has been,
    /// a failed closing snapshot is only logged.
    pub async fn restore_to(&self, current_content: &str, target: &VersionRecord) -> Result<()> {
        let state = &self.state;
        state.append(current_content, Some(BEFORE_RESTORE_NOTE)).await?;
        bounded(
            state.io_timeout,
            "content restore",
            state.store.update(
                &state.document_id,
                ContentUpdate::new(target.content.clone(), state.user_id.clone()),
            ),
        )
        .await?;

        let version_number = target.version_number;
        let note = restored_from_note(version_number);
        if let Err(error) = state.append(&target.content, Some(note.as_str())).await {
            tracing::warn!(
                document_id = %state.document_id,
                version_number,
                "Restored content but could not record the restore snapshot: {error}"
            );
        }

        tracing::info!(document_id = %state.document_id, version_number, "Restored version");
        Ok(())
    }

    /// Cancel the auto-snapshot timer and stop observing content
    pub fn shutdown(&self) {
        self.observer.abort();
        if let Some(timer) = self.state.timer().take() {
            timer.abort();
        }
    }
}

impl<S> Drop for VersionManager<S> {
    fn drop(&mut self) {
        self.observer.abort();
        if let Some(timer) = self.state.timer().take() {
            timer.abort();
        }
    }
}
