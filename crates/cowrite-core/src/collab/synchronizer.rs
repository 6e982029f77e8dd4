//! Local content ownership, debounced saves, and remote change merging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::{bounded, SessionEvent};
use crate::config::CollabConfig;
use crate::error::Result;
use crate::models::{ContentChange, ContentUpdate, DocumentId, DocumentSession, FileId, UserId};
use crate::store::ContentStore;

struct PendingSave {
    generation: u64,
    handle: JoinHandle<()>,
}

struct SyncState<S> {
    store: Arc<S>,
    document_id: DocumentId,
    file_id: FileId,
    user_id: UserId,
    debounce: Duration,
    io_timeout: Duration,
    content: watch::Sender<String>,
    events: broadcast::Sender<SessionEvent>,
    /// Bumped by every edit and cancellation; a debounce timer only saves if
    /// its generation is still current when it fires
    generation: AtomicU64,
    pending: Mutex<Option<PendingSave>>,
}

impl<S: ContentStore> SyncState<S> {
    fn pending(&self) -> MutexGuard<'_, Option<PendingSave>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of the save for `generation`, if no newer edit superseded it
    fn claim(&self, generation: u64) -> bool {
        let mut pending = self.pending();
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        if pending
            .as_ref()
            .is_some_and(|save| save.generation == generation)
        {
            pending.take();
        }
        true
    }

    async fn persist(&self, content: String) -> Result<()> {
        let update = ContentUpdate::new(content, self.user_id.clone());
        match bounded(
            self.io_timeout,
            "content save",
            self.store.update(&self.document_id, update),
        )
        .await
        {
            Ok(record) => {
                tracing::debug!(document_id = %self.document_id, updated_at = record.updated_at, "Saved content");
                let _ = self.events.send(SessionEvent::Saved);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(document_id = %self.document_id, "Content save failed; keeping local edits: {error}");
                let _ = self.events.send(SessionEvent::SaveFailed(error.to_string()));
                Err(error)
            }
        }
    }

    fn apply_remote(&self, change: ContentChange) {
        if change.document_id != self.document_id {
            return;
        }
        if change.last_edited_by.as_ref() == Some(&self.user_id) {
            tracing::trace!(document_id = %self.document_id, "Ignoring echo of own save");
            return;
        }
        if self.pending().is_some() {
            // Our pending save lands after this one and wins.
            tracing::debug!(document_id = %self.document_id, "Local edit pending; remote change not applied");
            return;
        }

        let applied = self.content.send_if_modified(|content| {
            if *content == change.content {
                false
            } else {
                *content = change.content;
                true
            }
        });
        if applied {
            tracing::debug!(
                document_id = %self.document_id,
                editor = ?change.last_edited_by,
                "Applied remote content"
            );
            let _ = self.events.send(SessionEvent::RemoteContentApplied);
        }
    }
}

/// Owns a session's content and keeps it in step with the content store.
///
/// Edits are visible immediately through [`ContentSynchronizer::content`]
/// and written after a quiet period. Remote saves replace local content
/// unless they echo this user's own write or a local save is still pending;
/// concurrent edits resolve last-write-wins on the whole document.
pub struct ContentSynchronizer<S> {
    state: Arc<SyncState<S>>,
    listener: JoinHandle<()>,
}

impl<S: ContentStore> ContentSynchronizer<S> {
    /// Seed local content from `document` and subscribe to remote saves.
    pub fn start(
        store: Arc<S>,
        document: &DocumentSession,
        user_id: UserId,
        config: &CollabConfig,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (content, _) = watch::channel(document.content.clone());
        let mut subscription = store.subscribe(&document.file_id);
        let state = Arc::new(SyncState {
            store,
            document_id: document.document_id,
            file_id: document.file_id.clone(),
            user_id,
            debounce: config.save_debounce(),
            io_timeout: config.io_timeout(),
            content,
            events,
            generation: AtomicU64::new(0),
            pending: Mutex::new(None),
        });

        let listener = tokio::spawn({
            let state = Arc::clone(&state);
            async move {
                while let Some(change) = subscription.recv().await {
                    state.apply_remote(change);
                }
            }
        });

        Self { state, listener }
    }

    /// Replace local content and restart the save debounce
    pub fn update_content(&self, content: impl Into<String>) {
        self.state.content.send_replace(content.into());
        self.schedule_save();
    }

    /// Cancel any pending debounce and write the current content now
    pub async fn save(&self) -> Result<()> {
        self.cancel_pending_save();
        self.state.persist(self.current_content()).await
    }

    /// Write pending edits, if any. Returns `None` when nothing was pending.
    pub async fn flush(&self) -> Option<Result<()>> {
        if self.cancel_pending_save() {
            Some(self.state.persist(self.current_content()).await)
        } else {
            None
        }
    }

    /// Drop a pending debounced save. Returns whether one was pending.
    pub fn cancel_pending_save(&self) -> bool {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        match self.state.pending().take() {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Re-arm the debounced save for the current content
    pub fn resume_pending_save(&self) {
        self.schedule_save();
    }

    /// Set local content without scheduling a save (already persisted elsewhere)
    pub fn replace_local_content(&self, content: impl Into<String>) {
        self.cancel_pending_save();
        self.state.content.send_replace(content.into());
    }

    pub fn content(&self) -> watch::Receiver<String> {
        self.state.content.subscribe()
    }

    pub fn current_content(&self) -> String {
        self.state.content.borrow().clone()
    }

    pub fn has_pending_save(&self) -> bool {
        self.state.pending().is_some()
    }

    pub fn document_id(&self) -> DocumentId {
        self.state.document_id
    }

    pub fn file_id(&self) -> &FileId {
        &self.state.file_id
    }

    /// Stop the remote subscription and drop any pending save
    pub fn shutdown(&self) {
        self.cancel_pending_save();
        self.listener.abort();
    }

    fn schedule_save(&self) {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = tokio::spawn({
            let state = Arc::clone(&self.state);
            async move {
                tokio::time::sleep(state.debounce).await;
                if state.claim(generation) {
                    let content = state.content.borrow().clone();
                    // Failures are reported through SaveFailed.
                    let _ = state.persist(content).await;
                }
            }
        });

        let previous = self
            .state
            .pending()
            .replace(PendingSave { generation, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }
}

impl<S> Drop for ContentSynchronizer<S> {
    fn drop(&mut self) {
        self.listener.abort();
        if let Some(pending) = self
            .state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pending.handle.abort();
        }
    }
}
