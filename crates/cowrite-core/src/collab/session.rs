//! One editor's view of a collaborative document.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use super::{
    ContentSynchronizer, PresenceTracker, SessionEvent, SessionLoader, VersionManager,
    EVENT_CAPACITY,
};
use crate::config::CollabConfig;
use crate::error::Result;
use crate::models::{
    Collaborator, ContentType, DocumentId, DocumentSession, FileId, SourceFile, UserId,
    VersionEntry, VersionRecord,
};
use crate::parser::DocumentParser;
use crate::store::CollabBackend;

/// An open document: content sync, presence, and version history wired
/// to one backend.
///
/// Dropping the session aborts its timers and subscription; [`close`]
/// additionally flushes pending edits and removes the presence row.
///
/// [`close`]: EditorSession::close
pub struct EditorSession<S> {
    document: DocumentSession,
    user_id: UserId,
    events: broadcast::Sender<SessionEvent>,
    synchronizer: ContentSynchronizer<S>,
    presence: PresenceTracker<S>,
    versions: VersionManager<S>,
}

impl<S: CollabBackend> EditorSession<S> {
    /// Load (or create) the document behind `file` and start editing it
    pub async fn open<P: DocumentParser>(
        loader: &SessionLoader<S, P>,
        file: &SourceFile,
        user_id: UserId,
        config: &CollabConfig,
    ) -> Result<Self> {
        config.validate()?;
        let document = loader.load_or_create(file, &user_id).await?;
        Ok(Self::start(Arc::clone(loader.store()), document, user_id, config).await)
    }

    /// Start a session for an already loaded document
    pub async fn start(
        store: Arc<S>,
        document: DocumentSession,
        user_id: UserId,
        config: &CollabConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let synchronizer = ContentSynchronizer::start(
            Arc::clone(&store),
            &document,
            user_id.clone(),
            config,
            events.clone(),
        );
        let versions = VersionManager::start(
            Arc::clone(&store),
            &document,
            user_id.clone(),
            synchronizer.content(),
            config,
            events.clone(),
        );
        let presence =
            PresenceTracker::start(store, document.file_id.clone(), user_id.clone(), config).await;

        tracing::info!(
            document_id = %document.document_id,
            user_id = %user_id,
            "Opened editor session"
        );
        Self {
            document,
            user_id,
            events,
            synchronizer,
            presence,
            versions,
        }
    }

    pub const fn document_id(&self) -> DocumentId {
        self.document.document_id
    }

    pub const fn file_id(&self) -> &FileId {
        &self.document.file_id
    }

    pub const fn content_type(&self) -> ContentType {
        self.document.content_type
    }

    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Apply a local edit; it is saved after the debounce window
    pub fn update_content(&self, content: impl Into<String>) {
        self.synchronizer.update_content(content);
    }

    /// Save now, cancelling the pending debounce
    pub async fn save(&self) -> Result<()> {
        self.synchronizer.save().await
    }

    pub fn content(&self) -> watch::Receiver<String> {
        self.synchronizer.content()
    }

    pub fn current_content(&self) -> String {
        self.synchronizer.current_content()
    }

    pub fn roster(&self) -> watch::Receiver<Vec<Collaborator>> {
        self.presence.roster()
    }

    pub async fn refresh_roster(&self) -> Result<Vec<Collaborator>> {
        self.presence.refresh_roster().await
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn update_cursor_position(&self, position: i64) -> Result<()> {
        self.presence.update_cursor_position(position).await
    }

    /// Snapshot the current content; `None` if it matches the latest version
    pub async fn snapshot(&self, note: Option<&str>) -> Result<Option<VersionRecord>> {
        self.versions.snapshot(&self.current_content(), note).await
    }

    pub async fn list_versions(&self) -> Result<Vec<VersionEntry>> {
        self.versions.list_versions().await
    }

    /// Restore `version_number`; unsaved local edits go into the pre-restore snapshot.
    ///
    /// If the restore fails, local content stays as it was and a pending
    /// save is re-armed.
    pub async fn restore(&self, version_number: i64) -> Result<VersionRecord> {
        let target = self.versions.find_version(version_number).await?;
        let had_pending = self.synchronizer.cancel_pending_save();
        if let Err(error) = self
            .versions
            .restore_to(&self.current_content(), &target)
            .await
        {
            if had_pending {
                self.synchronizer.resume_pending_save();
            }
            return Err(error);
        }
        self.synchronizer.replace_local_content(target.content.clone());
        Ok(target)
    }

    /// Flush pending edits, stop every timer, and leave the roster.
    ///
    /// Teardown always completes; a failed final save is returned afterwards.
    pub async fn close(self) -> Result<()> {
        let flushed = self.synchronizer.flush().await;
        self.synchronizer.shutdown();
        self.versions.shutdown();
        self.presence.stop().await;
        tracing::info!(document_id = %self.document.document_id, "Closed editor session");
        flushed.unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::collab::test_support::StubParser;
    use crate::error::Error;
    use crate::models::BEFORE_RESTORE_NOTE;
    use crate::store::{ContentStore, MemoryStore, PresenceStore, UserDirectory, VersionStore};
    use pretty_assertions::assert_eq;
    use tokio::time::sleep;

    fn report() -> SourceFile {
        SourceFile::new("file-1").with_path("uploads/report.docx")
    }

    async fn open(
        loader: &SessionLoader<MemoryStore, StubParser>,
        user: &str,
    ) -> EditorSession<MemoryStore> {
        EditorSession::open(loader, &report(), UserId::from(user), &CollabConfig::default())
            .await
            .unwrap()
    }

    fn loader(store: &MemoryStore) -> SessionLoader<MemoryStore, StubParser> {
        SessionLoader::new(
            Arc::new(store.clone()),
            Arc::new(StubParser::returning("<p>Report</p>")),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn two_sessions_converge_on_the_last_save() {
        let store = MemoryStore::default();
        let loader = loader(&store);
        store.upsert_profile(&UserId::from("bob"), "Bob").await.unwrap();

        let alice = open(&loader, "alice").await;
        let bob = open(&loader, "bob").await;
        assert_eq!(alice.document_id(), bob.document_id());
        assert_eq!(alice.current_content(), "<p>Report</p>");

        alice.update_content("<p>Report by A</p>");
        sleep(Duration::from_millis(500)).await;
        bob.update_content("<p>Report by B</p>");
        sleep(Duration::from_secs(2)).await;

        assert_eq!(alice.current_content(), "<p>Report by B</p>");
        let record = store.get(&FileId::from("file-1")).await.unwrap().unwrap();
        assert_eq!(record.content, "<p>Report by B</p>");

        let roster = alice.refresh_roster().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].display_name, "Bob");

        alice.close().await.unwrap();
        bob.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn close_flushes_pending_edit_and_leaves_roster() {
        let store = MemoryStore::default();
        let loader = loader(&store);
        let session = open(&loader, "alice").await;

        session.update_content("<p>last words</p>");
        session.close().await.unwrap();

        let record = store.get(&FileId::from("file-1")).await.unwrap().unwrap();
        assert_eq!(record.content, "<p>last words</p>");
        assert!(store
            .list_fresh(&FileId::from("file-1"), 0, &UserId::from("nobody"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restore_replaces_local_content_and_captures_unsaved_edits() {
        let store = MemoryStore::default();
        let loader = loader(&store);
        let session = open(&loader, "alice").await;
        let mut events = session.events();

        session.update_content("<p>rewritten</p>");
        let target = session.restore(1).await.unwrap();

        assert_eq!(target.content, "<p>Report</p>");
        assert_eq!(session.current_content(), "<p>Report</p>");
        let versions = store.list_versions(&session.document_id()).await.unwrap();
        assert_eq!(versions.len(), 3);
        assert_eq!(versions[1].content, "<p>rewritten</p>");
        assert_eq!(versions[1].version_note.as_deref(), Some(BEFORE_RESTORE_NOTE));

        // The cancelled debounce must not resurrect the discarded edit.
        sleep(Duration::from_secs(5)).await;
        let record = store.get(&FileId::from("file-1")).await.unwrap().unwrap();
        assert_eq!(record.content, "<p>Report</p>");
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SnapshotCreated(2));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SnapshotCreated(3));

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restore_keeps_unsaved_edit_and_saves_it() {
        let store = MemoryStore::default();
        let loader = loader(&store);
        let session = open(&loader, "alice").await;

        session.update_content("<p>unsaved edit</p>");
        let error = session.restore(99).await.unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
        assert_eq!(session.current_content(), "<p>unsaved edit</p>");

        sleep(Duration::from_secs(5)).await;
        let record = store.get(&FileId::from("file-1")).await.unwrap().unwrap();
        assert_eq!(record.content, "<p>unsaved edit</p>");
        assert_eq!(
            store.list_versions(&session.document_id()).await.unwrap().len(),
            1
        );
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn close_after_failed_restore_flushes_the_edit() {
        let store = MemoryStore::default();
        let loader = loader(&store);
        let session = open(&loader, "alice").await;

        session.update_content("<p>unsaved edit</p>");
        assert!(session.restore(99).await.is_err());
        session.close().await.unwrap();

        let record = store.get(&FileId::from("file-1")).await.unwrap().unwrap();
        assert_eq!(record.content, "<p>unsaved edit</p>");
    }

    #[tokio::test(start_paused = true)]
    async fn manual_snapshot_lists_with_creator_names() {
        let store = MemoryStore::default();
        store.upsert_profile(&UserId::from("alice"), "Alice").await.unwrap();
        let loader = loader(&store);
        let session = open(&loader, "alice").await;

        assert!(session.snapshot(Some("again")).await.unwrap().is_none());
        session.update_content("<p>v2</p>");
        let created = session.snapshot(Some("milestone")).await.unwrap().unwrap();
        assert_eq!(created.version_number, 2);

        let entries = session.list_versions().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].creator_name, "Alice");
        assert_eq!(entries[0].record.version_note.as_deref(), Some("milestone"));

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_rejects_invalid_config() {
        let store = MemoryStore::default();
        let loader = loader(&store);
        let config = CollabConfig {
            save_debounce_ms: 0,
            ..CollabConfig::default()
        };
        let result =
            EditorSession::open(&loader, &report(), UserId::from("alice"), &config).await;
        assert!(result.is_err());
        assert_eq!(store.document_count(), 0);
    }
}
