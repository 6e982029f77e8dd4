//! Resolves the live document for an uploaded file.

use std::sync::Arc;
use std::time::Duration;

use super::bounded;
use crate::config::CollabConfig;
use crate::error::Result;
use crate::models::{
    ContentRecord, ContentType, DocumentSession, NewVersion, SourceFile, UserId,
    INITIAL_VERSION_NOTE,
};
use crate::parser::{DocumentKind, DocumentParser, ParseRequest};
use crate::store::{ContentStore, VersionStore};

/// Finds or creates the single content record of a file.
///
/// Parser failures never fail a load; the document opens with whatever
/// content is available and a flagged record is parsed again on the next open.
pub struct SessionLoader<S, P> {
    store: Arc<S>,
    parser: Arc<P>,
    io_timeout: Duration,
}

impl<S, P> SessionLoader<S, P>
where
    S: ContentStore + VersionStore,
    P: DocumentParser,
{
    pub fn new(store: Arc<S>, parser: Arc<P>) -> Self {
        Self {
            store,
            parser,
            io_timeout: CollabConfig::default().io_timeout(),
        }
    }

    #[must_use]
    pub const fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Open `file` for `user`, creating its content record on first open.
    pub async fn load_or_create(&self, file: &SourceFile, user: &UserId) -> Result<DocumentSession> {
        let existing = bounded(
            self.io_timeout,
            "content lookup",
            self.store.get(&file.file_id),
        )
        .await?;

        match existing {
            Some(record) => Ok(self.resume(record, file, user).await),
            None => self.create(file, user).await,
        }
    }

    async fn resume(
        &self,
        mut record: ContentRecord,
        file: &SourceFile,
        user: &UserId,
    ) -> DocumentSession {
        if !record.needs_parse_retry || !file.has_source() {
            return DocumentSession::from_record(&record);
        }

        let Some(content) = self.try_parse(file).await else {
            tracing::debug!(file_id = %file.file_id, "Still no parseable content; keeping placeholder");
            return DocumentSession::from_record(&record);
        };

        match bounded(
            self.io_timeout,
            "content overwrite",
            self.store.mark_parsed(&record.id, &content),
        )
        .await
        {
            Ok(()) => {
                tracing::info!(document_id = %record.id, "Replaced placeholder with parsed content");
                self.record_initial_version(&record, &content, user).await;
            }
            Err(error) => {
                tracing::warn!(document_id = %record.id, "Failed to store parsed content: {error}");
            }
        }

        record.content = content;
        record.needs_parse_retry = false;
        DocumentSession::from_record(&record)
    }

    async fn create(&self, file: &SourceFile, user: &UserId) -> Result<DocumentSession> {
        let content_type = DocumentKind::detect(file.file_path.as_deref(), file.mime_type.as_deref())
            .map_or(ContentType::RichText, DocumentKind::content_type);
        let parsed = self.try_parse(file).await;

        let record = match &parsed {
            Some(content) => ContentRecord::new(
                file.file_id.clone(),
                content.clone(),
                content_type,
                Some(user.clone()),
            ),
            None => ContentRecord::placeholder(file.file_id.clone(), content_type, Some(user.clone())),
        };

        let record = match bounded(self.io_timeout, "content insert", self.store.insert(record)).await {
            Ok(record) => record,
            Err(error) if error.is_unique_violation() => {
                // Another editor created the record between our lookup and insert.
                tracing::info!(file_id = %file.file_id, "Document created concurrently; using existing record");
                let existing = bounded(
                    self.io_timeout,
                    "content lookup",
                    self.store.get(&file.file_id),
                )
                .await?;
                return existing
                    .map(|record| DocumentSession::from_record(&record))
                    .ok_or(error);
            }
            Err(error) => return Err(error),
        };

        tracing::info!(
            document_id = %record.id,
            file_id = %record.file_id,
            parsed = parsed.is_some(),
            "Created document"
        );
        if let Some(content) = &parsed {
            self.record_initial_version(&record, content, user).await;
        }
        Ok(DocumentSession::from_record(&record))
    }

    /// Parse `file` if its kind is supported, returning only meaningful content
    async fn try_parse(&self, file: &SourceFile) -> Option<String> {
        let request = ParseRequest::from(file);
        let kind = request.kind()?;

        match bounded(self.io_timeout, "document parse", self.parser.parse(&request)).await {
            Ok(outcome) => {
                if let Some(error) = &outcome.error {
                    tracing::warn!(file_id = %file.file_id, ?kind, "Parser returned no content: {error}");
                }
                outcome.meaningful_content()
            }
            Err(error) => {
                tracing::warn!(file_id = %file.file_id, ?kind, "Document parse failed: {error}");
                None
            }
        }
    }

    async fn record_initial_version(&self, record: &ContentRecord, content: &str, user: &UserId) {
        let has_versions = bounded(
            self.io_timeout,
            "version lookup",
            self.store.max_version_number(&record.id),
        )
        .await
        .map(|max| max > 0);
        if matches!(has_versions, Ok(true)) {
            return;
        }

        let version = NewVersion {
            document_id: record.id,
            file_id: record.file_id.clone(),
            content: content.to_string(),
            version_note: Some(INITIAL_VERSION_NOTE.to_string()),
            created_by: Some(user.clone()),
        };
        if let Err(error) = bounded(
            self.io_timeout,
            "version append",
            self.store.append_version(version),
        )
        .await
        {
            tracing::warn!(document_id = %record.id, "Failed to record initial version: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::collab::test_support::StubParser;
    use crate::feed::ContentSubscription;
    use crate::models::{ContentUpdate, DocumentId, FileId, VersionRecord, EDITOR_PLACEHOLDER};
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn docx() -> SourceFile {
        SourceFile::new("file-1").with_path("uploads/plan.docx")
    }

    fn alice() -> UserId {
        UserId::from("alice")
    }

    #[tokio::test]
    async fn first_open_parses_and_records_initial_version() {
        let store = Arc::new(MemoryStore::default());
        let parser = Arc::new(StubParser::returning("<p>Plan</p>"));
        let loader = SessionLoader::new(Arc::clone(&store), Arc::clone(&parser));

        let first = loader.load_or_create(&docx(), &alice()).await.unwrap();
        assert_eq!(first.content, "<p>Plan</p>");
        assert_eq!(first.content_type, ContentType::RichText);

        let versions = store.list_versions(&first.document_id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_number, 1);
        assert_eq!(versions[0].version_note.as_deref(), Some(INITIAL_VERSION_NOTE));
        assert_eq!(versions[0].created_by, Some(alice()));

        let second = loader.load_or_create(&docx(), &UserId::from("bob")).await.unwrap();
        assert_eq!(second.document_id, first.document_id);
        assert_eq!(parser.calls(), 1);
        assert_eq!(store.document_count(), 1);
    }

    #[tokio::test]
    async fn unparseable_file_opens_with_placeholder_and_stable_id() {
        let store = Arc::new(MemoryStore::default());
        let parser = Arc::new(StubParser::unsupported());
        let loader = SessionLoader::new(Arc::clone(&store), Arc::clone(&parser));

        let first = loader.load_or_create(&docx(), &alice()).await.unwrap();
        let second = loader.load_or_create(&docx(), &alice()).await.unwrap();

        assert_eq!(first.content, "<p></p>");
        assert!(first.awaiting_content);
        assert_eq!(first.display_content(), EDITOR_PLACEHOLDER);
        assert_eq!(second.document_id, first.document_id);
        assert_eq!(parser.calls(), 2);
        assert!(store.list_versions(&first.document_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn flagged_record_is_parsed_on_a_later_open() {
        let store = Arc::new(MemoryStore::default());
        let parser = Arc::new(StubParser::unsupported());
        let loader = SessionLoader::new(Arc::clone(&store), Arc::clone(&parser));

        let first = loader.load_or_create(&docx(), &alice()).await.unwrap();
        parser.set_content("<p>Recovered</p>");
        let second = loader.load_or_create(&docx(), &alice()).await.unwrap();

        assert_eq!(second.document_id, first.document_id);
        assert_eq!(second.content, "<p>Recovered</p>");
        assert!(!second.awaiting_content);
        let record = store.get(&FileId::from("file-1")).await.unwrap().unwrap();
        assert_eq!(record.content, "<p>Recovered</p>");
        assert!(!record.needs_parse_retry);
        assert_eq!(store.max_version_number(&first.document_id).await.unwrap(), 1);

        loader.load_or_create(&docx(), &alice()).await.unwrap();
        assert_eq!(parser.calls(), 2);
    }

    #[tokio::test]
    async fn saved_content_is_never_replaced_by_a_parse() {
        let store = Arc::new(MemoryStore::default());
        let parser = Arc::new(StubParser::unsupported());
        let loader = SessionLoader::new(Arc::clone(&store), Arc::clone(&parser));

        let first = loader.load_or_create(&docx(), &alice()).await.unwrap();
        store
            .update(&first.document_id, ContentUpdate::new("<p>typed</p>", alice()))
            .await
            .unwrap();
        parser.set_content("<p>parsed</p>");

        let second = loader.load_or_create(&docx(), &alice()).await.unwrap();
        assert_eq!(second.content, "<p>typed</p>");
        assert_eq!(parser.calls(), 1);
    }

    #[tokio::test]
    async fn parser_errors_are_swallowed() {
        let store = Arc::new(MemoryStore::default());
        let loader = SessionLoader::new(Arc::clone(&store), Arc::new(StubParser::failing()));

        let session = loader.load_or_create(&docx(), &alice()).await.unwrap();
        assert_eq!(session.content, "<p></p>");
        assert!(store.get(&FileId::from("file-1")).await.unwrap().unwrap().needs_parse_retry);
    }

    #[tokio::test]
    async fn unsupported_kinds_skip_the_parser() {
        let store = Arc::new(MemoryStore::default());
        let parser = Arc::new(StubParser::returning("ignored"));
        let loader = SessionLoader::new(Arc::clone(&store), Arc::clone(&parser));

        let file = SourceFile::new("img").with_path("photo.png").with_mime_type("image/png");
        let session = loader.load_or_create(&file, &alice()).await.unwrap();
        assert_eq!(session.content, "<p></p>");
        assert_eq!(parser.calls(), 0);
    }

    #[tokio::test]
    async fn markdown_is_stored_as_plain_text() {
        let store = Arc::new(MemoryStore::default());
        let loader = SessionLoader::new(store, Arc::new(StubParser::returning("# Notes")));

        let file = SourceFile::new("md").with_path("notes.md");
        let session = loader.load_or_create(&file, &alice()).await.unwrap();
        assert_eq!(session.content_type, ContentType::PlainText);
        assert_eq!(session.content, "# Notes");
    }

    /// Hides existing records from the first lookup to simulate two editors
    /// opening the same file at once.
    struct RacingStore {
        inner: MemoryStore,
        raced: AtomicBool,
    }

    impl ContentStore for RacingStore {
        async fn get(&self, file_id: &FileId) -> Result<Option<ContentRecord>> {
            if self.raced.swap(true, Ordering::SeqCst) {
                self.inner.get(file_id).await
            } else {
                Ok(None)
            }
        }

        async fn insert(&self, record: ContentRecord) -> Result<ContentRecord> {
            self.inner.insert(record).await
        }

        async fn update(
            &self,
            document_id: &DocumentId,
            update: ContentUpdate,
        ) -> Result<ContentRecord> {
            self.inner.update(document_id, update).await
        }

        async fn mark_parsed(&self, document_id: &DocumentId, content: &str) -> Result<()> {
            self.inner.mark_parsed(document_id, content).await
        }

        fn subscribe(&self, file_id: &FileId) -> ContentSubscription {
            self.inner.subscribe(file_id)
        }
    }

    impl VersionStore for RacingStore {
        async fn max_version_number(&self, document_id: &DocumentId) -> Result<i64> {
            self.inner.max_version_number(document_id).await
        }

        async fn insert_version(&self, record: VersionRecord) -> Result<VersionRecord> {
            self.inner.insert_version(record).await
        }

        async fn append_version(&self, version: NewVersion) -> Result<VersionRecord> {
            self.inner.append_version(version).await
        }

        async fn latest_version(&self, document_id: &DocumentId) -> Result<Option<VersionRecord>> {
            self.inner.latest_version(document_id).await
        }

        async fn list_versions(&self, document_id: &DocumentId) -> Result<Vec<VersionRecord>> {
            self.inner.list_versions(document_id).await
        }
    }

    #[tokio::test]
    async fn concurrent_first_open_reuses_the_winning_record() {
        let memory = MemoryStore::default();
        let winner = memory
            .insert(ContentRecord::new(
                FileId::from("file-1"),
                "<p>winner</p>",
                ContentType::RichText,
                Some(UserId::from("bob")),
            ))
            .await
            .unwrap();
        let store = Arc::new(RacingStore {
            inner: memory.clone(),
            raced: AtomicBool::new(false),
        });
        let loader = SessionLoader::new(store, Arc::new(StubParser::returning("<p>loser</p>")));

        let session = loader.load_or_create(&docx(), &alice()).await.unwrap();
        assert_eq!(session.document_id, winner.id);
        assert_eq!(session.content, "<p>winner</p>");
        assert_eq!(memory.document_count(), 1);
        assert!(memory.list_versions(&winner.id).await.unwrap().is_empty());
    }
}
