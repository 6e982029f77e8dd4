//! Shared libSQL backend used by every editor session in the process.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::adapter::StorageAdapter;
use crate::db::{
    Database, LibSqlContentRepository, LibSqlPresenceRepository, LibSqlProfileRepository,
    LibSqlVersionRepository, RemoteConfig,
};
use crate::feed::{ChangeFeed, ContentSubscription};
use crate::models::{
    ContentChange, ContentRecord, ContentUpdate, DocumentId, FileId, NewVersion, PresenceRecord,
    PresenceUpdate, UserId, VersionRecord,
};
use crate::store::{ContentStore, PresenceStore, UserDirectory, VersionStore};
use crate::Result;

const DEFAULT_CHANGE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Thread-safe store for content, versions, presence, and profiles.
///
/// Clones share the connection and the change feed, so sessions opened from
/// clones of one store see each other's updates immediately. Saves made
/// through other handles on the same database (another process, or a remote
/// libSQL server) reach subscribers by polling every `poll_interval`.
#[derive(Clone)]
pub struct CollabStore {
    db: Arc<Mutex<Database>>,
    adapter: StorageAdapter,
    feed: ChangeFeed,
    poll_interval: Option<Duration>,
    /// Channels with a running poll task
    polled: Arc<std::sync::Mutex<HashSet<String>>>,
}

impl CollabStore {
    /// Wrap an opened database
    pub fn new(db: Database, adapter: StorageAdapter) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            adapter,
            feed: ChangeFeed::new(),
            poll_interval: Some(DEFAULT_CHANGE_POLL_INTERVAL),
            polled: Arc::new(std::sync::Mutex::new(HashSet::new())),
        }
    }

    /// Set how often subscribed documents are checked for foreign saves
    #[must_use]
    pub fn with_poll_interval(mut self, every: Duration) -> Self {
        self.poll_interval = Some(every);
        self
    }

    /// Only deliver saves made through this store and its clones
    #[must_use]
    pub fn without_polling(mut self) -> Self {
        self.poll_interval = None;
        self
    }

    /// Open a store backed by a local file, creating parent directories
    pub async fn open_path(db_path: impl Into<PathBuf>, adapter: StorageAdapter) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!("Opening document store at {}", db_path.display());
        Ok(Self::new(Database::open(&db_path).await?, adapter))
    }

    /// Open a store backed by a remote libSQL database
    pub async fn open_remote(config: &RemoteConfig, adapter: StorageAdapter) -> Result<Self> {
        tracing::info!(
            "Using remote document store: {}",
            config.url.as_deref().unwrap_or("unknown")
        );
        Ok(Self::new(Database::open_remote(config).await?, adapter))
    }

    /// Open an in-memory store (primarily for tests)
    pub async fn open_in_memory(adapter: StorageAdapter) -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?, adapter))
    }

    /// The same database and feed seen through another namespace or scope
    #[must_use]
    pub fn with_adapter(&self, adapter: StorageAdapter) -> Self {
        Self {
            db: Arc::clone(&self.db),
            adapter,
            feed: self.feed.clone(),
            poll_interval: self.poll_interval,
            polled: Arc::clone(&self.polled),
        }
    }

    pub const fn adapter(&self) -> &StorageAdapter {
        &self.adapter
    }

    pub const fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Start polling `file_id` unless a poll task for its channel is running.
    ///
    /// The task exits once the channel has no subscribers left.
    fn ensure_polling(&self, file_id: &FileId, channel: &str) {
        let Some(every) = self.poll_interval else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(%channel, "No async runtime; content polling disabled");
            return;
        };
        if !self
            .polled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.to_string())
        {
            return;
        }

        let store = self.clone();
        let file_id = file_id.clone();
        let channel = channel.to_string();
        runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                {
                    let mut polled = store.polled.lock().unwrap_or_else(PoisonError::into_inner);
                    if store.feed.subscriber_count(&channel) == 0 {
                        polled.remove(&channel);
                        break;
                    }
                }
                match store.get(&file_id).await {
                    Ok(Some(record)) => {
                        let delivered = store
                            .feed
                            .publish_if_newer(&channel, ContentChange::from(&record));
                        if delivered > 0 {
                            tracing::debug!(%channel, delivered, "Published polled content change");
                        }
                    }
                    Ok(None) => {}
                    Err(error) => tracing::warn!(%channel, "Content poll failed: {error}"),
                }
            }
            tracing::trace!(%channel, "Stopped content poll");
        });
    }
}

impl ContentStore for CollabStore {
    async fn get(&self, file_id: &FileId) -> Result<Option<ContentRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlContentRepository::new(db.connection(), &self.adapter);
        repo.get(file_id).await
    }

    async fn insert(&self, record: ContentRecord) -> Result<ContentRecord> {
        let db = self.db.lock().await;
        let repo = LibSqlContentRepository::new(db.connection(), &self.adapter);
        repo.insert(&record).await?;
        Ok(record)
    }

    async fn update(&self, document_id: &DocumentId, update: ContentUpdate) -> Result<ContentRecord> {
        let record = {
            let db = self.db.lock().await;
            let repo = LibSqlContentRepository::new(db.connection(), &self.adapter);
            repo.update(document_id, &update).await?
        };
        let channel = self.adapter.channel_for(&record.file_id);
        let delivered = self.feed.publish(&channel, ContentChange::from(&record));
        tracing::debug!(%channel, delivered, "Published content change");
        Ok(record)
    }

    async fn mark_parsed(&self, document_id: &DocumentId, content: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlContentRepository::new(db.connection(), &self.adapter);
        repo.mark_parsed(document_id, content).await
    }

    fn subscribe(&self, file_id: &FileId) -> ContentSubscription {
        let channel = self.adapter.channel_for(file_id);
        let subscription = self.feed.subscribe(&channel);
        self.ensure_polling(file_id, &channel);
        subscription
    }
}

impl VersionStore for CollabStore {
    async fn max_version_number(&self, document_id: &DocumentId) -> Result<i64> {
        let db = self.db.lock().await;
        let repo = LibSqlVersionRepository::new(db.connection(), &self.adapter);
        repo.max_version_number(document_id).await
    }

    async fn insert_version(&self, record: VersionRecord) -> Result<VersionRecord> {
        let db = self.db.lock().await;
        let repo = LibSqlVersionRepository::new(db.connection(), &self.adapter);
        repo.insert(&record).await?;
        Ok(record)
    }

    async fn append_version(&self, version: NewVersion) -> Result<VersionRecord> {
        let db = self.db.lock().await;
        let repo = LibSqlVersionRepository::new(db.connection(), &self.adapter);
        repo.append(&version).await
    }

    async fn latest_version(&self, document_id: &DocumentId) -> Result<Option<VersionRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlVersionRepository::new(db.connection(), &self.adapter);
        repo.latest(document_id).await
    }

    async fn list_versions(&self, document_id: &DocumentId) -> Result<Vec<VersionRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlVersionRepository::new(db.connection(), &self.adapter);
        repo.list_by_document(document_id).await
    }
}

impl PresenceStore for CollabStore {
    async fn upsert_presence(
        &self,
        file_id: &FileId,
        user_id: &UserId,
        update: PresenceUpdate,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlPresenceRepository::new(db.connection(), &self.adapter);
        repo.upsert(file_id, user_id, update).await
    }

    async fn list_fresh(
        &self,
        file_id: &FileId,
        since: i64,
        exclude_user: &UserId,
    ) -> Result<Vec<PresenceRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlPresenceRepository::new(db.connection(), &self.adapter);
        repo.list_fresh(file_id, since, exclude_user).await
    }

    async fn delete_presence(&self, file_id: &FileId, user_id: &UserId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlPresenceRepository::new(db.connection(), &self.adapter);
        repo.delete(file_id, user_id).await
    }

    async fn purge_older_than(&self, cutoff: i64) -> Result<u64> {
        let db = self.db.lock().await;
        let repo = LibSqlPresenceRepository::new(db.connection(), &self.adapter);
        repo.purge_older_than(cutoff).await
    }
}

impl UserDirectory for CollabStore {
    async fn resolve_names(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, String>> {
        let db = self.db.lock().await;
        let repo = LibSqlProfileRepository::new(db.connection());
        repo.resolve_names(user_ids).await
    }

    async fn upsert_profile(&self, user_id: &UserId, display_name: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlProfileRepository::new(db.connection());
        repo.upsert(user_id, display_name).await
    }
}
