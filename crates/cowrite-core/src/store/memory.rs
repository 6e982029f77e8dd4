//! In-process backend with the same semantics as the libSQL stores.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::adapter::{DocumentNamespace, StorageAdapter};
use crate::error::{Error, Result};
use crate::feed::{ChangeFeed, ContentSubscription};
use crate::models::{
    ContentChange, ContentRecord, ContentUpdate, DocumentId, FileId, NewVersion, PresenceRecord,
    PresenceUpdate, UserId, VersionRecord,
};

use super::{ContentStore, PresenceStore, UserDirectory, VersionStore};

#[derive(Default)]
struct MemoryState {
    /// Keyed by the adapter's channel name, which is unique per (namespace, scope, file)
    documents: HashMap<String, ContentRecord>,
    versions: Vec<VersionRecord>,
    presence: HashMap<(String, UserId), (DocumentNamespace, PresenceRecord)>,
    profiles: HashMap<UserId, String>,
}

/// Shared in-memory backend. Clones see the same data.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    adapter: StorageAdapter,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new(adapter: StorageAdapter) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            adapter,
            feed: ChangeFeed::new(),
        }
    }

    /// A view of the same data through another adapter
    #[must_use]
    pub fn with_adapter(&self, adapter: StorageAdapter) -> Self {
        Self {
            state: Arc::clone(&self.state),
            adapter,
            feed: self.feed.clone(),
        }
    }

    pub const fn adapter(&self) -> &StorageAdapter {
        &self.adapter
    }

    /// Number of content records across every namespace
    pub fn document_count(&self) -> usize {
        self.lock().documents.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `record`, stored under `key`, belongs to this view's namespace and scope
    fn owns(&self, key: &str, record: &ContentRecord) -> bool {
        key == self.adapter.channel_for(&record.file_id)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StorageAdapter::drive())
    }
}

impl ContentStore for MemoryStore {
    async fn get(&self, file_id: &FileId) -> Result<Option<ContentRecord>> {
        let key = self.adapter.channel_for(file_id);
        Ok(self.lock().documents.get(&key).cloned())
    }

    async fn insert(&self, record: ContentRecord) -> Result<ContentRecord> {
        let key = self.adapter.channel_for(&record.file_id);
        let mut state = self.lock();
        if state.documents.contains_key(&key) {
            return Err(Error::Conflict(format!(
                "document already exists for file {}",
                record.file_id
            )));
        }
        state.documents.insert(key, record.clone());
        Ok(record)
    }

    async fn update(&self, document_id: &DocumentId, update: ContentUpdate) -> Result<ContentRecord> {
        let (channel, record) = {
            let mut state = self.lock();
            let (key, record) = state
                .documents
                .iter_mut()
                .find(|(key, record)| record.id == *document_id && self.owns(key, record))
                .ok_or_else(|| Error::NotFound(document_id.to_string()))?;
            record.content = update.content;
            record.last_edited_by = Some(update.last_edited_by);
            record.updated_at = update.updated_at;
            record.needs_parse_retry = false;
            (key.clone(), record.clone())
        };
        self.feed.publish(&channel, ContentChange::from(&record));
        Ok(record)
    }

    async fn mark_parsed(&self, document_id: &DocumentId, content: &str) -> Result<()> {
        let mut state = self.lock();
        let (_, record) = state
            .documents
            .iter_mut()
            .find(|(key, record)| record.id == *document_id && self.owns(key, record))
            .ok_or_else(|| Error::NotFound(document_id.to_string()))?;
        record.content = content.to_string();
        record.needs_parse_retry = false;
        Ok(())
    }

    fn subscribe(&self, file_id: &FileId) -> ContentSubscription {
        self.feed.subscribe(&self.adapter.channel_for(file_id))
    }
}

impl VersionStore for MemoryStore {
    async fn max_version_number(&self, document_id: &DocumentId) -> Result<i64> {
        Ok(self
            .lock()
            .versions
            .iter()
            .filter(|version| version.document_id == *document_id)
            .map(|version| version.version_number)
            .max()
            .unwrap_or(0))
    }

    async fn insert_version(&self, record: VersionRecord) -> Result<VersionRecord> {
        self.lock().versions.push(record.clone());
        Ok(record)
    }

    async fn append_version(&self, version: NewVersion) -> Result<VersionRecord> {
        let mut state = self.lock();
        let next = state
            .versions
            .iter()
            .filter(|existing| existing.document_id == version.document_id)
            .map(|existing| existing.version_number)
            .max()
            .unwrap_or(0)
            + 1;
        let record = version.into_record(next);
        state.versions.push(record.clone());
        Ok(record)
    }

    async fn latest_version(&self, document_id: &DocumentId) -> Result<Option<VersionRecord>> {
        Ok(self
            .lock()
            .versions
            .iter()
            .filter(|version| version.document_id == *document_id)
            .max_by_key(|version| (version.version_number, version.created_at))
            .cloned())
    }

    async fn list_versions(&self, document_id: &DocumentId) -> Result<Vec<VersionRecord>> {
        let mut versions: Vec<VersionRecord> = self
            .lock()
            .versions
            .iter()
            .filter(|version| version.document_id == *document_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }
}

impl PresenceStore for MemoryStore {
    async fn upsert_presence(
        &self,
        file_id: &FileId,
        user_id: &UserId,
        update: PresenceUpdate,
    ) -> Result<()> {
        let key = (self.adapter.channel_for(file_id), user_id.clone());
        let mut state = self.lock();
        let (_, record) = state.presence.entry(key).or_insert_with(|| {
            (
                self.adapter.namespace(),
                PresenceRecord {
                    file_id: file_id.clone(),
                    user_id: user_id.clone(),
                    cursor_position: None,
                    last_seen_at: update.last_seen_at,
                },
            )
        });
        record.last_seen_at = update.last_seen_at;
        if update.cursor_position.is_some() {
            record.cursor_position = update.cursor_position;
        }
        Ok(())
    }

    async fn list_fresh(
        &self,
        file_id: &FileId,
        since: i64,
        exclude_user: &UserId,
    ) -> Result<Vec<PresenceRecord>> {
        let channel = self.adapter.channel_for(file_id);
        let mut rows: Vec<PresenceRecord> = self
            .lock()
            .presence
            .iter()
            .filter(|((key, user), (_, record))| {
                *key == channel && user != exclude_user && record.last_seen_at >= since
            })
            .map(|(_, (_, record))| record.clone())
            .collect();
        rows.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(rows)
    }

    async fn delete_presence(&self, file_id: &FileId, user_id: &UserId) -> Result<()> {
        let key = (self.adapter.channel_for(file_id), user_id.clone());
        self.lock().presence.remove(&key);
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: i64) -> Result<u64> {
        let namespace = self.adapter.namespace();
        let mut state = self.lock();
        let before = state.presence.len();
        state
            .presence
            .retain(|_, (owner, record)| *owner != namespace || record.last_seen_at >= cutoff);
        Ok((before - state.presence.len()) as u64)
    }
}

impl UserDirectory for MemoryStore {
    async fn resolve_names(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, String>> {
        let wanted: HashSet<&UserId> = user_ids.iter().collect();
        Ok(self
            .lock()
            .profiles
            .iter()
            .filter(|(id, _)| wanted.contains(id))
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect())
    }

    async fn upsert_profile(&self, user_id: &UserId, display_name: &str) -> Result<()> {
        self.lock()
            .profiles
            .insert(user_id.clone(), display_name.trim().to_string());
        Ok(())
    }
}
