//! Store contracts used by the collaborative editing session.
//!
//! Every method returns a `Send` future so components can drive the stores
//! from spawned timer tasks.

mod memory;

use std::collections::HashMap;
use std::future::Future;

use crate::error::Result;
use crate::feed::ContentSubscription;
use crate::models::{
    ContentRecord, ContentUpdate, DocumentId, FileId, NewVersion, PresenceRecord, PresenceUpdate,
    UserId, VersionRecord,
};

pub use memory::MemoryStore;

/// Durable live-content rows, at most one per file
pub trait ContentStore: Send + Sync + 'static {
    /// Fetch the record for a file
    fn get(&self, file_id: &FileId) -> impl Future<Output = Result<Option<ContentRecord>>> + Send;

    /// Insert a new record. Fails with a conflict if the file already has one.
    fn insert(&self, record: ContentRecord) -> impl Future<Output = Result<ContentRecord>> + Send;

    /// Overwrite content; last write wins. Publishes a change event.
    fn update(
        &self,
        document_id: &DocumentId,
        update: ContentUpdate,
    ) -> impl Future<Output = Result<ContentRecord>> + Send;

    /// Replace placeholder content with freshly parsed content and clear the retry flag
    fn mark_parsed(
        &self,
        document_id: &DocumentId,
        content: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Subscribe to updates of a file's record
    fn subscribe(&self, file_id: &FileId) -> ContentSubscription;
}

/// Append-only snapshot log
pub trait VersionStore: Send + Sync + 'static {
    /// Highest version number of a document, 0 when it has none
    fn max_version_number(
        &self,
        document_id: &DocumentId,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Insert a record with an explicit version number
    fn insert_version(&self, record: VersionRecord) -> impl Future<Output = Result<VersionRecord>> + Send;

    /// Append a snapshot, numbering it atomically as `max + 1`
    fn append_version(&self, version: NewVersion) -> impl Future<Output = Result<VersionRecord>> + Send;

    /// Most recently created version of a document
    fn latest_version(
        &self,
        document_id: &DocumentId,
    ) -> impl Future<Output = Result<Option<VersionRecord>>> + Send;

    /// All versions of a document, newest version number first
    fn list_versions(
        &self,
        document_id: &DocumentId,
    ) -> impl Future<Output = Result<Vec<VersionRecord>>> + Send;
}

/// Ephemeral heartbeat rows keyed by (file, user)
pub trait PresenceStore: Send + Sync + 'static {
    fn upsert_presence(
        &self,
        file_id: &FileId,
        user_id: &UserId,
        update: PresenceUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Rows of a file seen at or after `since` (Unix ms), excluding one user
    fn list_fresh(
        &self,
        file_id: &FileId,
        since: i64,
        exclude_user: &UserId,
    ) -> impl Future<Output = Result<Vec<PresenceRecord>>> + Send;

    fn delete_presence(&self, file_id: &FileId, user_id: &UserId) -> impl Future<Output = Result<()>> + Send;

    /// Delete every row of the namespace last seen before `cutoff`; returns the count
    fn purge_older_than(&self, cutoff: i64) -> impl Future<Output = Result<u64>> + Send;
}

/// Display names of collaborators
pub trait UserDirectory: Send + Sync + 'static {
    /// Batched lookup; ids without a profile are absent from the map
    fn resolve_names(
        &self,
        user_ids: &[UserId],
    ) -> impl Future<Output = Result<HashMap<UserId, String>>> + Send;

    fn upsert_profile(
        &self,
        user_id: &UserId,
        display_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Everything an editor session needs from its backend
pub trait CollabBackend: ContentStore + VersionStore + PresenceStore + UserDirectory {}

impl<T> CollabBackend for T where T: ContentStore + VersionStore + PresenceStore + UserDirectory {}
