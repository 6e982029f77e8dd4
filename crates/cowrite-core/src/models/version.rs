//! Version history models

use serde::{Deserialize, Serialize};

use crate::util::now_millis;

use super::ids::{DocumentId, FileId, UserId, VersionId};

/// Note attached to the version written when a document is first parsed
pub const INITIAL_VERSION_NOTE: &str = "Initial version from uploaded file";
/// Note attached to the snapshot taken right before a restore
pub const BEFORE_RESTORE_NOTE: &str = "Auto-saved before restore";
/// Note attached to timer-driven snapshots
pub const AUTO_SNAPSHOT_NOTE: &str = "Auto-saved";
/// Display name for versions without an author
pub const SYSTEM_AUTHOR: &str = "System";
/// Display name for authors missing from the user directory
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Note attached to the snapshot taken after restoring `version_number`
pub fn restored_from_note(version_number: i64) -> String {
    format!("Restored from version {version_number}")
}

/// Immutable snapshot of a document's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: VersionId,
    pub document_id: DocumentId,
    pub file_id: FileId,
    pub content: String,
    /// Dense 1-based sequence per document
    pub version_number: i64,
    pub version_note: Option<String>,
    pub created_by: Option<UserId>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

/// A snapshot waiting for the store to assign its version number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVersion {
    pub document_id: DocumentId,
    pub file_id: FileId,
    pub content: String,
    pub version_note: Option<String>,
    pub created_by: Option<UserId>,
}

impl NewVersion {
    /// Materialize the record once the store has picked `version_number`
    pub fn into_record(self, version_number: i64) -> VersionRecord {
        VersionRecord {
            id: VersionId::new(),
            document_id: self.document_id,
            file_id: self.file_id,
            content: self.content,
            version_number,
            version_note: self.version_note,
            created_by: self.created_by,
            created_at: now_millis(),
        }
    }
}

/// A version as listed to users, with its author resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    #[serde(flatten)]
    pub record: VersionRecord,
    pub creator_name: String,
}
