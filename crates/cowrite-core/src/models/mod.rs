//! Data models for cowrite

mod document;
mod ids;
mod presence;
mod version;

pub use document::{
    ContentChange, ContentRecord, ContentType, ContentUpdate, DocumentSession, SourceFile,
    EDITOR_PLACEHOLDER,
};
pub use ids::{DocumentId, FileId, UserId, VersionId};
pub use presence::{Collaborator, PresenceRecord, PresenceUpdate};
pub use version::{
    restored_from_note, NewVersion, VersionEntry, VersionRecord, AUTO_SNAPSHOT_NOTE,
    BEFORE_RESTORE_NOTE, INITIAL_VERSION_NOTE, SYSTEM_AUTHOR, UNKNOWN_AUTHOR,
};
