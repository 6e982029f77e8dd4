//! Presence models

use serde::{Deserialize, Serialize};

use super::ids::{FileId, UserId};

/// Heartbeat row, one per (file, user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub file_id: FileId,
    pub user_id: UserId,
    pub cursor_position: Option<i64>,
    /// Last heartbeat (Unix ms)
    pub last_seen_at: i64,
}

/// Fields written by a heartbeat. A `None` cursor keeps the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub cursor_position: Option<i64>,
    pub last_seen_at: i64,
}

/// Another editor currently present on the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub user_id: UserId,
    pub display_name: String,
    pub cursor_position: Option<i64>,
    pub last_seen_at: i64,
}
