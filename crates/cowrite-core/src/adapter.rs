//! Storage adapter: where a family of documents lives.
//!
//! Drive files and data-room files run the same editing state machine; they
//! only differ in the tables they persist to, the change channels they
//! publish on, and the scope (data room) a file belongs to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::models::FileId;

/// Document family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentNamespace {
    Drive,
    DataRoom,
}

impl DocumentNamespace {
    pub const ALL: [Self; 2] = [Self::Drive, Self::DataRoom];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drive => "drive",
            Self::DataRoom => "data_room",
        }
    }

    pub const fn documents_table(self) -> &'static str {
        match self {
            Self::Drive => "drive_documents",
            Self::DataRoom => "data_room_documents",
        }
    }

    pub const fn versions_table(self) -> &'static str {
        match self {
            Self::Drive => "drive_document_versions",
            Self::DataRoom => "data_room_document_versions",
        }
    }

    pub const fn presence_table(self) -> &'static str {
        match self {
            Self::Drive => "drive_document_presence",
            Self::DataRoom => "data_room_document_presence",
        }
    }
}

impl fmt::Display for DocumentNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentNamespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "drive" => Ok(Self::Drive),
            "data_room" | "dataroom" => Ok(Self::DataRoom),
            other => Err(Error::InvalidInput(format!("unknown namespace: {other}"))),
        }
    }
}

/// Namespace plus scoping id for every store call a session makes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageAdapter {
    namespace: DocumentNamespace,
    /// Owning data room; empty for drive files
    scope_id: String,
}

impl StorageAdapter {
    /// Adapter for generic drive files
    pub const fn drive() -> Self {
        Self {
            namespace: DocumentNamespace::Drive,
            scope_id: String::new(),
        }
    }

    /// Adapter for files inside one data room
    pub fn data_room(room_id: impl Into<String>) -> Self {
        Self {
            namespace: DocumentNamespace::DataRoom,
            scope_id: room_id.into(),
        }
    }

    pub fn new(namespace: DocumentNamespace, scope_id: Option<String>) -> Self {
        Self {
            namespace,
            scope_id: scope_id.unwrap_or_default(),
        }
    }

    pub const fn namespace(&self) -> DocumentNamespace {
        self.namespace
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub const fn documents_table(&self) -> &'static str {
        self.namespace.documents_table()
    }

    pub const fn versions_table(&self) -> &'static str {
        self.namespace.versions_table()
    }

    pub const fn presence_table(&self) -> &'static str {
        self.namespace.presence_table()
    }

    /// Change channel carrying content updates of `file_id`
    pub fn channel_for(&self, file_id: &FileId) -> String {
        if self.scope_id.is_empty() {
            format!("{}:{}", self.namespace, file_id)
        } else {
            format!("{}:{}:{}", self.namespace, self.scope_id, file_id)
        }
    }
}

impl Default for StorageAdapter {
    fn default() -> Self {
        Self::drive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_include_scope_when_present() {
        let file = FileId::from("f1");
        assert_eq!(StorageAdapter::drive().channel_for(&file), "drive:f1");
        assert_eq!(
            StorageAdapter::data_room("room-9").channel_for(&file),
            "data_room:room-9:f1"
        );
    }

    #[test]
    fn namespaces_use_distinct_tables() {
        let drive = StorageAdapter::drive();
        let room = StorageAdapter::data_room("r");
        assert_ne!(drive.documents_table(), room.documents_table());
        assert_ne!(drive.versions_table(), room.versions_table());
        assert_ne!(drive.presence_table(), room.presence_table());
    }

    #[test]
    fn namespace_parses_cli_spellings() {
        assert_eq!(
            "data-room".parse::<DocumentNamespace>().unwrap(),
            DocumentNamespace::DataRoom
        );
        assert_eq!(
            "Drive".parse::<DocumentNamespace>().unwrap(),
            DocumentNamespace::Drive
        );
        assert!("bucket".parse::<DocumentNamespace>().is_err());
    }
}
