//! Live document models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::util::{normalize_text_option, now_millis};

use super::ids::{DocumentId, FileId, UserId};

/// Text shown by editors when a document has no extractable content yet.
pub const EDITOR_PLACEHOLDER: &str =
    "This file could not be converted automatically. Start typing to add content.";

/// Storage format of a document's content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    RichText,
    PlainText,
}

impl ContentType {
    /// Stable column value
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RichText => "rich_text",
            Self::PlainText => "plain_text",
        }
    }

    /// Content stored for a document that has nothing parsed yet
    pub const fn empty_content(self) -> &'static str {
        match self {
            Self::RichText => "<p></p>",
            Self::PlainText => "",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rich_text" => Ok(Self::RichText),
            "plain_text" => Ok(Self::PlainText),
            other => Err(Error::InvalidInput(format!("unknown content type: {other}"))),
        }
    }
}

/// The uploaded file an editor is opening
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub file_id: FileId,
    /// Storage path of the uploaded binary, if any
    pub file_path: Option<String>,
    pub mime_type: Option<String>,
}

impl SourceFile {
    pub fn new(file_id: impl Into<FileId>) -> Self {
        Self {
            file_id: file_id.into(),
            file_path: None,
            mime_type: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = normalize_text_option(Some(file_path.into()));
        self
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = normalize_text_option(Some(mime_type.into()));
        self
    }

    /// Whether there is anything the parser could be pointed at
    pub const fn has_source(&self) -> bool {
        self.file_path.is_some() || self.mime_type.is_some()
    }
}

/// Content Store row: the single live copy of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: DocumentId,
    pub file_id: FileId,
    pub content: String,
    pub content_type: ContentType,
    /// Most recent writer; the last-write-wins tie-break
    pub last_edited_by: Option<UserId>,
    /// Last write timestamp (Unix ms)
    pub updated_at: i64,
    /// Set while the content is a placeholder that a later open should try to parse again
    pub needs_parse_retry: bool,
}

impl ContentRecord {
    /// Create a record seeded with parsed content
    pub fn new(
        file_id: FileId,
        content: impl Into<String>,
        content_type: ContentType,
        created_by: Option<UserId>,
    ) -> Self {
        Self {
            id: DocumentId::new(),
            file_id,
            content: content.into(),
            content_type,
            last_edited_by: created_by,
            updated_at: now_millis(),
            needs_parse_retry: false,
        }
    }

    /// Create an empty record that still waits for parseable content
    pub fn placeholder(file_id: FileId, content_type: ContentType, created_by: Option<UserId>) -> Self {
        Self {
            needs_parse_retry: true,
            ..Self::new(file_id, content_type.empty_content(), content_type, created_by)
        }
    }
}

/// Fields written by a content save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUpdate {
    pub content: String,
    pub last_edited_by: UserId,
    pub updated_at: i64,
}

impl ContentUpdate {
    pub fn new(content: impl Into<String>, last_edited_by: UserId) -> Self {
        Self {
            content: content.into(),
            last_edited_by,
            updated_at: now_millis(),
        }
    }
}

/// Change event published for every content update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChange {
    pub document_id: DocumentId,
    pub file_id: FileId,
    pub content: String,
    pub last_edited_by: Option<UserId>,
    pub updated_at: i64,
}

impl From<&ContentRecord> for ContentChange {
    fn from(record: &ContentRecord) -> Self {
        Self {
            document_id: record.id,
            file_id: record.file_id.clone(),
            content: record.content.clone(),
            last_edited_by: record.last_edited_by.clone(),
            updated_at: record.updated_at,
        }
    }
}

/// An opened document as seen by one editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSession {
    pub file_id: FileId,
    pub document_id: DocumentId,
    pub content: String,
    pub content_type: ContentType,
    /// Nothing could be extracted from the source file and nobody has saved yet
    #[serde(default)]
    pub awaiting_content: bool,
}

impl DocumentSession {
    pub fn from_record(record: &ContentRecord) -> Self {
        Self {
            file_id: record.file_id.clone(),
            document_id: record.id,
            content: record.content.clone(),
            content_type: record.content_type,
            awaiting_content: record.needs_parse_retry,
        }
    }

    /// Content to show a reader: [`EDITOR_PLACEHOLDER`] while the document
    /// is still waiting for content, the stored content otherwise
    pub fn display_content(&self) -> &str {
        if self.awaiting_content {
            EDITOR_PLACEHOLDER
        } else {
            &self.content
        }
    }
}
