//! Document parser clients.
//!
//! Parsing is best effort: an unsupported file yields no content and no
//! error, and callers treat failures as "nothing to show yet".

mod http;
mod local;

use std::borrow::Cow;
use std::future::Future;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ContentType, SourceFile};

pub use http::HttpDocumentParser;
pub use local::LocalTextParser;

/// Messages parser backends return in place of content when extraction fails
const FAILURE_SENTINELS: [&str; 4] = [
    "unable to parse",
    "could not extract",
    "failed to parse",
    "no text content",
];

fn markup() -> &'static Regex {
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    MARKUP.get_or_init(|| Regex::new(r"<[^>]*>|&nbsp;").expect("Invalid regex"))
}

/// Input formats the parser understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    WordProcessing,
    Spreadsheet,
    Pdf,
    PlainText,
    Markdown,
    Html,
}

impl DocumentKind {
    /// Detect the kind from the mime type, falling back to the file extension
    pub fn detect(file_path: Option<&str>, mime_type: Option<&str>) -> Option<Self> {
        mime_type
            .and_then(Self::from_mime)
            .or_else(|| file_path.and_then(Self::from_path))
    }

    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/msword" => Some(Self::WordProcessing),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel"
            | "text/csv" => Some(Self::Spreadsheet),
            "application/pdf" => Some(Self::Pdf),
            "text/plain" => Some(Self::PlainText),
            "text/markdown" | "text/x-markdown" => Some(Self::Markdown),
            "text/html" => Some(Self::Html),
            _ => None,
        }
    }

    pub fn from_path(file_path: &str) -> Option<Self> {
        let extension = Path::new(file_path)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match extension.as_str() {
            "docx" | "doc" => Some(Self::WordProcessing),
            "xlsx" | "xls" | "csv" => Some(Self::Spreadsheet),
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    /// How parsed content of this kind is stored
    pub const fn content_type(self) -> ContentType {
        match self {
            Self::PlainText | Self::Markdown => ContentType::PlainText,
            Self::WordProcessing | Self::Spreadsheet | Self::Pdf | Self::Html => {
                ContentType::RichText
            }
        }
    }
}

/// Request sent to the parser service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    pub file_id: String,
    pub file_path: Option<String>,
    pub mime_type: Option<String>,
}

impl From<&SourceFile> for ParseRequest {
    fn from(file: &SourceFile) -> Self {
        Self {
            file_id: file.file_id.to_string(),
            file_path: file.file_path.clone(),
            mime_type: file.mime_type.clone(),
        }
    }
}

impl ParseRequest {
    pub fn kind(&self) -> Option<DocumentKind> {
        DocumentKind::detect(self.file_path.as_deref(), self.mime_type.as_deref())
    }
}

/// Parser reply; both fields empty means "unsupported"
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ParseOutcome {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ParseOutcome {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            content: None,
            error: Some(error.into()),
        }
    }

    pub const fn unsupported() -> Self {
        Self {
            content: None,
            error: None,
        }
    }

    /// Content worth storing, if the parser produced any
    pub fn meaningful_content(self) -> Option<String> {
        self.content.filter(|content| is_meaningful_content(content))
    }
}

/// Best-effort text extraction from uploaded binaries
pub trait DocumentParser: Send + Sync + 'static {
    fn parse(&self, request: &ParseRequest) -> impl Future<Output = Result<ParseOutcome>> + Send;
}

/// Replace markup tags and `&nbsp;` with spaces, keeping line breaks
pub fn strip_markup(content: &str) -> Cow<'_, str> {
    markup().replace_all(content, " ")
}

/// Whether `content` holds real text rather than empty markup or a failure message
pub fn is_meaningful_content(content: &str) -> bool {
    let text = strip_markup(content);
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    let lowered = text.to_ascii_lowercase();
    let lowered = lowered.trim_start_matches('[');
    !FAILURE_SENTINELS
        .iter()
        .any(|sentinel| lowered.starts_with(sentinel))
}

/// Parser chosen at runtime
pub enum ParserClient {
    Http(HttpDocumentParser),
    Local(LocalTextParser),
}

impl DocumentParser for ParserClient {
    async fn parse(&self, request: &ParseRequest) -> Result<ParseOutcome> {
        match self {
            Self::Http(parser) => parser.parse(request).await,
            Self::Local(parser) => parser.parse(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_kind_from_mime_before_extension() {
        assert_eq!(
            DocumentKind::detect(Some("report.pdf"), Some("text/plain; charset=utf-8")),
            Some(DocumentKind::PlainText)
        );
        assert_eq!(
            DocumentKind::detect(Some("uploads/Report.DOCX"), None),
            Some(DocumentKind::WordProcessing)
        );
        assert_eq!(DocumentKind::detect(Some("photo.png"), Some("image/png")), None);
        assert_eq!(DocumentKind::detect(None, None), None);
    }

    #[test]
    fn plain_kinds_store_plain_text() {
        assert_eq!(DocumentKind::Markdown.content_type(), ContentType::PlainText);
        assert_eq!(DocumentKind::Pdf.content_type(), ContentType::RichText);
    }

    #[test]
    fn strip_markup_leaves_text_and_line_breaks() {
        assert_eq!(strip_markup("<p>Hi&nbsp;there</p>\n<p>Bye</p>"), " Hi there \n Bye ");
        assert!(matches!(strip_markup("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn meaningful_content_rejects_empty_markup_and_sentinels() {
        assert!(!is_meaningful_content(""));
        assert!(!is_meaningful_content("<p></p>"));
        assert!(!is_meaningful_content("<p>&nbsp;</p>\n<br/>"));
        assert!(!is_meaningful_content("[Unable to parse document: corrupt zip]"));
        assert!(!is_meaningful_content("<p>Could not extract text from PDF</p>"));
        assert!(is_meaningful_content("<p>Quarterly numbers</p>"));
        assert!(is_meaningful_content("plain words"));
    }

    #[test]
    fn parse_request_serializes_camel_case() {
        let request = ParseRequest::from(
            &SourceFile::new("f1")
                .with_path("a/b.docx")
                .with_mime_type("application/msword"),
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["fileId"], "f1");
        assert_eq!(json["filePath"], "a/b.docx");
        assert_eq!(request.kind(), Some(DocumentKind::WordProcessing));
    }

    #[test]
    fn outcome_defaults_when_fields_missing() {
        let outcome: ParseOutcome = serde_json::from_str("{}").unwrap();
        assert_eq!(outcome, ParseOutcome::unsupported());
    }
}
