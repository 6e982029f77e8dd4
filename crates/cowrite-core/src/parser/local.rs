//! Offline parser for text formats readable straight from disk.

use std::path::PathBuf;

use super::{DocumentKind, DocumentParser, ParseOutcome, ParseRequest};
use crate::error::Result;

/// Reads plain text, markdown, and HTML files relative to a root directory.
/// Binary formats come back unsupported.
#[derive(Debug, Clone, Default)]
pub struct LocalTextParser {
    root: Option<PathBuf>,
}

impl LocalTextParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative file paths against `root`
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn resolve(&self, file_path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(file_path),
            None => PathBuf::from(file_path),
        }
    }
}

impl DocumentParser for LocalTextParser {
    async fn parse(&self, request: &ParseRequest) -> Result<ParseOutcome> {
        let Some(file_path) = request.file_path.as_deref() else {
            return Ok(ParseOutcome::unsupported());
        };
        let kind = request.kind();
        if !matches!(
            kind,
            Some(DocumentKind::PlainText | DocumentKind::Markdown | DocumentKind::Html)
        ) {
            tracing::debug!(file_path, ?kind, "No local parser for file");
            return Ok(ParseOutcome::unsupported());
        }

        match tokio::fs::read_to_string(self.resolve(file_path)).await {
            Ok(content) => Ok(ParseOutcome::content(content)),
            Err(error) => Ok(ParseOutcome::failed(format!(
                "Unable to parse {file_path}: {error}"
            ))),
        }
    }
}
