//! Error types for cowrite-core

use thiserror::Error;

/// Result type alias using cowrite-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cowrite-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Document parser service error
    #[error("Parser error: {0}")]
    Parser(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A store or parser call exceeded the configured I/O bound
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

impl Error {
    /// Whether the error came from a unique index rejecting a duplicate row.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::LibSql(error) => error.to_string().contains("UNIQUE constraint failed"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_counts_as_unique_violation() {
        assert!(Error::Conflict("file-1".into()).is_unique_violation());
        assert!(!Error::NotFound("file-1".into()).is_unique_violation());
    }

    #[test]
    fn timeout_names_the_operation() {
        assert_eq!(
            Error::Timeout("content save").to_string(),
            "Timed out waiting for content save"
        );
    }
}
