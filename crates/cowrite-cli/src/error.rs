use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] cowrite_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No document content provided")]
    EmptyContent,
    #[error("Display name cannot be empty")]
    EmptyDisplayName,
    #[error("File ID cannot be empty")]
    EmptyFileId,
    #[error("No document exists for file: {0}")]
    DocumentNotFound(String),
    #[error("No acting user. Pass --user or set COWRITE_USER.")]
    MissingUser,
    #[error("The data-room namespace requires --scope <room id>")]
    MissingScope,
    #[error("Configuration error: {0}")]
    Config(String),
}
