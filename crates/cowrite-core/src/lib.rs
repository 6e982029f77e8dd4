//! cowrite-core - Collaborative document editing
//!
//! Shared models, libSQL-backed stores, the document parser client, and the
//! session components that let several editors work on one document while
//! keeping a version history and a presence roster.

pub mod adapter;
pub mod collab;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod parser;
pub mod services;
pub mod store;
pub mod util;

pub use adapter::{DocumentNamespace, StorageAdapter};
pub use collab::{EditorSession, SessionEvent, SessionLoader};
pub use config::{CollabConfig, ParserConfig};
pub use error::{Error, Result};
pub use models::{DocumentId, DocumentSession, FileId, SourceFile, UserId};
pub use services::CollabStore;
