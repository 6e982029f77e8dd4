//! Database layer for cowrite

mod connection;
mod content_repository;
mod migrations;
mod presence_repository;
mod profile_repository;
mod values;
mod version_repository;

pub use connection::{Database, RemoteConfig};
pub use content_repository::LibSqlContentRepository;
pub use presence_repository::LibSqlPresenceRepository;
pub use profile_repository::LibSqlProfileRepository;
pub use version_repository::LibSqlVersionRepository;
