//! Shared services used across clients.

mod collab_store;

pub use collab_store::CollabStore;
