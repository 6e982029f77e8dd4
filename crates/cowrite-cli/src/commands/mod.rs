pub mod common;
pub mod edit;
pub mod janitor;
pub mod open;
pub mod profile;
pub mod restore;
pub mod snapshot;
pub mod versions;
pub mod who;
