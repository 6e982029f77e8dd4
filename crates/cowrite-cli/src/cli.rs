use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cowrite_core::DocumentNamespace;

#[derive(Parser)]
#[command(name = "cowrite")]
#[command(about = "Edit shared documents with version history and presence")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Document namespace
    #[arg(long, global = true, value_enum, default_value_t = Namespace::Drive)]
    pub namespace: Namespace,

    /// Data room id (required for the data-room namespace)
    #[arg(long, global = true, value_name = "ID")]
    pub scope: Option<String>,

    /// Acting user id (defaults to COWRITE_USER, then the OS user)
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// JSON file with session timing overrides
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open (or create) the document for an uploaded file
    Open {
        file_id: String,
        /// Source path of the uploaded file
        #[arg(long)]
        path: Option<String>,
        /// Mime type of the uploaded file
        #[arg(long)]
        mime: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace a document's content (reads stdin when no content is given)
    Edit {
        file_id: String,
        content: Vec<String>,
    },
    /// List a document's versions
    Versions {
        file_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Snapshot the current content
    Snapshot {
        file_id: String,
        /// Note stored with the version
        #[arg(long)]
        note: Option<String>,
    },
    /// Make an earlier version live again
    Restore {
        file_id: String,
        version_number: i64,
    },
    /// Show who else is editing a document
    Who {
        file_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register a display name
    Profile {
        user_id: String,
        display_name: Vec<String>,
    },
    /// Delete presence rows past the retention window
    Janitor {
        /// Override the retention window in seconds
        #[arg(long)]
        retention_secs: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Namespace {
    Drive,
    DataRoom,
}

impl From<Namespace> for DocumentNamespace {
    fn from(namespace: Namespace) -> Self {
        match namespace {
            Namespace::Drive => Self::Drive,
            Namespace::DataRoom => Self::DataRoom,
        }
    }
}
