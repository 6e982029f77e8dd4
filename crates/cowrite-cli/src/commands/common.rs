use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use cowrite_core::collab::EditorSession;
use cowrite_core::config::parse_collab_config;
use cowrite_core::db::RemoteConfig;
use cowrite_core::models::{Collaborator, DocumentSession, VersionEntry};
use cowrite_core::parser::{strip_markup, HttpDocumentParser, LocalTextParser, ParserClient};
use cowrite_core::store::ContentStore;
use cowrite_core::{
    CollabConfig, CollabStore, DocumentNamespace, FileId, ParserConfig, StorageAdapter, UserId,
};
use serde::Serialize;

use crate::cli::Cli;
use crate::error::CliError;

/// Everything a subcommand needs, resolved from flags and the environment
pub struct CommandContext {
    pub db_path: PathBuf,
    pub adapter: StorageAdapter,
    pub user_id: UserId,
    pub config: CollabConfig,
}

impl CommandContext {
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let namespace = DocumentNamespace::from(cli.namespace);
        let scope = cli
            .scope
            .as_deref()
            .map(str::trim)
            .filter(|scope| !scope.is_empty())
            .map(str::to_string);
        if namespace == DocumentNamespace::DataRoom && scope.is_none() {
            return Err(CliError::MissingScope);
        }

        Ok(Self {
            db_path: resolve_db_path(cli.db_path.clone()),
            adapter: StorageAdapter::new(namespace, scope),
            user_id: resolve_user(cli.user.clone())?,
            config: load_collab_config(cli.config.as_deref())?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct VersionListItem {
    pub version_number: i64,
    pub note: Option<String>,
    pub creator: String,
    pub created_at: i64,
    pub created_at_iso: String,
    pub preview: String,
}

#[derive(Debug, Serialize)]
pub struct CollaboratorItem {
    pub user_id: String,
    pub display_name: String,
    pub cursor_position: Option<i64>,
    pub last_seen_at: i64,
    pub relative_time: String,
}

pub async fn open_store(ctx: &CommandContext) -> Result<CollabStore, CliError> {
    let store = match remote_config_from_env() {
        Some(remote) => CollabStore::open_remote(&remote, ctx.adapter.clone()).await?,
        None => CollabStore::open_path(&ctx.db_path, ctx.adapter.clone()).await?,
    };
    Ok(store.with_poll_interval(ctx.config.change_poll_interval()))
}

/// Start a session on a document that must already exist
pub async fn open_existing_session(
    ctx: &CommandContext,
    store: CollabStore,
    file_id: &str,
) -> Result<EditorSession<CollabStore>, CliError> {
    let file_id = normalize_file_id(file_id)?;
    let record = store
        .get(&file_id)
        .await?
        .ok_or_else(|| CliError::DocumentNotFound(file_id.to_string()))?;

    Ok(EditorSession::start(
        Arc::new(store),
        DocumentSession::from_record(&record),
        ctx.user_id.clone(),
        &ctx.config,
    )
    .await)
}

pub fn parser_from_env() -> Result<ParserClient, CliError> {
    let config = ParserConfig::new(
        env::var("COWRITE_PARSER_URL").ok(),
        env::var("COWRITE_PARSER_TOKEN").ok(),
    )?;
    match HttpDocumentParser::from_config(&config)? {
        Some(parser) => {
            tracing::debug!("Using parser service at {}", parser.endpoint());
            Ok(ParserClient::Http(parser))
        }
        None => Ok(ParserClient::Local(LocalTextParser::new())),
    }
}

pub fn remote_config_from_env() -> Option<RemoteConfig> {
    let url = env::var("COWRITE_DATABASE_URL").ok()?;
    let auth_token = env::var("COWRITE_AUTH_TOKEN").ok()?;

    if url.trim().is_empty() || auth_token.trim().is_empty() {
        return None;
    }

    Some(RemoteConfig::new(url.trim(), auth_token.trim()))
}

pub fn load_collab_config(path: Option<&Path>) -> Result<CollabConfig, CliError> {
    let Some(path) = path else {
        return Ok(CollabConfig::default());
    };
    let payload = std::fs::read_to_string(path)
        .map_err(|error| CliError::Config(format!("failed to read {}: {error}", path.display())))?;
    parse_collab_config(&payload).map_err(|error| CliError::Config(error.to_string()))
}

pub fn resolve_user(cli_user: Option<String>) -> Result<UserId, CliError> {
    [
        cli_user,
        env::var("COWRITE_USER").ok(),
        env::var("USER").ok(),
        env::var("USERNAME").ok(),
    ]
    .into_iter()
    .flatten()
    .find_map(|user| normalize_content(&user))
    .map(UserId::from)
    .ok_or(CliError::MissingUser)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("COWRITE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cowrite")
        .join("cowrite.db")
}

pub fn normalize_file_id(file_id: &str) -> Result<FileId, CliError> {
    normalize_content(file_id)
        .map(FileId::from)
        .ok_or(CliError::EmptyFileId)
}

pub fn resolve_document_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

/// Header line with id and content type, then the content or the editor placeholder
pub fn format_document(document: &DocumentSession) -> String {
    format!(
        "{}  {}\n{}",
        document.document_id,
        document.content_type,
        document.display_content()
    )
}

pub fn version_to_list_item(entry: &VersionEntry) -> VersionListItem {
    VersionListItem {
        version_number: entry.record.version_number,
        note: entry.record.version_note.clone(),
        creator: entry.creator_name.clone(),
        created_at: entry.record.created_at,
        created_at_iso: format_timestamp(entry.record.created_at),
        preview: content_preview(&entry.record.content, 80),
    }
}

pub fn format_version_lines(entries: &[VersionEntry]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            let number = format!("v{}", entry.record.version_number);
            let relative_time = format_relative_time(entry.record.created_at, now_ms);
            let note = entry.record.version_note.as_deref().unwrap_or("");
            format!(
                "{number:<5}  {:<16}  {relative_time:<10}  {note}",
                entry.creator_name
            )
        })
        .collect()
}

pub fn collaborator_to_item(collaborator: &Collaborator) -> CollaboratorItem {
    let now_ms = Utc::now().timestamp_millis();
    CollaboratorItem {
        user_id: collaborator.user_id.to_string(),
        display_name: collaborator.display_name.clone(),
        cursor_position: collaborator.cursor_position,
        last_seen_at: collaborator.last_seen_at,
        relative_time: format_relative_time(collaborator.last_seen_at, now_ms),
    }
}

/// First line of content with markup tags removed, truncated with an ellipsis
pub fn content_preview(content: &str, max_chars: usize) -> String {
    let text = strip_markup(content);
    let first_line = text.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("");
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
