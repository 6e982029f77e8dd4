use std::sync::Arc;

use cowrite_core::{SessionLoader, SourceFile};

use crate::commands::common::{
    format_document, normalize_file_id, open_store, parser_from_env, CommandContext,
};
use crate::error::CliError;

pub async fn run_open(
    ctx: &CommandContext,
    file_id: &str,
    path: Option<String>,
    mime: Option<String>,
    as_json: bool,
) -> Result<(), CliError> {
    let mut file = SourceFile::new(normalize_file_id(file_id)?);
    if let Some(path) = path {
        file = file.with_path(path);
    }
    if let Some(mime) = mime {
        file = file.with_mime_type(mime);
    }

    let store = Arc::new(open_store(ctx).await?);
    let loader = SessionLoader::new(store, Arc::new(parser_from_env()?))
        .with_io_timeout(ctx.config.io_timeout());
    let document = loader.load_or_create(&file, &ctx.user_id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        println!("{}", format_document(&document));
    }
    Ok(())
}
