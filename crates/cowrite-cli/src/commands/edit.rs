use crate::commands::common::{
    open_existing_session, open_store, resolve_document_content, CommandContext,
};
use crate::error::CliError;

pub async fn run_edit(
    ctx: &CommandContext,
    file_id: &str,
    content_parts: &[String],
) -> Result<(), CliError> {
    let content = resolve_document_content(content_parts)?;
    let store = open_store(ctx).await?;
    let session = open_existing_session(ctx, store, file_id).await?;
    let document_id = session.document_id();

    if session.current_content() != content {
        session.update_content(content);
    }
    // Closing flushes the pending save and reports its failure.
    session.close().await?;

    println!("{document_id}");
    Ok(())
}
