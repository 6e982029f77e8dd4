use crate::commands::common::{normalize_content, open_existing_session, open_store, CommandContext};
use crate::error::CliError;

pub async fn run_snapshot(
    ctx: &CommandContext,
    file_id: &str,
    note: Option<&str>,
) -> Result<(), CliError> {
    let note = note.and_then(normalize_content);
    let store = open_store(ctx).await?;
    let session = open_existing_session(ctx, store, file_id).await?;
    let created = session.snapshot(note.as_deref()).await;
    session.close().await?;

    match created? {
        Some(version) => println!("v{}", version.version_number),
        None => println!("Unchanged since the latest version"),
    }
    Ok(())
}
