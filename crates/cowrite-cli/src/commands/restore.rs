use crate::commands::common::{open_existing_session, open_store, CommandContext};
use crate::error::CliError;

pub async fn run_restore(
    ctx: &CommandContext,
    file_id: &str,
    version_number: i64,
) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let session = open_existing_session(ctx, store, file_id).await?;
    let restored = session.restore(version_number).await;
    session.close().await?;

    let restored = restored?;
    println!("Restored v{}", restored.version_number);
    Ok(())
}
