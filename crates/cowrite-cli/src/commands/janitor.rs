use std::time::Duration;

use cowrite_core::collab::sweep_stale_presence;

use crate::commands::common::{open_store, CommandContext};
use crate::error::CliError;

pub async fn run_janitor(ctx: &CommandContext, retention_secs: Option<u64>) -> Result<(), CliError> {
    let retention = match retention_secs {
        Some(0) => return Err(CliError::Config("retention must be greater than zero".to_string())),
        Some(secs) => Duration::from_secs(secs),
        None => ctx.config.presence_retention(),
    };

    let store = open_store(ctx).await?;
    let purged = sweep_stale_presence(&store, retention).await?;
    println!("Purged {purged} presence rows from {}", ctx.adapter.namespace());
    Ok(())
}
