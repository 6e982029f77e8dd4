use cowrite_core::store::UserDirectory;
use cowrite_core::UserId;

use crate::commands::common::{normalize_content, open_store, CommandContext};
use crate::error::CliError;

pub async fn run_profile(
    ctx: &CommandContext,
    user_id: &str,
    display_name_parts: &[String],
) -> Result<(), CliError> {
    let user_id = normalize_content(user_id).ok_or(CliError::MissingUser)?;
    let display_name =
        normalize_content(&display_name_parts.join(" ")).ok_or(CliError::EmptyDisplayName)?;

    let store = open_store(ctx).await?;
    store
        .upsert_profile(&UserId::from(user_id.as_str()), &display_name)
        .await?;
    println!("{user_id}  {display_name}");
    Ok(())
}
