use crate::commands::common::{
    collaborator_to_item, open_existing_session, open_store, CollaboratorItem, CommandContext,
};
use crate::error::CliError;

pub async fn run_who(ctx: &CommandContext, file_id: &str, as_json: bool) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let session = open_existing_session(ctx, store, file_id).await?;
    let roster = session.refresh_roster().await;
    session.close().await?;

    let items = roster?
        .iter()
        .map(collaborator_to_item)
        .collect::<Vec<CollaboratorItem>>();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("Nobody else is here");
    } else {
        for item in items {
            println!("{:<24}  {}", item.display_name, item.relative_time);
        }
    }
    Ok(())
}
