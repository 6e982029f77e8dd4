use crate::commands::common::{
    format_version_lines, open_existing_session, open_store, version_to_list_item,
    CommandContext, VersionListItem,
};
use crate::error::CliError;

pub async fn run_versions(ctx: &CommandContext, file_id: &str, as_json: bool) -> Result<(), CliError> {
    let store = open_store(ctx).await?;
    let session = open_existing_session(ctx, store, file_id).await?;
    let entries = session.list_versions().await;
    session.close().await?;
    let entries = entries?;

    if as_json {
        let items = entries
            .iter()
            .map(version_to_list_item)
            .collect::<Vec<VersionListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if entries.is_empty() {
        println!("No versions yet");
    } else {
        for line in format_version_lines(&entries) {
            println!("{line}");
        }
    }
    Ok(())
}
