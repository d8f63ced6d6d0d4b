//! Line lookup, search and colour commands

use anyhow::Result;
use delijn_client::DeLijnClient;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::print_json;

pub async fn show(
    client: &DeLijnClient,
    entity: u32,
    line: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let line = client.get_line(entity, line, cancel).await?;
    print_json(&line)
}

pub async fn search(client: &DeLijnClient, query: &str, cancel: &CancellationToken) -> Result<()> {
    let response = client.search_lines(query, cancel).await?;
    info!("Found {} lines matching '{}'", response.lines.len(), query);
    print_json(&response.lines)
}

pub async fn colours(
    client: &DeLijnClient,
    entity: u32,
    line: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let colours = client.get_line_colours(entity, line, cancel).await?;
    print_json(&colours)
}
