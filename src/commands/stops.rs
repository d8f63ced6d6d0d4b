//! Stop lookup and search commands

use anyhow::Result;
use delijn_client::DeLijnClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::print_json;
use super::resolver::resolve_stop;

pub async fn show(client: &DeLijnClient, stop: &str, cancel: &CancellationToken) -> Result<()> {
    let stop_number = resolve_stop(client, stop, cancel).await?;
    debug!("Fetching stop {}", stop_number);
    let stop = client.get_stop_by_number(stop_number, cancel).await?;
    print_json(&stop)
}

pub async fn search(client: &DeLijnClient, query: &str, cancel: &CancellationToken) -> Result<()> {
    let response = client.search_stops(query, cancel).await?;
    info!("Found {} stops matching '{}'", response.stops.len(), query);
    print_json(&response.stops)
}
