//! Realtime departures command

use anyhow::Result;
use delijn_client::delijn::Departure;
use delijn_client::DeLijnClient;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::print_json;
use super::resolver::resolve_stop;

#[derive(Debug, Serialize)]
struct DepartureRow<'a> {
    line: &'a str,
    destination: &'a str,
    scheduled: &'a str,
    realtime: bool,
    delay_seconds: i64,
}

impl<'a> From<&'a Departure> for DepartureRow<'a> {
    fn from(d: &'a Departure) -> Self {
        Self {
            line: &d.line_public_number,
            destination: &d.destination,
            scheduled: &d.scheduled_time_raw,
            realtime: d.is_realtime(),
            delay_seconds: d.delay_seconds(),
        }
    }
}

/// Whether `departure` belongs to the line given on the command line
///
/// Matches the internal line number or the public one shown on the vehicle.
fn matches_line(departure: &Departure, line: &str) -> bool {
    let line = line.trim();
    line.parse::<u32>().ok() == Some(departure.line_number) || departure.line_public_number == line
}

pub async fn run(
    client: &DeLijnClient,
    stop: &str,
    line: Option<&str>,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let stop_number = resolve_stop(client, stop, cancel).await?;
    let response = client.get_realtime_by_number(stop_number, cancel).await?;

    let rows: Vec<DepartureRow> = response
        .stop_passages
        .iter()
        .flat_map(|passage| passage.departures.iter())
        .filter(|d| line.map_or(true, |line| matches_line(d, line)))
        .take(limit)
        .map(DepartureRow::from)
        .collect();

    info!("{} departures for stop {}", rows.len(), stop_number);
    print_json(&rows)
}
