//! Stop reference resolution
//!
//! A stop can be given by its 6-digit number or by (part of) its name.

use std::fmt::Write;

use delijn_client::delijn::error::{EXIT_ERROR, EXIT_NOT_FOUND};
use delijn_client::delijn::{Stop, StopsResponse};
use delijn_client::{ApiError, DeLijnClient};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Candidates listed when a name matches several stops
const MAX_LISTED_CANDIDATES: usize = 5;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no stops found matching {0:?}")]
    NoMatch(String),

    #[error("{}", describe_candidates(.query, .stops))]
    Ambiguous { query: String, stops: Vec<Stop> },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ResolveError {
    pub fn hint(&self) -> String {
        match self {
            Self::Api(err) => err.hint(),
            other => other.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoMatch(_) => EXIT_NOT_FOUND,
            Self::Ambiguous { .. } => EXIT_ERROR,
            Self::Api(err) => err.exit_code(),
        }
    }
}

fn describe_candidates(query: &str, stops: &[Stop]) -> String {
    let mut out = format!("Multiple stops match {:?}:\n", query);
    for stop in stops.iter().take(MAX_LISTED_CANDIDATES) {
        let _ = writeln!(
            out,
            "  {} - {}, {}",
            stop.number, stop.description, stop.municipality
        );
    }
    if stops.len() > MAX_LISTED_CANDIDATES {
        let _ = writeln!(out, "  ... and {} more", stops.len() - MAX_LISTED_CANDIDATES);
    }
    out.push_str("\nUse the stop number directly.");
    out
}

/// Pick the single stop in a search result
fn pick_stop(query: &str, response: StopsResponse) -> Result<u32, ResolveError> {
    match response.stops.as_slice() {
        [] => Err(ResolveError::NoMatch(query.to_string())),
        [stop] => Ok(stop.number),
        _ => Err(ResolveError::Ambiguous {
            query: query.to_string(),
            stops: response.stops,
        }),
    }
}

/// Resolve a stop number or name to a stop number
///
/// Numbers are used as-is; anything else goes through stop search.
pub async fn resolve_stop(
    client: &DeLijnClient,
    reference: &str,
    cancel: &CancellationToken,
) -> Result<u32, ResolveError> {
    let reference = reference.trim();
    if let Ok(number) = reference.parse::<u32>() {
        return Ok(number);
    }

    debug!("Resolving stop name '{}'", reference);
    let response = client.search_stops(reference, cancel).await?;
    pick_stop(reference, response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use delijn_client::{ClientConfig, Credentials};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stop(number: u32, description: &str) -> Stop {
        Stop {
            number,
            description: description.to_string(),
            municipality: "Gent".to_string(),
            ..Default::default()
        }
    }

    fn found(stops: Vec<Stop>) -> StopsResponse {
        StopsResponse {
            stops,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_match_is_picked() {
        let number = pick_stop("korenmarkt", found(vec![stop(200144, "Korenmarkt")])).unwrap();
        assert_eq!(number, 200144);
    }

    #[test]
    fn test_no_match() {
        let err = pick_stop("nowhere", found(vec![])).unwrap_err();
        assert!(matches!(err, ResolveError::NoMatch(ref q) if q == "nowhere"));
        assert_eq!(err.exit_code(), EXIT_NOT_FOUND);
    }

    #[test]
    fn test_ambiguous_lists_five_candidates() {
        let stops = (0..7).map(|i| stop(200100 + i, &format!("Station perron {}", i))).collect();
        let err = pick_stop("station", found(stops)).unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("Multiple stops match \"station\":"));
        assert!(message.contains("200104 - Station perron 4, Gent"));
        assert!(!message.contains("200105"));
        assert!(message.contains("... and 2 more"));
        assert_eq!(err.exit_code(), EXIT_ERROR);
    }

    #[tokio::test]
    async fn test_numeric_reference_skips_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let config = ClientConfig::default().with_base_urls(server.uri(), server.uri(), server.uri());
        let client = DeLijnClient::with_config(Credentials::new("key"), config).unwrap();

        let number = resolve_stop(&client, " 101000 ", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(number, 101000);
    }

    #[tokio::test]
    async fn test_name_reference_searches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/haltes/zoek/Gent%20Korenmarkt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "haltes": [{"haltenummer": 200144, "omschrijving": "Korenmarkt"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ClientConfig::default().with_base_urls(server.uri(), server.uri(), server.uri());
        let client = DeLijnClient::with_config(Credentials::new("key"), config).unwrap();

        let number = resolve_stop(&client, "Gent Korenmarkt", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(number, 200144);
    }

    #[tokio::test]
    async fn test_search_failure_keeps_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let config = ClientConfig::default().with_base_urls(server.uri(), server.uri(), server.uri());
        let client = DeLijnClient::with_config(Credentials::new("key"), config).unwrap();

        let err = resolve_stop(&client, "Korenmarkt", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Api(ApiError::Authentication { status: 401 })));
        assert!(err.hint().contains("DELIJN_API_KEY"));
    }
}
