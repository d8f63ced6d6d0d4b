//! De Lijn Open Data API Library
//!
//! Client for the De Lijn (Flemish public transport) open data API.
//!
//! # Features
//!
//! - **Rate Limiting**: Token bucket per quota pool (core 240/min, search 6000/min)
//! - **Circuit Breaker**: Fails fast after consecutive failures, recovers after a cooldown
//! - **Retry with Linear Backoff**: Retries 5xx, 429 and connection failures
//! - **Typed Errors**: Every outcome is a distinct [`ApiError`] variant
//!
//! # Environment Variables
//!
//! ```no_run
//! use delijn_client::delijn::DeLijnClient;
//!
//! // Expects DELIJN_API_KEY
//! let client = DeLijnClient::from_env().expect("Missing API key");
//! ```
//!
//! # Modules
//!
//! - [`auth`]: API key handling
//! - [`client`]: Main API client implementation
//! - [`error`]: Error taxonomy, user hints and exit codes
//! - [`types`]: Response type definitions

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use auth::Credentials;
pub use client::{
    entity_of, ApiCategory, ClientConfig, DeLijnClient, BASE_URL_GTFS, BASE_URL_KERN,
    BASE_URL_SEARCH,
};
pub use error::{ApiError, ApiResult};
pub use types::{
    parse_api_time, Colour, Departure, GeoCoord, Line, LineColours, LinesResponse, Link,
    RealtimeResponse, Stop, StopPassage, StopsResponse,
};
