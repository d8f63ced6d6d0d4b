//! De Lijn API Client
//!
//! Every call goes through the same pipeline:
//! - Circuit breaker check (fail fast while the API is unhealthy)
//! - Rate limiting per quota pool (token bucket)
//! - Retrying transport (5xx, 429 and connection failures)
//! - Overall deadline covering the quota wait and every attempt
//! - Classification of the final response into [`ApiError`]
//!
//! # Example
//!
//! ```no_run
//! use delijn_client::delijn::DeLijnClient;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DeLijnClient::new("your_api_key")?;
//!     let cancel = CancellationToken::new();
//!
//!     let stop = client.get_stop_by_number(101000, &cancel).await?;
//!     println!("{} ({})", stop.description, stop.municipality);
//!
//!     let found = client.search_stops("Gent Sint-Pieters", &cancel).await?;
//!     println!("{} stops found", found.stops.len());
//!
//!     Ok(())
//! }
//! ```

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::auth::Credentials;
use super::error::{ApiError, ApiResult};
use super::types::*;
use crate::common::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter, RateLimiterConfig,
    ReqwestTransport, Request, Response, RetryPolicy, RetryTransport, Transport, TransportError,
};

/// Base URL for core operations (240 calls/min)
pub const BASE_URL_KERN: &str = "https://api.delijn.be/DLKernOpenData/v1/beta";

/// Base URL for search operations (6000 calls/min)
pub const BASE_URL_SEARCH: &str = "https://api.delijn.be/DLZoekOpenData/v1/beta";

/// Base URL for GTFS-realtime operations (shares the search quota)
pub const BASE_URL_GTFS: &str = "https://api.delijn.be/gtfs-realtime/v3";

/// Header carrying the API key
pub const AUTH_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Identifies this client
pub const CLIENT_USER_AGENT: &str = "delijn-cli/1.0";

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Endpoint family; selects the base URL and the quota pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCategory {
    Kern,
    Search,
    Gtfs,
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for a whole call: quota wait, attempts and backoff.
    /// Also bounds each single attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub kern_rate_limiter: RateLimiterConfig,
    pub search_rate_limiter: RateLimiterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub kern_base_url: String,
    pub search_base_url: String,
    pub gtfs_base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            kern_rate_limiter: RateLimiterConfig::per_minute(240),
            search_rate_limiter: RateLimiterConfig::per_minute(6000),
            circuit_breaker: CircuitBreakerConfig::default(),
            kern_base_url: BASE_URL_KERN.to_string(),
            search_base_url: BASE_URL_SEARCH.to_string(),
            gtfs_base_url: BASE_URL_GTFS.to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults with optional `DELIJN_MAX_RETRIES` / `DELIJN_TIMEOUT_SECS` overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(retries) = env_override::<u32>("DELIJN_MAX_RETRIES") {
            config = config.with_max_retries(retries);
        }
        if let Some(secs) = env_override::<u64>("DELIJN_TIMEOUT_SECS") {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        config
    }

    /// Set maximum retry attempts
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.retry = self.retry.with_max_retries(retries);
        self
    }

    /// Set the linear backoff unit between retries
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.retry = self.retry.with_backoff(backoff);
        self
    }

    /// Set the overall per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the core API quota
    pub fn with_kern_rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.kern_rate_limiter = config;
        self
    }

    /// Set the search/GTFS API quota
    pub fn with_search_rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.search_rate_limiter = config;
        self
    }

    /// Set circuit breaker failure threshold
    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_failure_threshold(threshold);
        self
    }

    /// Set circuit breaker cooldown
    pub fn with_circuit_breaker_cooldown(mut self, cooldown: Duration) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_cooldown(cooldown);
        self
    }

    /// Point all endpoint families at other hosts (e.g. a mock server)
    pub fn with_base_urls(
        mut self,
        kern: impl Into<String>,
        search: impl Into<String>,
        gtfs: impl Into<String>,
    ) -> Self {
        self.kern_base_url = kern.into();
        self.search_base_url = search.into();
        self.gtfs_base_url = gtfs.into();
        self
    }
}

fn env_override<V: std::str::FromStr>(name: &str) -> Option<V> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", name, raw);
            None
        }
    }
}

/// De Lijn open data API client
///
/// Clones share the rate limiters and the circuit breaker.
pub struct DeLijnClient<T = ReqwestTransport> {
    transport: Arc<RetryTransport<T>>,
    api_key: HeaderValue,
    circuit_breaker: Arc<Mutex<CircuitBreaker>>,
    kern_limiter: RateLimiter,
    search_limiter: RateLimiter,
    timeout: Duration,
    kern_base_url: String,
    search_base_url: String,
    gtfs_base_url: String,
}

impl<T> Clone for DeLijnClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            api_key: self.api_key.clone(),
            circuit_breaker: Arc::clone(&self.circuit_breaker),
            kern_limiter: self.kern_limiter.clone(),
            search_limiter: self.search_limiter.clone(),
            timeout: self.timeout,
            kern_base_url: self.kern_base_url.clone(),
            search_base_url: self.search_base_url.clone(),
            gtfs_base_url: self.gtfs_base_url.clone(),
        }
    }
}

impl DeLijnClient<ReqwestTransport> {
    /// Create a new client with an API key and default configuration
    pub fn new(api_key: impl Into<String>) -> ApiResult<Self> {
        Self::with_config(Credentials::new(api_key), ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(credentials: Credentials, config: ClientConfig) -> ApiResult<Self> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Self::with_transport(credentials, config, transport)
    }

    /// Create a client from environment variables
    ///
    /// Expects `DELIJN_API_KEY`; see [`ClientConfig::from_env`] for overrides.
    pub fn from_env() -> ApiResult<Self> {
        Self::with_config(Credentials::from_env()?, ClientConfig::from_env())
    }
}

impl<T: Transport> DeLijnClient<T> {
    /// Create a client over any raw transport
    pub fn with_transport(
        credentials: Credentials,
        config: ClientConfig,
        transport: T,
    ) -> ApiResult<Self> {
        for (pool, quota) in [
            ("core", &config.kern_rate_limiter),
            ("search", &config.search_rate_limiter),
        ] {
            if quota.max_requests == 0 || quota.period.is_zero() {
                return Err(ApiError::InvalidConfig(format!(
                    "{} rate limit must allow at least one request per non-zero period",
                    pool
                )));
            }
        }
        if config.timeout.is_zero() {
            return Err(ApiError::InvalidConfig("timeout must be non-zero".into()));
        }

        let mut api_key =
            HeaderValue::from_str(credentials.api_key()).map_err(|_| ApiError::InvalidApiKey)?;
        api_key.set_sensitive(true);

        Ok(Self {
            transport: Arc::new(RetryTransport::new(transport, config.retry)),
            api_key,
            circuit_breaker: Arc::new(Mutex::new(CircuitBreaker::new(config.circuit_breaker))),
            kern_limiter: RateLimiter::new(config.kern_rate_limiter),
            search_limiter: RateLimiter::new(config.search_rate_limiter),
            timeout: config.timeout,
            kern_base_url: config.kern_base_url,
            search_base_url: config.search_base_url,
            gtfs_base_url: config.gtfs_base_url,
        })
    }

    fn endpoint(&self, category: ApiCategory) -> (&str, &RateLimiter) {
        match category {
            ApiCategory::Kern => (&self.kern_base_url, &self.kern_limiter),
            ApiCategory::Search => (&self.search_base_url, &self.search_limiter),
            ApiCategory::Gtfs => (&self.gtfs_base_url, &self.search_limiter),
        }
    }

    fn headers(&self, has_body: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_HEADER, self.api_key.clone());
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));
        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }
        headers
    }

    /// Run one logical call and return the successful response
    ///
    /// Non-success statuses and transport failures are classified into
    /// [`ApiError`] here and the circuit breaker is updated accordingly.
    async fn execute(
        &self,
        category: ApiCategory,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        cancel: &CancellationToken,
    ) -> ApiResult<Response> {
        if self.circuit_breaker.lock().await.is_open() {
            return Err(ApiError::CircuitOpen);
        }

        let (base_url, limiter) = self.endpoint(category);
        let mut request = Request::new(method, format!("{}{}", base_url, path));
        request.headers = self.headers(body.is_some());
        if let Some(body) = body {
            request = request.with_body(body);
        }

        let attempt = async {
            limiter
                .acquire(cancel)
                .await
                .map_err(|_| ApiError::Cancelled)?;
            debug!(method = %request.method, url = %request.url, "Sending request");
            self.transport
                .send(request, cancel)
                .await
                .map_err(ApiError::from)
        };

        let response = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(response)) => response,
            Ok(Err(ApiError::Cancelled)) => return Err(ApiError::Cancelled),
            Ok(Err(err)) => {
                self.record_failure().await;
                return Err(err);
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Call exceeded its deadline");
                self.record_failure().await;
                return Err(ApiError::Transport(TransportError::Timeout(format!(
                    "no response within {:?}",
                    self.timeout
                ))));
            }
        };

        let status = response.status;
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.record_failure().await;
                Err(ApiError::Authentication {
                    status: status.as_u16(),
                })
            }
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => {
                self.record_failure().await;
                Err(ApiError::RateLimited {
                    retry_after: retry_after_secs(&response),
                })
            }
            s if s.as_u16() >= 400 => {
                self.record_failure().await;
                let details = response.body.text().await.unwrap_or_default();
                warn!(status = s.as_u16(), "API request failed");
                Err(ApiError::from_status(s, details))
            }
            _ => {
                self.circuit_breaker.lock().await.record_success();
                Ok(response)
            }
        }
    }

    async fn record_failure(&self) {
        self.circuit_breaker.lock().await.record_failure();
    }

    /// Perform a call and decode the JSON body
    ///
    /// Returns `Ok(None)` for `204 No Content`.
    pub async fn request<R: DeserializeOwned>(
        &self,
        category: ApiCategory,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        cancel: &CancellationToken,
    ) -> ApiResult<Option<R>> {
        let response = self.execute(category, method, path, body, cancel).await?;
        if response.status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let bytes = response.body.bytes().await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Perform a call whose response body is not needed
    pub async fn send(
        &self,
        category: ApiCategory,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        cancel: &CancellationToken,
    ) -> ApiResult<StatusCode> {
        let response = self.execute(category, method, path, body, cancel).await?;
        let status = response.status;
        response.body.drain().await;
        Ok(status)
    }

    async fn get<R: DeserializeOwned + Default>(
        &self,
        category: ApiCategory,
        path: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<R> {
        self.request(category, Method::GET, path, None, cancel)
            .await
            .map(Option::unwrap_or_default)
    }

    /// GET from the core API
    pub async fn get_kern<R: DeserializeOwned + Default>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<R> {
        self.get(ApiCategory::Kern, path, cancel).await
    }

    /// GET from the search API
    pub async fn get_search<R: DeserializeOwned + Default>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<R> {
        self.get(ApiCategory::Search, path, cancel).await
    }

    /// GET from the GTFS-realtime API
    pub async fn get_gtfs<R: DeserializeOwned + Default>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<R> {
        self.get(ApiCategory::Gtfs, path, cancel).await
    }

    // ==================== STOPS ====================

    /// Get a stop by entity number and stop number
    pub async fn get_stop(
        &self,
        entity_number: u32,
        stop_number: u32,
        cancel: &CancellationToken,
    ) -> ApiResult<Stop> {
        let path = format!("/haltes/{}/{}", entity_number, stop_number);
        self.get_kern(&path, cancel).await
    }

    /// Get a stop by its 6-digit number (the first digit is the entity)
    pub async fn get_stop_by_number(
        &self,
        stop_number: u32,
        cancel: &CancellationToken,
    ) -> ApiResult<Stop> {
        self.get_stop(entity_of(stop_number), stop_number, cancel)
            .await
    }

    /// Search stops by name
    pub async fn search_stops(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<StopsResponse> {
        let path = format!("/haltes/zoek/{}", urlencoding::encode(query));
        self.get_search(&path, cancel).await
    }

    /// Realtime departures for a stop
    pub async fn get_realtime(
        &self,
        entity_number: u32,
        stop_number: u32,
        cancel: &CancellationToken,
    ) -> ApiResult<RealtimeResponse> {
        let path = format!("/haltes/{}/{}/real-time", entity_number, stop_number);
        self.get_kern(&path, cancel).await
    }

    /// Realtime departures for a stop by its 6-digit number
    pub async fn get_realtime_by_number(
        &self,
        stop_number: u32,
        cancel: &CancellationToken,
    ) -> ApiResult<RealtimeResponse> {
        self.get_realtime(entity_of(stop_number), stop_number, cancel)
            .await
    }

    // ==================== LINES ====================

    pub async fn get_line(
        &self,
        entity_number: u32,
        line_number: u32,
        cancel: &CancellationToken,
    ) -> ApiResult<Line> {
        let path = format!("/lijnen/{}/{}", entity_number, line_number);
        self.get_kern(&path, cancel).await
    }

    /// Search lines by number or description
    pub async fn search_lines(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<LinesResponse> {
        let path = format!("/lijnen/zoek/{}", urlencoding::encode(query));
        self.get_search(&path, cancel).await
    }

    pub async fn get_line_colours(
        &self,
        entity_number: u32,
        line_number: u32,
        cancel: &CancellationToken,
    ) -> ApiResult<LineColours> {
        let path = format!("/lijnen/{}/{}/lijnkleuren", entity_number, line_number);
        self.get_kern(&path, cancel).await
    }

    // ==================== UTILITY METHODS ====================

    /// Current circuit breaker state (cooldown is not evaluated)
    pub async fn circuit_breaker_state(&self) -> CircuitState {
        self.circuit_breaker.lock().await.state()
    }

    /// Current consecutive failure count
    pub async fn circuit_breaker_failures(&self) -> u32 {
        self.circuit_breaker.lock().await.failure_count()
    }

    /// Whole tokens left in the quota pool used by `category`
    pub async fn available_rate_limit(&self, category: ApiCategory) -> u32 {
        self.endpoint(category).1.available().await
    }
}

/// Entity number encoded in the first digit of a 6-digit stop number
pub fn entity_of(stop_number: u32) -> u32 {
    stop_number / 100_000
}

fn retry_after_secs(response: &Response) -> Option<u64> {
    response
        .headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
