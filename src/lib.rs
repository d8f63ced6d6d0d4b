//! De Lijn API Client
//!
//! Resilient client for the De Lijn open data API. Every outbound call passes
//! through a circuit breaker, a per-pool token-bucket rate limiter and a
//! retrying transport before its outcome is classified into an [`ApiError`].

pub mod common;
pub mod delijn;

pub use common::{CircuitState, RateLimiterConfig, RetryPolicy};
pub use delijn::{ApiCategory, ApiError, ApiResult, ClientConfig, Credentials, DeLijnClient};
