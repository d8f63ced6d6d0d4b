//! Resilience building blocks for outbound API calls
//!
//! This module contains the pieces the API client composes per request:
//! - Rate limiter using token bucket algorithm
//! - Circuit breaker pattern for fault tolerance
//! - Request/response envelope and the raw transport
//! - Retry logic with replayable bodies and linear backoff

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;
pub mod transport;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, WaitCancelled};
pub use retry::{RetryPolicy, RetryTransport};
pub use transport::{
    ReplayableBody, ReqwestTransport, Request, RequestBody, Response, ResponseBody, Transport,
    TransportError,
};
