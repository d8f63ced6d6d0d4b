//! Circuit Breaker pattern implementation for fault tolerance
//!
//! The circuit breaker stops requests to a failing service after a run of
//! consecutive failures and lets them through again once a cooldown has
//! passed since the last failure.
//!
//! States:
//! - Closed: Normal operation, requests pass through
//! - Open: Service is failing, requests are rejected
//!
//! There is no half-open probe state. Recovery is evaluated lazily by
//! [`CircuitBreaker::is_open`].

use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    #[default]
    Closed,
    /// Service is failing - requests are rejected immediately
    Open,
}

/// Configuration for the circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long after the last failure the circuit stays open
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration with custom failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Create a new configuration with custom cooldown
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Circuit breaker for managing service failures
///
/// The breaker itself is not synchronized; owners share it behind a mutex.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use delijn_client::common::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
///
/// let config = CircuitBreakerConfig::default()
///     .with_failure_threshold(3)
///     .with_cooldown(Duration::from_secs(30));
///
/// let mut cb = CircuitBreaker::new(config);
///
/// // Circuit starts closed
/// assert!(!cb.is_open());
///
/// // Record failures
/// cb.record_failure();
/// cb.record_failure();
/// cb.record_failure();
///
/// // Circuit is now open
/// assert_eq!(cb.state(), CircuitState::Open);
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    config: CircuitBreakerConfig,
    last_failure_time: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            config,
            last_failure_time: None,
        }
    }

    /// Create a circuit breaker with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Get the last recorded state, without evaluating the cooldown
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Check whether requests should be rejected
    ///
    /// An open circuit whose cooldown has elapsed since the last failure is
    /// closed here, and its failure count reset.
    pub fn is_open(&mut self) -> bool {
        if self.state == CircuitState::Closed {
            return false;
        }

        let cooled_down = self
            .last_failure_time
            .map_or(true, |last| last.elapsed() > self.config.cooldown);

        if cooled_down {
            tracing::info!("Circuit breaker closed after cooldown");
            self.state = CircuitState::Closed;
            self.failure_count = 0;
            return false;
        }

        true
    }

    /// Record a successful operation: resets the failure count and closes
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.state = CircuitState::Closed;
    }

    /// Record a failed operation, opening the circuit at the threshold
    pub fn record_failure(&mut self) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_time = Some(Instant::now());

        if self.failure_count >= self.config.failure_threshold {
            if self.state == CircuitState::Closed {
                tracing::warn!(
                    "Circuit breaker opened after {} consecutive failures",
                    self.failure_count
                );
            }
            self.state = CircuitState::Open;
        }
    }

    /// Get current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}
