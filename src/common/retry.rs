//! Retrying transport with replayable bodies and linear backoff
//!
//! Retries transport failures, 5xx and 429 responses. Every other status
//! is returned on the first attempt.

use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::transport::{ReplayableBody, Request, Response, Transport, TransportError};

/// Retry configuration, fixed for the lifetime of a client
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff unit; retry `n` waits `backoff * n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before the given attempt (attempt 0 is not delayed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Wraps a raw [`Transport`] with retries
#[derive(Debug, Clone)]
pub struct RetryTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Send `request`, retrying up to `max_retries` times
    ///
    /// A body is buffered once before the first attempt and regenerated for
    /// every retry. When the final attempt still gets a retryable status that
    /// response is returned as-is; when it fails at the transport level the
    /// last error is returned. Cancellation is observed during backoff only.
    pub async fn send(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        let replay = match request.body.take() {
            Some(body) => Some(ReplayableBody::buffer(body).await?),
            None => None,
        };

        let mut last_error = None;
        let total_attempts = self.policy.max_retries.saturating_add(1);

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                    _ = sleep(delay) => {}
                }
            }

            let body = replay.as_ref().map(ReplayableBody::regenerate);
            match self.inner.send(request.replay(body)).await {
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{}): {}",
                        attempt + 1,
                        total_attempts,
                        e
                    );
                    last_error = Some(e);
                }
                Ok(response) if !response.is_retryable() => return Ok(response),
                Ok(response) => {
                    if attempt == self.policy.max_retries {
                        return Ok(response);
                    }
                    warn!(
                        status = response.status.as_u16(),
                        "Retryable response (attempt {}/{})",
                        attempt + 1,
                        total_attempts
                    );
                    response.body.drain().await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| TransportError::Connection("no attempts made".into())))
    }
}
