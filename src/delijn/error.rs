//! De Lijn client error types

use reqwest::StatusCode;
use thiserror::Error;

use crate::common::TransportError;

/// Process exit codes for the CLI
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_AUTH: i32 = 3;
pub const EXIT_NOT_FOUND: i32 = 4;
pub const EXIT_RATE_LIMIT: i32 = 5;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    #[error("authentication failed ({status}): invalid or expired API key")]
    Authentication { status: u16 },

    #[error("not found")]
    NotFound,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: String,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no API key configured")]
    MissingApiKey,

    #[error("API key contains characters not allowed in a header")]
    InvalidApiKey,

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => Self::Cancelled,
            other => Self::Transport(other),
        }
    }
}

impl ApiError {
    /// Build the generic error for an unexpected status
    pub fn from_status(status: StatusCode, details: String) -> Self {
        Self::Api {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("Unknown Status").to_string(),
            details,
        }
    }

    /// Whether waiting and retrying later may help
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::CircuitOpen | Self::RateLimited { .. })
    }

    /// User-facing message with a suggested next step
    pub fn hint(&self) -> String {
        match self {
            Self::MissingApiKey => "No API key configured.\n\n\
                 Set DELIJN_API_KEY (or add it to .env) to configure your API key.\n\
                 Get your key from https://data.delijn.be/"
                .to_string(),
            Self::InvalidApiKey | Self::Authentication { .. } => "Authentication failed: invalid or expired API key\n\n\
                 Set DELIJN_API_KEY to reconfigure your API key.\n\
                 Get your key from https://data.delijn.be/"
                .to_string(),
            Self::NotFound => {
                "Resource not found. Check that the stop/line number is correct.".to_string()
            }
            Self::RateLimited {
                retry_after: Some(secs),
            } if *secs > 0 => format!(
                "Rate limit exceeded. Please wait {} seconds before trying again.",
                secs
            ),
            Self::RateLimited { .. } => {
                "Rate limit exceeded. Please wait before trying again.".to_string()
            }
            Self::CircuitOpen => "Too many consecutive failures. The De Lijn API may be experiencing issues.\n\
                 Please try again later."
                .to_string(),
            Self::Api {
                status,
                message,
                details,
            } if !details.is_empty() => format!("API error ({}): {} - {}", status, message, details),
            other => other.to_string(),
        }
    }

    /// Exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingApiKey | Self::InvalidApiKey | Self::Authentication { .. } => EXIT_AUTH,
            Self::NotFound => EXIT_NOT_FOUND,
            Self::RateLimited { .. } | Self::CircuitOpen => EXIT_RATE_LIMIT,
            _ => EXIT_ERROR,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_transport_maps_to_cancelled() {
        assert!(matches!(
            ApiError::from(TransportError::Cancelled),
            ApiError::Cancelled
        ));
        assert!(matches!(
            ApiError::from(TransportError::Timeout("30s".into())),
            ApiError::Transport(TransportError::Timeout(_))
        ));
    }

    #[test]
    fn test_from_status_uses_reason_phrase() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down".into());
        match err {
            ApiError::Api {
                status,
                message,
                details,
            } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
                assert_eq!(details, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_hints() {
        assert!(ApiError::RateLimited {
            retry_after: Some(12)
        }
        .hint()
        .contains("wait 12 seconds"));
        assert_eq!(
            ApiError::RateLimited { retry_after: None }.hint(),
            "Rate limit exceeded. Please wait before trying again."
        );
        assert!(ApiError::CircuitOpen.hint().contains("try again later"));
        assert!(ApiError::Authentication { status: 401 }
            .hint()
            .contains("DELIJN_API_KEY"));
        assert_eq!(
            ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, String::new()).hint(),
            "API error (500): Internal Server Error"
        );
        assert_eq!(
            ApiError::from_status(StatusCode::BAD_REQUEST, "bad stop".into()).hint(),
            "API error (400): Bad Request - bad stop"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ApiError::MissingApiKey.exit_code(), EXIT_AUTH);
        assert_eq!(ApiError::Authentication { status: 403 }.exit_code(), EXIT_AUTH);
        assert_eq!(ApiError::NotFound.exit_code(), EXIT_NOT_FOUND);
        assert_eq!(ApiError::CircuitOpen.exit_code(), EXIT_RATE_LIMIT);
        assert_eq!(ApiError::Cancelled.exit_code(), EXIT_ERROR);
    }

    #[test]
    fn test_temporary_errors() {
        assert!(ApiError::CircuitOpen.is_temporary());
        assert!(ApiError::RateLimited { retry_after: None }.is_temporary());
        assert!(!ApiError::NotFound.is_temporary());
    }
}
