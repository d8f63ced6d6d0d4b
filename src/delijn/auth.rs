//! API key handling for the De Lijn open data portal

use std::fmt;

use super::error::{ApiError, ApiResult};

/// Environment variable holding the subscription key
pub const API_KEY_ENV: &str = "DELIJN_API_KEY";

/// API credentials container
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Load the key from `DELIJN_API_KEY`
    ///
    /// A missing or blank variable is reported as [`ApiError::MissingApiKey`].
    pub fn from_env() -> ApiResult<Self> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key.trim())),
            _ => Err(ApiError::MissingApiKey),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}
