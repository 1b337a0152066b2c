//! Client configuration.
//!
//! All endpoints derive from a single base URL following the server's
//! route layout (`/api/v1/auth`, `/api/v1/chat`). The base URL can be
//! given explicitly or read from the `CONVERSE_API_BASE` environment
//! variable (a `.env` file is honored if present).

use std::time::Duration;

use anyhow::{Context, Result};

/// Environment variable holding the API base URL
const API_BASE_ENV: &str = "CONVERSE_API_BASE";

/// Authentication endpoint prefix
const AUTH_PATH: &str = "/api/v1/auth";

/// Chat endpoint prefix
const CHAT_PATH: &str = "/api/v1/chat";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
/// Applied per request; the chat stream is exempt (it stays open as long
/// as the server keeps producing tokens).
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Scheme + host (+ optional port) of the API server, no trailing slash
    pub base_url: String,
    /// Timeout applied to every non-streaming request
    pub request_timeout: Duration,
    /// Persist a rotated refresh token when a renewal response carries one.
    /// Servers are free to rotate on every refresh or never; with this off,
    /// the original refresh credential stays in place regardless.
    pub persist_rotated_refresh: bool,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            persist_rotated_refresh: true,
        }
    }

    /// Build a config from the environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let base = std::env::var(API_BASE_ENV)
            .with_context(|| format!("{} is not set", API_BASE_ENV))?;
        Ok(Self::new(base))
    }

    /// Full URL for an auth endpoint, e.g. `auth_url("/refresh")`.
    pub(crate) fn auth_url(&self, suffix: &str) -> String {
        format!("{}{}{}", self.base_url, AUTH_PATH, suffix)
    }

    /// Full URL for a chat endpoint, e.g. `chat_url("/stream")`.
    pub(crate) fn chat_url(&self, suffix: &str) -> String {
        format!("{}{}{}", self.base_url, CHAT_PATH, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls() {
        let config = ApiConfig::new("https://api.example.com");
        assert_eq!(
            config.auth_url("/refresh"),
            "https://api.example.com/api/v1/auth/refresh"
        );
        assert_eq!(
            config.chat_url("/stream"),
            "https://api.example.com/api/v1/chat/stream"
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = ApiConfig::new("https://api.example.com/");
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(
            config.chat_url("/sessions"),
            "https://api.example.com/api/v1/chat/sessions"
        );
    }
}
