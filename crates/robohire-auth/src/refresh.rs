//! Token refresh collaborator.
//!
//! [`SessionContext`](crate::SessionContext) never talks to the network
//! itself; it is handed a [`TokenRefresher`] at construction.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Exchanges the current token for a new one.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// `Ok(None)` means the server declined to issue a new token.
    async fn refresh_token(&self, current: Option<&str>) -> AuthResult<Option<String>>;
}

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default, alias = "accessToken")]
    token: Option<String>,
}

/// Refreshes tokens against the RoboHire API.
pub struct HttpTokenRefresher {
    http_client: Client,
    refresh_url: String,
    refresh_config: RefreshConfig,
}

impl HttpTokenRefresher {
    pub fn new(api_url: &str) -> Self {
        Self::with_refresh_config(api_url, RefreshConfig::default())
    }

    pub fn with_refresh_config(api_url: &str, refresh_config: RefreshConfig) -> Self {
        Self {
            http_client: Client::new(),
            refresh_url: format!("{}/auth/refresh", api_url.trim_end_matches('/')),
            refresh_config,
        }
    }

    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }

    /// Single attempt to refresh the token.
    async fn try_refresh(&self, current: Option<&str>) -> AuthResult<Option<String>> {
        debug!(url = %self.refresh_url, "Refreshing token");

        let mut request = self
            .http_client
            .post(&self.refresh_url)
            .json(&RefreshRequest { token: current });
        if let Some(token) = current {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            info!(status = status.as_u16(), "Refresh rejected by server");
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Token refresh failed");
            return Err(AuthError::HttpStatus(status.as_u16()));
        }

        let data: RefreshResponse = response.json().await?;
        Ok(data.token.filter(|t| !t.trim().is_empty()))
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh_token(&self, current: Option<&str>) -> AuthResult<Option<String>> {
        for attempt in 0..self.refresh_config.max_retries {
            match self.try_refresh(current).await {
                Ok(token) => return Ok(token),
                Err(e) if e.is_transient() => {
                    warn!(attempt = attempt + 1, error = %e, "Transient refresh error");

                    if attempt + 1 < self.refresh_config.max_retries {
                        let delay = self.refresh_config.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_retries = self.refresh_config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Refresh failed with transient error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!("Refresh failed with non-transient error: {}", e);
                    return Err(e);
                }
            }
        }

        warn!(
            "Refresh failed after {} attempts",
            self.refresh_config.max_retries
        );
        Err(AuthError::RefreshExhausted(self.refresh_config.max_retries))
    }
}
