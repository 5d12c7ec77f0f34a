use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::ZoomConfig;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid token response: {0}")]
    Decode(String),
}

/// A bearer token together with the instant it stops being reused.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Process-wide cache for the client-credentials access token.
///
/// The lock is held only to read or replace the cached value, never across
/// the exchange itself. Two requests that both miss will each run an exchange
/// and the later write wins.
pub struct TokenCache {
    client: reqwest::Client,
    config: ZoomConfig,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(client: reqwest::Client, config: ZoomConfig) -> Self {
        Self {
            client,
            config,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached token while it is valid, otherwise exchange the
    /// client credentials for a new one.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        let now = Utc::now();
        if let Some(token) = self.cached_value(now) {
            debug!("Reusing cached access token (expires {})", token.expires_at);
            return Ok(token.value);
        }

        let fresh = self.exchange().await.inspect_err(|e| {
            error!("Failed to obtain access token: {}", e);
        })?;
        let value = fresh.value.clone();
        info!("Access token obtained (expires {})", fresh.expires_at);
        *self.lock() = Some(fresh);
        Ok(value)
    }

    fn cached_value(&self, now: DateTime<Utc>) -> Option<CachedToken> {
        self.lock()
            .as_ref()
            .filter(|token| token.is_valid_at(now))
            .cloned()
    }

    #[cfg(test)]
    pub fn cached_token(&self) -> Option<CachedToken> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CachedToken>> {
        self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn exchange(&self) -> Result<CachedToken, AuthError> {
        let client_id = require(&self.config.client_id, "client_id")?;
        let client_secret = require(&self.config.client_secret, "client_secret")?;
        let account_id = require(&self.config.account_id, "account_id")?;

        let basic = STANDARD.encode(format!("{}:{}", client_id, client_secret));

        debug!("Requesting access token from {}", self.config.oauth_url);

        let response = self
            .client
            .post(&self.config.oauth_url)
            .query(&[
                ("grant_type", "client_credentials"),
                ("account_id", account_id),
            ])
            .header("Authorization", format!("Basic {}", basic))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status { status, body });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        let expires_at = compute_expiry(
            Utc::now(),
            token.expires_in,
            self.config.expiry_buffer_secs,
        )
        .ok_or_else(|| AuthError::Decode(format!("expires_in out of range: {}", token.expires_in)))?;

        Ok(CachedToken {
            value: token.access_token,
            expires_at,
        })
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, AuthError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingCredential(name))
}

/// `now + (lifetime - buffer)`. The buffer is at least one second so the
/// result is always strictly before the provider-stated expiry.
pub fn compute_expiry(
    now: DateTime<Utc>,
    lifetime_secs: i64,
    buffer_secs: i64,
) -> Option<DateTime<Utc>> {
    let remaining = lifetime_secs.checked_sub(buffer_secs.max(1))?;
    now.checked_add_signed(TimeDelta::try_seconds(remaining)?)
}
