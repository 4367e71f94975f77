// src/sheets/source/credentials.rs
// Access tokens for the spreadsheet backend with explicit refresh

use super::{SourceError, SourceResult};
use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::Mutex;
use tracing::{debug, info};

pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Tokens are treated as expired this long before the server says so.
const EXPIRY_MARGIN_SECS: i64 = 60;

pub trait CredentialProvider: Send + Sync {
    /// A currently valid bearer token, refreshing first if the cached one expired.
    fn access_token(&self) -> SourceResult<String>;

    /// Discard any cached token and obtain a new one.
    fn refresh(&self) -> SourceResult<String>;
}

/// A fixed token, e.g. minted by a service account outside this process.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CredentialProvider for StaticToken {
    fn access_token(&self) -> SourceResult<String> {
        Ok(self.token.clone())
    }

    fn refresh(&self) -> SourceResult<String> {
        Err(SourceError::Auth(
            "static access token was rejected and cannot be refreshed".to_string(),
        ))
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// OAuth refresh-token flow. The refresh token lives in the OS keyring.
pub struct OAuthRefreshCredentials {
    http: Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthRefreshCredentials {
    pub fn new(
        http: Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            cached: Mutex::new(None),
        }
    }

    /// Build from the refresh token stored under `service`/`user` in the keyring.
    pub fn from_keyring(
        http: Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        service: &str,
        user: &str,
    ) -> SourceResult<Self> {
        let entry = keyring::Entry::new(service, user)?;
        let refresh_token = entry.get_password()?;
        debug!("Loaded refresh token from keyring entry {}/{}", service, user);
        Ok(Self::new(http, client_id, client_secret, refresh_token))
    }

    pub fn store_refresh_token(service: &str, user: &str, refresh_token: &str) -> SourceResult<()> {
        let entry = keyring::Entry::new(service, user)?;
        entry.set_password(refresh_token)?;
        info!("Stored refresh token in keyring entry {}/{}", service, user);
        Ok(())
    }

    fn exchange(&self) -> SourceResult<CachedToken> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SourceError::Auth(format!(
                "token refresh failed with HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response.json()?;
        Ok(cache_entry(token, Utc::now()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CachedToken>> {
        // A poisoned cache only means another thread panicked mid-refresh
        self.cached.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn cache_entry(token: TokenResponse, now: DateTime<Utc>) -> CachedToken {
    let lifetime = token.expires_in.unwrap_or(3600);
    CachedToken {
        value: token.access_token,
        expires_at: now + Duration::seconds((lifetime - EXPIRY_MARGIN_SECS).max(0)),
    }
}

impl CredentialProvider for OAuthRefreshCredentials {
    fn access_token(&self) -> SourceResult<String> {
        {
            let cached = self.lock();
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Utc::now() {
                    return Ok(token.value.clone());
                }
            }
        }
        self.refresh()
    }

    fn refresh(&self) -> SourceResult<String> {
        let fresh = self.exchange()?;
        debug!("Refreshed access token, valid until {}", fresh.expires_at);
        let value = fresh.value.clone();
        *self.lock() = Some(fresh);
        Ok(value)
    }
}
