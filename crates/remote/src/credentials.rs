//! OAuth refresh credentials and the access token cache
//!
//! Stored refresh material is exchanged for an access token on first use and
//! again whenever the cached token is about to expire. There is no interactive
//! flow: a missing credential makes the remote archive unavailable.

use crate::drive::check_status;
use chrono::{DateTime, Duration, Utc};
use ledger_core::{Result, SyncError};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh a little before the token actually lapses
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Stored OAuth client + refresh token.
///
/// Accepts the field names of saved OAuth2 client credential files
/// (`token`/`access_token`, `expiry`/`token_expiry`).
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default, alias = "token")]
    pub access_token: Option<String>,
    #[serde(default, alias = "expiry")]
    pub token_expiry: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: Credentials = serde_json::from_str(json)
            .map_err(|e| SyncError::Unavailable(format!("malformed credentials: {}", e)))?;
        if creds.refresh_token.trim().is_empty() {
            return Err(SyncError::Unavailable(
                "credentials carry no refresh token".to_string(),
            ));
        }
        Ok(creds)
    }

    /// Load credentials from the environment variable `env_var`, falling back
    /// to the file at `path`. Returns `None` if neither is present.
    pub fn load(path: &Path, env_var: &str) -> Result<Option<Self>> {
        if let Ok(json) = std::env::var(env_var) {
            if !json.trim().is_empty() {
                tracing::debug!("Loading remote credentials from ${}", env_var);
                return Self::from_json(&json).map(Some);
            }
        }

        match std::fs::read_to_string(path) {
            Ok(json) => {
                tracing::debug!("Loading remote credentials from {}", path.display());
                Self::from_json(&json).map(Some)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    /// Access token stored alongside the refresh material, if still valid
    fn stored_token(&self) -> Option<AccessToken> {
        let value = self.access_token.clone()?;
        let expires_at = self
            .token_expiry
            .as_deref()
            .and_then(ledger_journal::snapshot::parse_timestamp)?;
        Some(AccessToken { value, expires_at })
    }
}

/// A bearer token and its expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Lazily refreshed access token
pub struct TokenCache {
    credentials: Credentials,
    current: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(credentials: Credentials) -> Self {
        let current = credentials.stored_token();
        Self {
            credentials,
            current: Mutex::new(current),
        }
    }

    /// A valid access token, refreshing over HTTP when needed
    pub fn token(&self, http: &reqwest::blocking::Client) -> Result<String> {
        self.token_with(Utc::now(), |creds| refresh(http, creds))
    }

    /// A valid access token as of `now`, calling `refresh` on a miss
    pub fn token_with<F>(&self, now: DateTime<Utc>, refresh: F) -> Result<String>
    where
        F: FnOnce(&Credentials) -> Result<AccessToken>,
    {
        let mut current = self.current.lock();
        if let Some(token) = current.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let token = refresh(&self.credentials)?;
        tracing::debug!("Refreshed remote access token, valid until {}", token.expires_at);
        let value = token.value.clone();
        *current = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next call refreshes
    pub fn invalidate(&self) {
        *self.current.lock() = None;
    }
}

/// Exchange the refresh token for a new access token
fn refresh(http: &reqwest::blocking::Client, creds: &Credentials) -> Result<AccessToken> {
    let response = http
        .post(&creds.token_uri)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", creds.refresh_token.as_str()),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
        ])
        .send()
        .map_err(|e| SyncError::transport("token refresh", e))?;

    let payload: RefreshResponse = check_status(response, "token refresh")?
        .json()
        .map_err(|e| SyncError::transport("token refresh", e))?;

    Ok(AccessToken {
        value: payload.access_token,
        expires_at: Utc::now() + Duration::seconds(payload.expires_in.unwrap_or(3600)),
    })
}
