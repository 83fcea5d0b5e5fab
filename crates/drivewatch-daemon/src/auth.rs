//! OAuth access tokens for the Drive API.
//!
//! Reads an authorized-user token file (the format Google's client
//! libraries write), refreshes the access token with the stored refresh
//! token when it expires or is rejected, and writes the new token back.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use drivewatch_core::RemoteError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Default OAuth token endpoint.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Contents of the token file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorizedUser {
    /// Current access token
    #[serde(alias = "access_token", default)]
    pub token: Option<String>,
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Access token expiry (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl AuthorizedUser {
    /// Whether the access token is missing or about to expire at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.token.as_deref().map(str::is_empty).unwrap_or(true) {
            return true;
        }
        match self.expiry.as_deref().and_then(parse_expiry) {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    // Some token writers store naive UTC timestamps without an offset
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Hands out valid access tokens, refreshing as needed.
pub struct TokenManager {
    path: PathBuf,
    http: reqwest::Client,
    user: Mutex<AuthorizedUser>,
}

impl TokenManager {
    /// Load credentials from `path`. A missing or unreadable file is an error.
    pub async fn load(path: &Path, http: reqwest::Client) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read token file: {:?}", path))?;
        let user: AuthorizedUser = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse token file: {:?}", path))?;
        info!("Loaded credentials from {:?}", path);
        Ok(Self::new(path.to_path_buf(), http, user))
    }

    pub fn new(path: PathBuf, http: reqwest::Client, user: AuthorizedUser) -> Self {
        Self {
            path,
            http,
            user: Mutex::new(user),
        }
    }

    /// A usable access token, refreshed first if expired.
    pub async fn access_token(&self) -> Result<String, RemoteError> {
        let mut user = self.user.lock().await;
        if user.needs_refresh(Utc::now()) {
            info!("Refreshing expired credentials");
            self.refresh_locked(&mut user).await?;
        }
        user.token
            .clone()
            .ok_or_else(|| RemoteError::Auth("no access token".to_string()))
    }

    /// Force a refresh, e.g. after the API rejected the current token.
    pub async fn refresh(&self) -> Result<String, RemoteError> {
        let mut user = self.user.lock().await;
        self.refresh_locked(&mut user).await
    }

    async fn refresh_locked(&self, user: &mut AuthorizedUser) -> Result<String, RemoteError> {
        let form = [
            ("client_id", user.client_id.as_str()),
            ("client_secret", user.client_secret.as_str()),
            ("refresh_token", user.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&user.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| RemoteError::Transient(format!("token refresh: {}", e)))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RemoteError::Transient(format!("token refresh returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Auth(format!("token refresh returned {}: {}", status, body)));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(format!("token refresh response: {}", e)))?;

        user.token = Some(refreshed.access_token.clone());
        user.expiry = refreshed
            .expires_in
            .map(|secs| (Utc::now() + Duration::seconds(secs)).to_rfc3339());

        if let Err(e) = self.save(user).await {
            error!("Failed to save refreshed credentials to {:?}: {}", self.path, e);
        } else {
            debug!("New credentials saved to {:?}", self.path);
        }

        Ok(refreshed.access_token)
    }

    async fn save(&self, user: &AuthorizedUser) -> Result<()> {
        let contents = serde_json::to_string_pretty(user)?;
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }
}
