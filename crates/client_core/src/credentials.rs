//! Access and refresh credentials.
//!
//! The access token lives in a cookie-like store and expires with the token
//! itself; the refresh token lives in durable storage. Both are always
//! cleared together.

use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use storage::{KeyValueStore, MemoryStore};
use tracing::{debug, info, warn};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const RESET_PASSWORD_KEY: &str = "resetPassword";

pub struct Credentials {
    cookies: Arc<dyn KeyValueStore>,
    local: Arc<dyn KeyValueStore>,
}

impl Credentials {
    pub fn new(cookies: Arc<dyn KeyValueStore>, local: Arc<dyn KeyValueStore>) -> Self {
        Self { cookies, local }
    }

    /// Both halves held in memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub async fn access_token(&self) -> Result<Option<String>> {
        self.cookies.get(ACCESS_TOKEN_KEY).await
    }

    pub async fn refresh_token(&self) -> Result<Option<String>> {
        self.local.get(REFRESH_TOKEN_KEY).await
    }

    pub async fn has_any(&self) -> Result<bool> {
        Ok(self.access_token().await?.is_some() || self.refresh_token().await?.is_some())
    }

    pub async fn store(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        let expires_at = access_token_expiry(access_token);
        self.cookies
            .set(ACCESS_TOKEN_KEY, access_token, expires_at)
            .await
            .context("failed to store access token")?;
        self.local
            .set(REFRESH_TOKEN_KEY, refresh_token, None)
            .await
            .context("failed to store refresh token")?;
        debug!(expires_at = ?expires_at, "credentials: stored");
        Ok(())
    }

    /// Removes both tokens. Both removals are attempted even if the first fails.
    pub async fn clear(&self) -> Result<()> {
        let access = self.cookies.remove(ACCESS_TOKEN_KEY).await;
        let refresh = self.local.remove(REFRESH_TOKEN_KEY).await;
        if let Err(err) = &access {
            warn!("credentials: failed to remove access token: {err}");
        }
        access.context("failed to remove access token")?;
        refresh.context("failed to remove refresh token")?;
        info!("credentials: cleared");
        Ok(())
    }

    pub async fn mark_reset_requested(&self) -> Result<()> {
        self.local.set(RESET_PASSWORD_KEY, "true", None).await
    }

    pub async fn reset_requested(&self) -> Result<bool> {
        Ok(self.local.get(RESET_PASSWORD_KEY).await?.is_some())
    }

    pub async fn clear_reset_marker(&self) -> Result<()> {
        self.local.remove(RESET_PASSWORD_KEY).await
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Expiry from a JWT access token's `exp` claim. Accepts an optional
/// `Bearer ` prefix.
pub fn access_token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    Utc.timestamp_opt(claims.exp?, 0).single()
}

#[cfg(test)]
#[path = "tests/credentials_tests.rs"]
mod tests;
