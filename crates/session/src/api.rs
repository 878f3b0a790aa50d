// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP face of the login and refresh contracts.
//!
//! Both endpoints return the same pair shape and both feed the same adopt
//! path in the session manager. Refresh failures are split into the two
//! kinds the caller branches on: transient (retry later, session intact)
//! and rejected (the refresh credential itself is dead, session over).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Request timeout for the auth endpoints.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a refresh cycle failed. Cloneable because every waiter of the
/// cycle receives the same value through the shared future.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The server confirmed the refresh credential is invalid or expired.
    /// Fatal: cascades to logout.
    Rejected(String),
    /// Recoverable failure (connect error, timeout, 5xx, malformed body).
    /// The session is preserved; a later call may retry.
    Transient(String),
    /// The session was torn down while the refresh was pending.
    Cancelled,
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(msg) => write!(f, "refresh rejected: {msg}"),
            Self::Transient(msg) => write!(f, "refresh failed: {msg}"),
            Self::Cancelled => f.write_str("refresh cancelled by logout"),
        }
    }
}

impl std::error::Error for RefreshError {}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    identity: &'a str,
    secret: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Pair returned by both auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// OAuth-style error body from the auth server.
#[derive(Debug, Deserialize)]
struct AuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for the auth server's session endpoints.
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Exchange identity/secret for a credential pair.
    pub async fn login(&self, identity: &str, secret: &str) -> anyhow::Result<TokenPairResponse> {
        let resp = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .json(&LoginRequest { identity, secret })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("login failed ({status}): {text}");
        }

        let pair: TokenPairResponse = resp.json().await?;
        Ok(pair)
    }

    /// Exchange the refresh credential for a fresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPairResponse, RefreshError> {
        let resp = self
            .http
            .post(format!("{}/auth/refresh", self.base_url))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshError::Transient(format!("HTTP error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RefreshError::Transient(format!("read body: {e}")))?;

        if !status.is_success() {
            // The server confirms a dead refresh credential either with an
            // invalid_grant error body or an auth-rejection status.
            if let Ok(err) = serde_json::from_str::<AuthErrorResponse>(&body) {
                let detail = err.error_description.unwrap_or_else(|| err.error.clone());
                if err.error == "invalid_grant" {
                    return Err(RefreshError::Rejected(detail));
                }
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN
                {
                    return Err(RefreshError::Rejected(detail));
                }
                return Err(RefreshError::Transient(format!("{}: {detail}", err.error)));
            }
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(RefreshError::Rejected(format!("HTTP {status}")));
            }
            return Err(RefreshError::Transient(format!("HTTP {status}: {body}")));
        }

        serde_json::from_str(&body)
            .map_err(|e| RefreshError::Transient(format!("parse response: {e}")))
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
