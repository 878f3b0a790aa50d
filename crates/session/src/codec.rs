// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer token payload decoding.
//!
//! Tokens are opaque three-segment strings; only the middle segment is
//! base64-decoded to read the subject, expiry, and kind. Signatures are
//! never checked here; the server is the authority, this process only
//! needs to know *when* to renew.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

/// Which slot of the credential pair a token occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims read from a token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    /// Expiry as epoch seconds.
    pub expires_at: u64,
    pub kind: TokenKind,
}

/// Why a token payload could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not a three-segment token.
    Malformed,
    /// Payload segment is not valid base64url.
    Base64,
    /// Payload is not the expected JSON shape.
    Json,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => f.write_str("token is not a three-segment string"),
            Self::Base64 => f.write_str("token payload is not valid base64url"),
            Self::Json => f.write_str("token payload is not valid claims JSON"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Wire shape of the payload segment.
#[derive(Debug, Deserialize)]
struct ClaimsWire {
    sub: String,
    exp: u64,
    #[serde(default, alias = "type")]
    typ: Option<String>,
}

/// Decode the claims of a bearer token without verifying its signature.
pub fn decode(raw: &str) -> Result<Claims, DecodeError> {
    let mut segments = raw.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(DecodeError::Malformed),
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| DecodeError::Base64)?;
    let wire: ClaimsWire = serde_json::from_slice(&bytes).map_err(|_| DecodeError::Json)?;

    let kind = match wire.typ.as_deref() {
        Some("refresh") => TokenKind::Refresh,
        // Missing or unrecognized kinds read as access tokens.
        _ => TokenKind::Access,
    };

    Ok(Claims { subject: wire.sub, expires_at: wire.exp, kind })
}

/// Seconds until `raw` expires, clamped to zero when already expired or
/// undecodable. Storage corruption must never take the session down, so a
/// garbage token simply reads as due for renewal.
pub fn time_until_expiry(raw: &str, now_secs: u64) -> Duration {
    match decode(raw) {
        Ok(claims) => Duration::from_secs(claims.expires_at.saturating_sub(now_secs)),
        Err(_) => Duration::ZERO,
    }
}

/// A decoded bearer credential. Immutable; a refresh replaces the whole
/// value, nothing is ever patched in place.
#[derive(Debug, Clone)]
pub struct Credential {
    raw: String,
    claims: Claims,
}

impl Credential {
    /// Wrap a raw token, treating an unreadable payload as an
    /// already-expired credential of the expected kind.
    pub fn from_raw(raw: impl Into<String>, kind: TokenKind) -> Self {
        let raw = raw.into();
        let claims = decode(&raw).unwrap_or(Claims {
            subject: String::new(),
            expires_at: 0,
            kind,
        });
        Self { raw, claims }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn subject(&self) -> &str {
        &self.claims.subject
    }

    /// Expiry as epoch seconds.
    pub fn expires_at(&self) -> u64 {
        self.claims.expires_at
    }

    pub fn kind(&self) -> TokenKind {
        self.claims.kind
    }

    pub fn time_until_expiry(&self, now_secs: u64) -> Duration {
        Duration::from_secs(self.claims.expires_at.saturating_sub(now_secs))
    }
}

/// The access/refresh pair a session holds.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: Credential,
    pub refresh: Credential,
}

impl TokenPair {
    pub fn from_raw(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Credential::from_raw(access, TokenKind::Access),
            refresh: Credential::from_raw(refresh, TokenKind::Refresh),
        }
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
