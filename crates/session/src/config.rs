// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

/// Configuration for the session manager.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL of the auth server.
    #[arg(long, default_value = "http://127.0.0.1:8700", env = "FRONTDESK_AUTH_URL")]
    pub auth_url: String,

    /// Lead time before expiry at which renewal starts, in seconds.
    #[arg(long, default_value_t = 300, env = "FRONTDESK_REFRESH_MARGIN_SECS")]
    pub refresh_margin_secs: u64,

    /// Minimum renewal timer delay in seconds. Keeps an already-expired
    /// credential from scheduling at zero.
    #[arg(long, default_value_t = 10, env = "FRONTDESK_REFRESH_FLOOR_SECS")]
    pub refresh_floor_secs: u64,

    /// Path of the shared token file. Defaults under the state directory.
    #[arg(long, env = "FRONTDESK_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Poll interval for detecting token writes from other frontdesk
    /// processes, in milliseconds.
    #[arg(long, default_value_t = 2000, env = "FRONTDESK_STORE_POLL_MS")]
    pub store_poll_ms: u64,
}

impl SessionConfig {
    pub fn refresh_margin(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn refresh_floor(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_floor_secs)
    }

    pub fn store_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_poll_ms)
    }

    /// Resolved token file path: the explicit flag, or `tokens.json` in
    /// the state directory.
    pub fn token_path(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(|| state_dir().join("tokens.json"))
    }
}

/// Resolve the state directory for frontdesk data.
///
/// Checks `FRONTDESK_STATE_DIR`, then `$XDG_STATE_HOME/frontdesk`,
/// then `$HOME/.local/state/frontdesk`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FRONTDESK_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("frontdesk");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/frontdesk");
    }
    PathBuf::from(".frontdesk")
}
