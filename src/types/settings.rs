use serde::{Deserialize, Serialize};

use super::session::OAuthProvider;

/// Top-level client configuration container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendSettings,
    pub auth: AuthSettings,
    pub realtime: RealtimeSettings,
    pub ui: UiSettings,
    /// Backend table holding bookmark rows.
    pub table: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            auth: AuthSettings::default(),
            realtime: RealtimeSettings::default(),
            ui: UiSettings::default(),
            table: "bookmarks".to_string(),
        }
    }
}

/// Where the managed backend lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BackendSettings {
    pub url: String,
    pub anon_key: String,
    /// Public origin of this app, used to build the OAuth callback URL.
    pub site_url: String,
}

impl BackendSettings {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }
}

/// Auth session behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthSettings {
    pub persist_session: bool,
    pub auto_refresh_token: bool,
    pub provider: OAuthProvider,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            persist_session: true,
            auto_refresh_token: true,
            provider: OAuthProvider::Google,
        }
    }
}

/// Change-feed subscription tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RealtimeSettings {
    pub events_per_second: u32,
    /// Delay before resubscribing after a timeout.
    pub retry_delay_ms: u64,
    /// Automatic resubscriptions allowed per mount.
    pub max_timeout_retries: u32,
    /// How long to wait for a join acknowledgment before reporting a timeout.
    pub join_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            events_per_second: 10,
            retry_delay_ms: 5000,
            max_timeout_retries: 1,
            join_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
        }
    }
}

/// Presentation timings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiSettings {
    /// How long the "bookmark added" signal stays visible.
    pub success_signal_ms: u64,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            success_signal_ms: 3000,
        }
    }
}
