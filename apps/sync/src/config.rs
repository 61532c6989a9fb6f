//! Sync client configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/marquee/sync.toml`
//! - Windows: `%APPDATA%/marquee/sync.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use marquee_realtime::RealtimeConfig;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the stored token.
pub const TOKEN_ENV: &str = "MARQUEE_TOKEN";

/// Sync client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// WebSocket endpoint of the library server.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Access token presented on connect.
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub realtime: RealtimeSection,
}

/// `[realtime]` table. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSection {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_attempts: u32,
    /// Zero disables the heartbeat.
    pub heartbeat_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub history_capacity: usize,
}

fn default_server_url() -> String {
    RealtimeConfig::default().url
}

impl Default for RealtimeSection {
    fn default() -> Self {
        let defaults = RealtimeConfig::default();
        Self {
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            backoff_factor: defaults.backoff_factor,
            max_attempts: defaults.max_attempts,
            heartbeat_interval_ms: defaults.heartbeat_interval.as_millis() as u64,
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
            history_capacity: defaults.history_capacity,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            token: String::new(),
            realtime: RealtimeSection::default(),
        }
    }
}

impl SyncConfig {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: SyncConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = SyncConfig::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix (contains the access token).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Token to connect with: the environment override wins over the file.
    pub fn effective_token(&self) -> String {
        resolve_token(std::env::var(TOKEN_ENV).ok(), &self.token)
    }

    pub fn realtime_config(&self) -> RealtimeConfig {
        let r = &self.realtime;
        RealtimeConfig {
            url: self.server_url.clone(),
            initial_delay: Duration::from_millis(r.initial_delay_ms),
            max_delay: Duration::from_millis(r.max_delay_ms),
            backoff_factor: r.backoff_factor,
            max_attempts: r.max_attempts,
            heartbeat_interval: Duration::from_millis(r.heartbeat_interval_ms),
            connect_timeout: Duration::from_millis(r.connect_timeout_ms),
            history_capacity: r.history_capacity,
        }
    }
}

fn resolve_token(env: Option<String>, stored: &str) -> String {
    match env {
        Some(token) if !token.is_empty() => token,
        _ => stored.to_string(),
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("marquee")
            .join("sync.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("marquee").join("sync.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/marquee/sync.toml"))
    }
}
