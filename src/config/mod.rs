//! Configuration and session storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{StoredToken, TokenStore};

const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Environment variable overriding `api_url`.
const ENV_API_URL: &str = "SKILLSWAP_API_URL";
/// Environment variable supplying a bearer token instead of the stored session.
const ENV_TOKEN: &str = "SKILLSWAP_TOKEN";

/// Application configuration
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the SkillSwap REST API (e.g. https://skillswap.example/api)
    pub api_url: String,
    /// Stored bearer token for the current session
    pub session: Option<StoredToken>,
    /// Blanket client-side timeout for request/response calls
    pub request_timeout_secs: u64,
    /// Number of most recent messages fetched per history load / poll
    pub history_limit: usize,
    /// Polling fallback interval while the live channel is degraded
    pub poll_interval_secs: u64,
    /// Conversation list refresh interval while visible
    pub conversation_refresh_secs: u64,
    /// How long fetched participant profiles stay cached
    pub profile_cache_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            session: None,
            request_timeout_secs: 30,
            history_limit: 50,
            poll_interval_secs: 30,
            conversation_refresh_secs: 120,
            profile_cache_ttl_secs: 300,
        }
    }
}

/// Timing and sizing knobs handed to the sync engine.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub history_limit: usize,
    pub poll_interval: Duration,
    pub conversation_refresh: Duration,
    pub profile_cache_ttl: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Config::default().sync_settings()
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "skillswap", "skillswap-chat")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Load configuration and apply environment overrides.
    ///
    /// The result must not be saved: it may carry a token that never came from disk.
    pub fn load_effective() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_TOKEN).ok(),
        );
        Ok(config)
    }

    fn apply_overrides(&mut self, api_url: Option<String>, token: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.session = Some(StoredToken::new(token, None));
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            history_limit: self.history_limit.max(1),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            conversation_refresh: Duration::from_secs(self.conversation_refresh_secs.max(1)),
            profile_cache_ttl: Duration::from_secs(self.profile_cache_ttl_secs),
        }
    }
}

impl TokenStore for Config {
    fn get_access_token(&self) -> Option<StoredToken> {
        self.session.clone()
    }

    fn set_access_token(&mut self, token: String, expires_in: Option<u64>) {
        self.session = Some(StoredToken::new(token, expires_in));
    }

    fn clear_tokens(&mut self) {
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_sync_constants() {
        let settings = Config::default().sync_settings();
        assert_eq!(settings.history_limit, 50);
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.conversation_refresh, Duration::from_secs(120));
        assert_eq!(Config::default().request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            api_url = "https://skillswap.example/api"
            poll_interval_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.api_url, "https://skillswap.example/api");
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.history_limit, 50);
        assert!(config.session.is_none());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(Some("https://other/api".into()), Some("abc".into()));
        assert_eq!(config.api_url, "https://other/api");
        assert_eq!(config.get_access_token().unwrap().token, "abc");

        config.apply_overrides(Some("  ".into()), None);
        assert_eq!(config.api_url, "https://other/api");
    }

    #[test]
    fn test_clear_tokens() {
        let mut config = Config::default();
        config.set_access_token("t".into(), Some(60));
        assert!(config.get_access_token().is_some());
        config.clear_tokens();
        assert!(config.get_access_token().is_none());
    }
}
