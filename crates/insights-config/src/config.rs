//! Client configuration.
//!
//! Values come from an optional JSON file, then environment variables
//! override individual fields. Without a backend URL and key the client runs
//! against the in-memory backend seeded with sample articles.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Backend URL used by unconfigured builds.
pub const PLACEHOLDER_SUPABASE_URL: &str = "https://placeholder.supabase.co";

/// Anonymous key used by unconfigured builds.
pub const PLACEHOLDER_ANON_KEY: &str = "placeholder-key";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Articles per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 12;

/// Maximum number of featured articles on the homepage.
pub const DEFAULT_FEATURED_LIMIT: usize = 3;

const ENV_LOG_LEVEL: &str = "INSIGHTS_LOG_LEVEL";
const ENV_SUPABASE_URL: &str = "INSIGHTS_SUPABASE_URL";
const ENV_SUPABASE_ANON_KEY: &str = "INSIGHTS_SUPABASE_ANON_KEY";
const ENV_PAGE_SIZE: &str = "INSIGHTS_PAGE_SIZE";

/// Realtime connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Server-side event rate limit requested on connect.
    pub events_per_second: u32,
    /// Base reconnect delay in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Maximum reconnect delay in milliseconds.
    pub reconnect_max_delay_ms: u64,
    /// Maximum reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 25,
            events_per_second: 10,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 10,
        }
    }
}

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Hosted backend project URL.
    #[serde(default)]
    pub supabase_url: Option<String>,
    /// Hosted backend anonymous API key (public, safe to expose).
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    /// Articles per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Maximum number of featured articles.
    #[serde(default = "default_featured_limit")]
    pub featured_limit: usize,
    /// Realtime connection settings.
    #[serde(default)]
    pub realtime: RealtimeSettings,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_featured_limit() -> usize {
    DEFAULT_FEATURED_LIMIT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: None,
            supabase_anon_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            featured_limit: DEFAULT_FEATURED_LIMIT,
            realtime: RealtimeSettings::default(),
        }
    }
}

/// Default config file location (`<config dir>/insights/config.json`).
pub fn default_config_path() -> CoreResult<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| CoreError::Path("Could not determine config directory".to_string()))?;
    Ok(base.join("insights").join("config.json"))
}

impl Config {
    /// Load configuration from `path` (or defaults when it does not exist),
    /// then apply environment overrides.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override fields from variables resolved through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(url) = lookup(ENV_SUPABASE_URL) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = lookup(ENV_SUPABASE_ANON_KEY) {
            self.supabase_anon_key = Some(key);
        }
        if let Some(size) = lookup(ENV_PAGE_SIZE).and_then(|raw| raw.parse().ok()) {
            self.page_size = size;
        }
    }

    /// Reject values the stores cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.page_size == 0 {
            return Err(CoreError::Config("page_size must be at least 1".to_string()));
        }
        if self.is_backend_configured() {
            self.supabase_url()?;
        }
        Ok(())
    }

    /// Whether a real hosted backend is configured.
    pub fn is_backend_configured(&self) -> bool {
        match (&self.supabase_url, &self.supabase_anon_key) {
            (Some(url), Some(key)) => {
                url.trim_end_matches('/') != PLACEHOLDER_SUPABASE_URL
                    && key != PLACEHOLDER_ANON_KEY
            }
            _ => false,
        }
    }

    /// Get the backend URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        let raw = self
            .supabase_url
            .as_deref()
            .ok_or_else(|| CoreError::Config("supabase_url is not set".to_string()))?;
        Url::parse(raw).map_err(CoreError::from)
    }

    /// Anonymous key, if configured.
    pub fn anon_key(&self) -> CoreResult<&str> {
        self.supabase_anon_key
            .as_deref()
            .ok_or_else(|| CoreError::Config("supabase_anon_key is not set".to_string()))
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.page_size, 12);
        assert_eq!(config.featured_limit, 3);
        assert!(!config.is_backend_configured());
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "page_size": 6
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.page_size, 6);
        assert_eq!(config.realtime, RealtimeSettings::default());
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.log_level = "trace".to_string();
        config.supabase_url = Some("https://abc.supabase.co".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config.featured_limit, DEFAULT_FEATURED_LIMIT);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("INSIGHTS_LOG_LEVEL", "warn"),
            ("INSIGHTS_SUPABASE_URL", "https://abc.supabase.co"),
            ("INSIGHTS_SUPABASE_ANON_KEY", "anon"),
            ("INSIGHTS_PAGE_SIZE", "24"),
        ]));

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.page_size, 24);
        assert!(config.is_backend_configured());
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(env(&[("INSIGHTS_LOG_LEVEL", "  "), ("INSIGHTS_PAGE_SIZE", "x")]));
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_placeholder_backend_is_not_configured() {
        let mut config = Config::default();
        config.supabase_url = Some(PLACEHOLDER_SUPABASE_URL.to_string());
        config.supabase_anon_key = Some("real-key".to_string());
        assert!(!config.is_backend_configured());

        config.supabase_url = Some("https://abc.supabase.co".to_string());
        config.supabase_anon_key = Some(PLACEHOLDER_ANON_KEY.to_string());
        assert!(!config.is_backend_configured());
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = Config::default();
        config.page_size = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.supabase_url = Some("not a valid url".to_string());
        assert!(config.supabase_url().is_err());
    }
}
