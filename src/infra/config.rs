// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub lookup: LookupConfig,

    /// Session-handoff listener settings (optional section in config.toml).
    #[serde(default)]
    pub handoff: Option<HandoffConfig>,
}

/// Base URLs for every remote collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// JWT credential exchange endpoint.
    pub auth_url: String,
    /// Assistant workflow webhook (chat runs).
    pub assistant_url: String,
    /// Conversation/message persistence API.
    pub persistence_url: String,
    /// Report webhook base (spreadsheet blobs).
    pub report_webhook_url: String,
    /// Product report API base (JSON rows + CSV URLs).
    pub report_api_url: String,
    /// Market-value search webhook.
    pub search_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://market.vendora.app/wp-json/jwt-auth/v1/token".into(),
            assistant_url: "https://ai.vendora.app/webhook/chat".into(),
            persistence_url: "https://data.vendora.app/rest/v1".into(),
            report_webhook_url: "https://hooks.vendora.app/webhook".into(),
            report_api_url: "https://api.vendora.app/api/v1".into(),
            search_url: "https://hooks.vendora.app/webhook/lookup-market-values".into(),
        }
    }
}

/// Run polling behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Seconds between run status polls.
    pub poll_interval_secs: u64,
    /// Give up on a run after this many seconds of polling.
    pub poll_timeout_secs: u64,
    /// Remote call timeout for the assistant webhook.
    pub request_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            poll_timeout_secs: 120,
            request_timeout_secs: 120,
        }
    }
}

/// Thread-history eviction tuning for token-limit recovery.
///
/// These are heuristics, not guarantees: evicting `evict_count` entries may
/// still leave a history over the remote limit, in which case the resend
/// fails terminally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Only evict when the thread holds more than this many entries.
    pub evict_threshold: usize,
    /// How many of the oldest entries to drop per eviction.
    pub evict_count: usize,
    /// How many automatic resends a token-limit failure may trigger.
    pub max_retries: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            evict_threshold: 10,
            evict_count: 2,
            max_retries: 1,
        }
    }
}

/// Market-value lookup sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    pub sources: Vec<String>,
    /// API key forwarded to the search collaborator (env override:
    /// VENDORA_SEARCH_API_KEY).
    pub api_key: Option<String>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            sources: crate::lookup::DEFAULT_SOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            api_key: None,
        }
    }
}

/// Session-handoff listener: accepts a one-time token + profile push from
/// the hosting marketplace dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    pub port: u16,
    /// Only handoffs whose Origin header matches exactly are accepted.
    pub expected_origin: String,
    /// Where to announce readiness on startup (best effort).
    pub parent_ready_url: Option<String>,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            port: 7614,
            expected_origin: "https://market.vendora.app".into(),
            parent_ready_url: None,
        }
    }
}

impl Config {
    /// Load from the default config path, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&paths::config_file_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("VENDORA_SEARCH_API_KEY") {
            if !key.is_empty() {
                self.lookup.api_key = Some(key);
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_history_tuning_matches_source_heuristic() {
        let c = HistoryConfig::default();
        assert_eq!(c.evict_threshold, 10);
        assert_eq!(c.evict_count, 2);
        assert_eq!(c.max_retries, 1);
    }

    #[test]
    fn test_default_poll_interval_one_second() {
        assert_eq!(RunConfig::default().poll_interval_secs, 1);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [history]
            evict_count = 4
            "#,
        )
        .unwrap();
        assert_eq!(parsed.history.evict_count, 4);
        assert_eq!(parsed.history.evict_threshold, 10);
        assert_eq!(parsed.run.poll_interval_secs, 1);
        assert_eq!(parsed.lookup.sources.len(), 2);
    }

    #[test]
    fn test_round_trip() {
        let config = Config::default();
        let s = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&s).unwrap();
        assert_eq!(
            parsed.endpoints.assistant_url,
            config.endpoints.assistant_url
        );
        assert_eq!(parsed.history.evict_count, config.history.evict_count);
    }

    #[test]
    fn test_load_from_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.history.evict_threshold, 10);
    }
}
