use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{errors::ConfigError, reminders::DEFAULT_LEAD_MINUTES, store::ReconnectPolicy};

/// Client configuration, read from a TOML file such as:
///
/// ```toml
/// [redis]
/// url = "redis://127.0.0.1:6379"
/// prefix = "campus"
/// reconnect_max_ms = 5000
///
/// [membership]
/// rollback_on_failure = false
///
/// [reminders]
/// lead_minutes = 60
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub membership: MembershipSettings,
    #[serde(default)]
    pub reminders: ReminderSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Upper bound on the delay between change feed reconnection attempts.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            prefix: default_prefix(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl RedisSettings {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let defaults = ReconnectPolicy::default();
        let max = Duration::from_millis(self.reconnect_max_ms);
        ReconnectPolicy {
            base: defaults.base.min(max),
            max,
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_prefix() -> String {
    "campus".to_string()
}

fn default_reconnect_max_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MembershipSettings {
    /// Revert the local optimistic change when a join/leave write fails.
    #[serde(default)]
    pub rollback_on_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderSettings {
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: i64,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            lead_minutes: default_lead_minutes(),
        }
    }
}

fn default_lead_minutes() -> i64 {
    DEFAULT_LEAD_MINUTES
}

impl ClientConfig {
    /// Parses a TOML document; `origin` names it in errors.
    pub fn from_toml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Applies overrides from the environment (`REDIS_URL`).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("REDIS_URL")
            && !url.trim().is_empty()
        {
            self.redis.url = url;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
        assert_eq!(config.redis.prefix, "campus");
        assert!(!config.membership.rollback_on_failure);
        assert_eq!(config.reminders.lead_minutes, 60);
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let config = ClientConfig::from_toml(
            "[redis]\nprefix = \"staging\"\n\n[membership]\nrollback_on_failure = true\n",
            "inline",
        )
        .expect("parse");
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
        assert_eq!(config.redis.prefix, "staging");
        assert!(config.membership.rollback_on_failure);
        assert_eq!(config.reminders.lead_minutes, 60);
    }

    #[test]
    fn reconnect_cap_comes_from_redis_section() {
        let config = ClientConfig::from_toml("[redis]\nreconnect_max_ms = 50\n", "inline").expect("parse");
        let policy = config.redis.reconnect_policy();
        assert_eq!(policy.max, Duration::from_millis(50));
        assert_eq!(policy.base, Duration::from_millis(50));
        assert_eq!(ClientConfig::default().redis.reconnect_policy(), ReconnectPolicy::default());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ClientConfig::load(&dir.path().join("campus.toml")).expect("load");
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[reminders]\nlead_minutes = \"soon\"").expect("write");
        let err = ClientConfig::load(file.path()).expect_err("malformed");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn serializes_back_to_toml() {
        let rendered = toml::to_string_pretty(&ClientConfig::default()).expect("serialize");
        assert!(rendered.contains("lead_minutes = 60"));
        assert!(rendered.contains("[redis]"));
    }
}
