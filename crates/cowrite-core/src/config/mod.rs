//! Runtime configuration for editor sessions.
//!
//! `CollabConfig` carries the timing constants every session shares. All
//! fields are defaulted, so an empty JSON object is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1_000;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_ROSTER_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_PRESENCE_FRESHNESS_SECS: u64 = 300;
const DEFAULT_AUTO_SNAPSHOT_DELAY_SECS: u64 = 120;
const DEFAULT_IO_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PRESENCE_RETENTION_SECS: u64 = 86_400;
const DEFAULT_CHANGE_POLL_INTERVAL_MS: u64 = 2_000;

/// Timing knobs for the synchronizer, presence tracker, and version manager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct CollabConfig {
    pub save_debounce_ms: u64,
    pub heartbeat_interval_secs: u64,
    pub roster_poll_interval_secs: u64,
    /// Presence rows older than this are invisible
    pub presence_freshness_secs: u64,
    pub auto_snapshot_delay_secs: u64,
    /// Upper bound on any single store or parser call
    pub io_timeout_secs: u64,
    /// Age after which the janitor deletes presence rows
    pub presence_retention_secs: u64,
    /// How often a shared database is checked for saves from other processes
    pub change_poll_interval_ms: u64,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            roster_poll_interval_secs: DEFAULT_ROSTER_POLL_INTERVAL_SECS,
            presence_freshness_secs: DEFAULT_PRESENCE_FRESHNESS_SECS,
            auto_snapshot_delay_secs: DEFAULT_AUTO_SNAPSHOT_DELAY_SECS,
            io_timeout_secs: DEFAULT_IO_TIMEOUT_SECS,
            presence_retention_secs: DEFAULT_PRESENCE_RETENTION_SECS,
            change_poll_interval_ms: DEFAULT_CHANGE_POLL_INTERVAL_MS,
        }
    }
}

impl CollabConfig {
    pub const fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub const fn roster_poll_interval(&self) -> Duration {
        Duration::from_secs(self.roster_poll_interval_secs)
    }

    pub const fn presence_freshness(&self) -> Duration {
        Duration::from_secs(self.presence_freshness_secs)
    }

    pub const fn auto_snapshot_delay(&self) -> Duration {
        Duration::from_secs(self.auto_snapshot_delay_secs)
    }

    pub const fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub const fn presence_retention(&self) -> Duration {
        Duration::from_secs(self.presence_retention_secs)
    }

    pub const fn change_poll_interval(&self) -> Duration {
        Duration::from_millis(self.change_poll_interval_ms)
    }

    /// Reject configs that would spin timers or hide live collaborators
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("save_debounce_ms", self.save_debounce_ms),
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("roster_poll_interval_secs", self.roster_poll_interval_secs),
            ("presence_freshness_secs", self.presence_freshness_secs),
            ("auto_snapshot_delay_secs", self.auto_snapshot_delay_secs),
            ("io_timeout_secs", self.io_timeout_secs),
            ("presence_retention_secs", self.presence_retention_secs),
            ("change_poll_interval_ms", self.change_poll_interval_ms),
        ];
        if let Some((field, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(Error::InvalidInput(format!("{field} must be greater than zero")));
        }
        if self.presence_freshness_secs < self.heartbeat_interval_secs {
            return Err(Error::InvalidInput(
                "presence_freshness_secs must not be shorter than heartbeat_interval_secs"
                    .to_string(),
            ));
        }
        if self.presence_retention_secs < self.presence_freshness_secs {
            return Err(Error::InvalidInput(
                "presence_retention_secs must not be shorter than presence_freshness_secs"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse and validate a JSON config payload.
pub fn parse_collab_config(payload: &str) -> Result<CollabConfig> {
    let config: CollabConfig = serde_json::from_str(payload)?;
    config.validate()?;
    Ok(config)
}

/// Where the document parser lives.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ParserConfig {
    pub endpoint: Option<String>,
    pub access_token: Option<String>,
}

impl std::fmt::Debug for ParserConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ParserConfig")
            .field("endpoint", &self.endpoint)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ParserConfig {
    pub fn new(endpoint: Option<String>, access_token: Option<String>) -> Result<Self> {
        let endpoint = normalize_text_option(endpoint);
        if let Some(endpoint) = endpoint.as_deref() {
            if !is_http_url(endpoint) {
                return Err(Error::InvalidInput(
                    "parser endpoint must include http:// or https://".to_string(),
                ));
            }
        }
        Ok(Self {
            endpoint,
            access_token: normalize_text_option(access_token),
        })
    }

    pub const fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_payload_uses_defaults() {
        let config = parse_collab_config("{}").unwrap();
        assert_eq!(config, CollabConfig::default());
        assert_eq!(config.save_debounce(), Duration::from_secs(1));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.roster_poll_interval(), Duration::from_secs(10));
        assert_eq!(config.presence_freshness(), Duration::from_secs(300));
        assert_eq!(config.auto_snapshot_delay(), Duration::from_secs(120));
        assert_eq!(config.change_poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let error = parse_collab_config(r#"{"save_debounce":5}"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let error = parse_collab_config(r#"{"roster_poll_interval_secs":0}"#).unwrap_err();
        assert!(error.to_string().contains("roster_poll_interval_secs"));
    }

    #[test]
    fn validate_rejects_freshness_shorter_than_heartbeat() {
        let config = CollabConfig {
            heartbeat_interval_secs: 60,
            presence_freshness_secs: 30,
            ..CollabConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parser_config_normalizes_values() {
        let config =
            ParserConfig::new(Some(" https://parse.example.com ".to_string()), Some(" ".to_string()))
                .unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("https://parse.example.com"));
        assert_eq!(config.access_token, None);
        assert!(config.is_configured());

        assert!(ParserConfig::new(Some("parse.example.com".to_string()), None).is_err());
        assert!(!ParserConfig::new(None, None).unwrap().is_configured());
    }

    #[test]
    fn parser_config_debug_redacts_token() {
        let config = ParserConfig::new(None, Some("secret".to_string())).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
