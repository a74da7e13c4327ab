//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default WNS HTTP-pull endpoint.
pub const DEFAULT_MAILBOX_URL: &str = "https://www.betradar.com/betradar/getXmlFeed.php";

/// WNS refuses mailbox requests spaced closer than this.
pub const MAILBOX_MIN_SPACING: Duration = Duration::from_secs(10);

/// HTTP mailbox (single-slot queue) configuration.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Feed endpoint URL.
    pub url: String,
    /// Betradar-issued bookmaker name.
    pub bookmaker: String,
    /// Feed access key.
    pub key: SecretString,
    /// Per-request timeout. `None` leaves deadlines to the server.
    pub request_timeout: Option<Duration>,
}

impl MailboxConfig {
    pub fn new(bookmaker: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_MAILBOX_URL.to_string(),
            bookmaker: bookmaker.into(),
            key: SecretString::from(key.into()),
            request_timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Build config from `WNS_BOOKMAKER`, `WNS_KEY` and optional `WNS_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bookmaker = required_env("WNS_BOOKMAKER", "Set it to the Betradar bookmaker name")?;
        let key = required_env("WNS_KEY", "Set it to the WNS feed access key")?;
        let url = std::env::var("WNS_URL").unwrap_or_else(|_| DEFAULT_MAILBOX_URL.to_string());
        Ok(Self::new(bookmaker, key).with_url(url))
    }
}

/// Synchronization engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between ticks. The first tick fires immediately.
    pub interval: Duration,
    /// Capacity of the output channel. Emission waits while it is full.
    pub channel_capacity: usize,
    /// Delete delivered items from the source after each successful batch.
    pub purge_delivered: bool,
}

impl EngineConfig {
    /// Defaults for the HTTP mailbox: one request per rate-limit window.
    pub fn mailbox() -> Self {
        Self {
            interval: MAILBOX_MIN_SPACING,
            ..Self::default()
        }
    }

    /// Defaults for the FTP directory: recheck every minute.
    pub fn directory() -> Self {
        Self {
            interval: Duration::from_secs(60),
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the interval from `WNS_INTERVAL_SECS` if set.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(raw) = std::env::var("WNS_INTERVAL_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "WNS_INTERVAL_SECS".into(),
                message: format!("expected whole seconds, got {raw:?}"),
            })?;
            self.interval = Duration::from_secs(secs);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "interval".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "channel_capacity".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: MAILBOX_MIN_SPACING,
            channel_capacity: 1,
            purge_delivered: false,
        }
    }
}

fn required_env(key: &str, hint: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::mailbox().validate().is_ok());
        assert_eq!(EngineConfig::directory().interval, Duration::from_secs(60));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = EngineConfig::default().with_interval(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "interval"
        ));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = EngineConfig {
            channel_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn mailbox_config_uses_default_url() {
        let config = MailboxConfig::new("bookie", "hunter2");
        assert_eq!(config.url, DEFAULT_MAILBOX_URL);
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
