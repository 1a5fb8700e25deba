//! Environment configuration.
//!
//! Every variable carries the `TONWATCHER_` prefix. The database URL also
//! falls back to the conventional `DATABASE_URL`.

use std::env;
use std::fmt::Display;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use validator::Validate;

use crate::app::{FetchSettings, JobIntervals, NotifierConfig};
use crate::domain::ConfigError;
use crate::infra::{DEFAULT_CONTENT_TYPE, DEFAULT_TON_API_URL, TonApiConfig, WebhookConfig};

const PREFIX: &str = "TONWATCHER_";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'pretty' or 'json', got '{}'", other)),
        }
    }
}

/// Watcher configuration
#[derive(Debug, Clone, Validate)]
pub struct WatcherConfig {
    #[validate(length(min = 1, message = "Wallet address is required"))]
    pub wallet_address: String,
    #[validate(url(message = "Webhook URL must be a valid URL"))]
    pub webhook_url: String,
    pub webhook_token: Option<SecretString>,
    #[validate(range(min = 1, message = "At least one delivery attempt is required"))]
    pub webhook_max_retries: u32,
    #[validate(length(min = 1, message = "Content type is required"))]
    pub webhook_content_type: String,
    #[validate(range(min = 1))]
    pub polling_interval_secs: u64,
    #[validate(range(min = 1))]
    pub missing_interval_secs: u64,
    #[validate(range(min = 1))]
    pub notify_interval_secs: u64,
    #[validate(url(message = "TON API URL must be a valid URL"))]
    pub ton_api_url: String,
    pub ton_api_key: Option<SecretString>,
    #[validate(range(min = 1))]
    pub http_timeout_secs: u64,
    #[validate(range(min = 1, max = 1000, message = "Page size must be between 1 and 1000"))]
    pub page_size: usize,
    #[validate(range(min = 1))]
    pub batch_size: usize,
    #[validate(range(min = 1))]
    pub ledger_requests_per_second: u32,
    /// One rate limiter for both fetch jobs instead of one each
    pub share_ledger_rate_limiter: bool,
    #[validate(length(min = 1, message = "Database URL is required"))]
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub enable_scheduler: bool,
    pub log_format: LogFormat,
}

impl WatcherConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source { lookup };

        let database_url = source
            .optional("DATABASE_URL")
            .or_else(|| (source.lookup)("DATABASE_URL").filter(|v| !v.is_empty()))
            .ok_or_else(|| ConfigError::Missing(format!("{}DATABASE_URL", PREFIX)))?;

        let config = Self {
            wallet_address: source.required("WALLET_ADDRESS")?,
            webhook_url: source.required("WEBHOOK_URL")?,
            webhook_token: source.optional("WEBHOOK_TOKEN").map(SecretString::from),
            webhook_max_retries: source.parse_or("WEBHOOK_MAX_RETRIES", 3)?,
            webhook_content_type: source
                .optional("WEBHOOK_CONTENT_TYPE")
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            polling_interval_secs: source.parse_or("POLLING_INTERVAL_SECONDS", 30)?,
            missing_interval_secs: source.parse_or("MISSING_INTERVAL_SECONDS", 600)?,
            notify_interval_secs: source.parse_or("NOTIFY_INTERVAL_SECONDS", 10)?,
            ton_api_url: source
                .optional("TON_API_URL")
                .unwrap_or_else(|| DEFAULT_TON_API_URL.to_string()),
            ton_api_key: source.optional("TON_API_KEY").map(SecretString::from),
            http_timeout_secs: source.parse_or("HTTP_TIMEOUT_SECONDS", 30)?,
            page_size: source.parse_or("PAGE_SIZE", 250)?,
            batch_size: source.parse_or("BATCH_SIZE", 50)?,
            ledger_requests_per_second: source.parse_or("LEDGER_REQUESTS_PER_SECOND", 1)?,
            share_ledger_rate_limiter: source.parse_bool_or("SHARE_LEDGER_RATE_LIMITER", false)?,
            database_url,
            host: source
                .optional("HOST")
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: source.parse_or("PORT", 8080)?,
            enable_scheduler: source.parse_bool_or("ENABLE_SCHEDULER", true)?,
            log_format: source.parse_or("LOG_FORMAT", LogFormat::Pretty)?,
        };

        config.validate().map_err(|e| {
            let mut fields: Vec<_> = e.field_errors().keys().map(|k| k.to_string()).collect();
            fields.sort();
            ConfigError::Invalid {
                key: fields.join(", "),
                message: e.to_string(),
            }
        })?;

        Ok(config)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub fn requests_per_second(&self) -> NonZeroU32 {
        NonZeroU32::new(self.ledger_requests_per_second).unwrap_or(NonZeroU32::MIN)
    }

    #[must_use]
    pub fn job_intervals(&self) -> JobIntervals {
        JobIntervals {
            fetch_latest: Duration::from_secs(self.polling_interval_secs),
            fix_missing: Duration::from_secs(self.missing_interval_secs),
            send_notifications: Duration::from_secs(self.notify_interval_secs),
        }
    }

    #[must_use]
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            account_address: self.wallet_address.clone(),
            page_size: self.page_size,
            batch_size: self.batch_size,
        }
    }

    #[must_use]
    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            max_retries: self.webhook_max_retries,
            ..NotifierConfig::default()
        }
    }

    #[must_use]
    pub fn ton_api_config(&self) -> TonApiConfig {
        TonApiConfig {
            base_url: self.ton_api_url.clone(),
            api_key: self.ton_api_key.clone(),
            timeout: self.http_timeout(),
        }
    }

    #[must_use]
    pub fn webhook_config(&self) -> WebhookConfig {
        WebhookConfig {
            url: self.webhook_url.clone(),
            token: self.webhook_token.clone(),
            content_type: self.webhook_content_type.clone(),
            timeout: self.http_timeout(),
        }
    }
}

struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", PREFIX, name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.optional(name)
            .ok_or_else(|| ConfigError::Missing(format!("{}{}", PREFIX, name)))
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(name) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: format!("{}{}", PREFIX, name),
                message: format!("'{}': {}", raw, e),
            }),
            None => Ok(default),
        }
    }

    fn parse_bool_or(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(name).map(|v| v.to_ascii_lowercase()) {
            Some(v) if v == "true" || v == "1" => Ok(true),
            Some(v) if v == "false" || v == "0" => Ok(false),
            Some(v) => Err(ConfigError::Invalid {
                key: format!("{}{}", PREFIX, name),
                message: format!("'{}' is not a boolean", v),
            }),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<WatcherConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WatcherConfig::from_source(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TONWATCHER_WALLET_ADDRESS", "0:watched"),
        ("TONWATCHER_WEBHOOK_URL", "https://example.com/hook"),
        ("TONWATCHER_DATABASE_URL", "postgres://localhost/ton"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        REQUIRED.iter().chain(extra.iter()).copied().collect()
    }

    #[test]
    fn test_defaults() {
        let config = load(&REQUIRED).unwrap();

        assert_eq!(config.webhook_max_retries, 3);
        assert_eq!(config.webhook_content_type, "application/json");
        assert_eq!(config.polling_interval_secs, 30);
        assert_eq!(config.missing_interval_secs, 600);
        assert_eq!(config.notify_interval_secs, 10);
        assert_eq!(config.ton_api_url, "https://tonapi.io");
        assert_eq!(config.page_size, 250);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.requests_per_second().get(), 1);
        assert!(!config.share_ledger_rate_limiter);
        assert!(config.enable_scheduler);
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.webhook_token.is_none());
        assert!(config.ton_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&with(&[
            ("TONWATCHER_WEBHOOK_MAX_RETRIES", "5"),
            ("TONWATCHER_PAGE_SIZE", "100"),
            ("TONWATCHER_SHARE_LEDGER_RATE_LIMITER", "true"),
            ("TONWATCHER_ENABLE_SCHEDULER", "0"),
            ("TONWATCHER_LOG_FORMAT", "JSON"),
            ("TONWATCHER_WEBHOOK_TOKEN", "hook-secret"),
        ]))
        .unwrap();

        assert_eq!(config.notifier_config().max_retries, 5);
        assert_eq!(config.fetch_settings().page_size, 100);
        assert!(config.share_ledger_rate_limiter);
        assert!(!config.enable_scheduler);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.webhook_config().token.is_some());
    }

    #[test]
    fn test_missing_required_variable() {
        let result = load(&REQUIRED[1..]);
        assert!(
            matches!(result, Err(ConfigError::Missing(key)) if key == "TONWATCHER_WALLET_ADDRESS")
        );
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load(&[
            ("TONWATCHER_WALLET_ADDRESS", "0:watched"),
            ("TONWATCHER_WEBHOOK_URL", "https://example.com/hook"),
            ("DATABASE_URL", "postgres://fallback/ton"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "postgres://fallback/ton");
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = load(&with(&[("TONWATCHER_BATCH_SIZE", "fifty")]));
        assert!(
            matches!(result, Err(ConfigError::Invalid { key, .. }) if key == "TONWATCHER_BATCH_SIZE")
        );
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        for (key, value) in [
            ("TONWATCHER_PAGE_SIZE", "0"),
            ("TONWATCHER_PAGE_SIZE", "1001"),
            ("TONWATCHER_WEBHOOK_MAX_RETRIES", "0"),
            ("TONWATCHER_LEDGER_REQUESTS_PER_SECOND", "0"),
        ] {
            let result = load(&with(&[(key, value)]));
            assert!(matches!(result, Err(ConfigError::Invalid { .. })), "{}={}", key, value);
        }
    }

    #[test]
    fn test_invalid_webhook_url() {
        let result = load(&[
            ("TONWATCHER_WALLET_ADDRESS", "0:watched"),
            ("TONWATCHER_WEBHOOK_URL", "not a url"),
            ("TONWATCHER_DATABASE_URL", "postgres://localhost/ton"),
        ]);
        assert!(
            matches!(result, Err(ConfigError::Invalid { key, .. }) if key == "webhook_url")
        );
    }

    #[test]
    fn test_invalid_bool_and_log_format() {
        assert!(load(&with(&[("TONWATCHER_ENABLE_SCHEDULER", "maybe")])).is_err());
        assert!(load(&with(&[("TONWATCHER_LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let config = load(&with(&[("TONWATCHER_TON_API_KEY", "super-secret-key")])).unwrap();
        assert!(!format!("{:?}", config).contains("super-secret-key"));
    }
}
