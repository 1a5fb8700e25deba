//! HTTP webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use crate::domain::{AppError, WebhookClient, WebhookError, WebhookPayload};

/// Default content type of webhook requests
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Webhook endpoint configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    /// Sent as a bearer token when set
    pub token: Option<SecretString>,
    pub content_type: String,
    pub timeout: Duration,
}

impl WebhookConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Posts webhook payloads as JSON
#[derive(Debug, Clone)]
pub struct HttpWebhookClient {
    http_client: Client,
    config: WebhookConfig,
}

impl HttpWebhookClient {
    pub fn new(config: WebhookConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Webhook(WebhookError::Network(e.to_string())))?;

        Ok(Self {
            http_client,
            config,
        })
    }
}

#[async_trait]
impl WebhookClient for HttpWebhookClient {
    #[instrument(skip(self, payload), fields(hash = %payload.hash))]
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), AppError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Webhook(WebhookError::Serialization(e.to_string())))?;

        let mut request = self
            .http_client
            .post(&self.config.url)
            .header(CONTENT_TYPE, self.config.content_type.as_str())
            .body(body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Webhook(WebhookError::Network(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Webhook(WebhookError::Rejected {
                status_code: status.as_u16(),
            }));
        }

        debug!(status = %status, "Webhook accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_config_defaults() {
        let config = WebhookConfig::new("https://example.com/hook");
        assert_eq!(config.url, "https://example.com/hook");
        assert_eq!(config.content_type, DEFAULT_CONTENT_TYPE);
        assert!(config.token.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
