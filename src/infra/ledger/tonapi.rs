//! TonAPI ledger transport.
//!
//! Serves one page of an account's transaction history per request from
//! `GET /v2/blockchain/accounts/{account}/transactions`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::domain::{AppError, LedgerApi, LedgerError, LedgerTransaction};

/// Default TonAPI base URL
pub const DEFAULT_TON_API_URL: &str = "https://tonapi.io";

/// TonAPI client configuration
#[derive(Debug, Clone)]
pub struct TonApiConfig {
    pub base_url: String,
    /// Sent as a bearer token when set
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
}

impl Default for TonApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TON_API_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<Value>,
}

/// Ledger API backed by TonAPI
#[derive(Debug, Clone)]
pub struct TonApiClient {
    http_client: Client,
    api_key: Option<SecretString>,
    base_url: String,
}

impl TonApiClient {
    pub fn new(config: TonApiConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Ledger(LedgerError::Network(e.to_string())))?;

        Ok(Self {
            http_client,
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn transactions_url(&self, account_address: &str) -> String {
        format!(
            "{}/v2/blockchain/accounts/{}/transactions",
            self.base_url, account_address
        )
    }

    fn page_query(after_lt: i64, before_lt: i64, limit: usize) -> Vec<(&'static str, String)> {
        let mut query = vec![("after_lt", after_lt.to_string())];
        if before_lt > 0 {
            query.push(("before_lt", before_lt.to_string()));
        }
        query.push(("limit", limit.to_string()));
        query.push(("sort_order", "asc".to_string()));
        query
    }
}

#[async_trait]
impl LedgerApi for TonApiClient {
    #[instrument(skip(self))]
    async fn get_account_transactions(
        &self,
        account_address: &str,
        after_lt: i64,
        before_lt: i64,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>, AppError> {
        let url = self.transactions_url(account_address);
        debug!(url = %url, "Calling TonAPI transactions endpoint");

        let mut request = self
            .http_client
            .get(&url)
            .query(&Self::page_query(after_lt, before_lt, limit));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "TonAPI request failed");
            AppError::Ledger(LedgerError::Network(e.to_string()))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "TonAPI returned error");
            return Err(AppError::Ledger(LedgerError::ApiError {
                status_code: status.as_u16(),
                message: body,
            }));
        }

        let page: TransactionsResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse TonAPI response");
            AppError::Ledger(LedgerError::ParseError(e.to_string()))
        })?;

        let transactions = page
            .transactions
            .into_iter()
            .map(|raw| LedgerTransaction::from_raw(raw, account_address))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = transactions.len(), "TonAPI page received");
        Ok(transactions)
    }
}
