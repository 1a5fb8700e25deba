//! Domain types with validation support.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use super::error::LedgerError;

/// A transaction as reported by the ledger API.
///
/// Only the fields the watcher reasons about are lifted out; the complete
/// record is carried verbatim in `payload`.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransaction {
    pub hash: String,
    /// Logical time, the per-account ordering and pagination cursor
    pub lt: i64,
    pub account_address: String,
    pub success: bool,
    /// Unix timestamp of execution
    pub utime: i64,
    pub payload: Value,
}

impl LedgerTransaction {
    /// Build from one raw element of a ledger page.
    ///
    /// `account.address` is used when present, otherwise `fallback_account`.
    pub fn from_raw(raw: Value, fallback_account: &str) -> Result<Self, LedgerError> {
        let hash = raw
            .get("hash")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| LedgerError::ParseError("transaction is missing 'hash'".to_string()))?
            .to_string();
        let lt = raw.get("lt").and_then(Value::as_i64).ok_or_else(|| {
            LedgerError::ParseError(format!("transaction {} is missing 'lt'", hash))
        })?;
        let success = raw.get("success").and_then(Value::as_bool).ok_or_else(|| {
            LedgerError::ParseError(format!("transaction {} is missing 'success'", hash))
        })?;
        let utime = raw.get("utime").and_then(Value::as_i64).ok_or_else(|| {
            LedgerError::ParseError(format!("transaction {} is missing 'utime'", hash))
        })?;
        let account_address = raw
            .pointer("/account/address")
            .and_then(Value::as_str)
            .unwrap_or(fallback_account)
            .to_string();

        Ok(Self {
            hash,
            lt,
            account_address,
            success,
            utime,
            payload: raw,
        })
    }
}

/// A transaction persisted by the watcher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredTransaction {
    pub hash: String,
    pub lt: i64,
    pub account_address: String,
    pub success: bool,
    pub utime: i64,
    pub webhook_notified: bool,
    pub webhook_notified_at: Option<DateTime<Utc>>,
    /// Full ledger record; `None` when the stored copy could not be decoded
    pub transaction_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl StoredTransaction {
    /// Map a freshly seen ledger record into its stored form.
    ///
    /// The watched account is recorded rather than the address echoed by the
    /// API, so the per-account watermark query always matches.
    #[must_use]
    pub fn from_ledger(incoming: &LedgerTransaction, account_address: &str) -> Self {
        Self {
            hash: incoming.hash.clone(),
            lt: incoming.lt,
            account_address: account_address.to_string(),
            success: incoming.success,
            utime: incoming.utime,
            webhook_notified: false,
            webhook_notified_at: None,
            transaction_data: Some(incoming.payload.clone()),
            created_at: Utc::now(),
        }
    }

    /// Overwrite the outcome fields from a newer sighting of the same record.
    /// Notification bookkeeping is left untouched.
    pub fn apply_outcome(&mut self, incoming: &LedgerTransaction) {
        self.success = incoming.success;
        self.utime = incoming.utime;
        self.transaction_data = Some(incoming.payload.clone());
    }
}

/// Outcome of the ingestion policy for one incoming record
#[derive(Debug, Clone, PartialEq)]
pub enum IngestionDecision {
    Insert(StoredTransaction),
    Update(StoredTransaction),
    Skip,
}

/// A write staged in a store session, applied on commit
#[derive(Debug, Clone, PartialEq)]
pub enum StagedWrite {
    Insert(StoredTransaction),
    Update(StoredTransaction),
    MarkNotified {
        hash: String,
        notified_at: DateTime<Utc>,
    },
}


/// Body POSTed to the configured webhook endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WebhookPayload {
    #[schema(example = "9a3c0f4e5b1d2c7a8e6f0b3d4c5a6e7f8091a2b3c4d5e6f708192a3b4c5d6e7f")]
    pub hash: String,
    #[schema(example = 47_812_001_000_003_i64)]
    pub lt: i64,
    #[schema(example = "0:0fc009519c62c9262c9030bee05b5c805cb8f32ce3b8499791e0f82678075261")]
    pub account_address: String,
    pub success: bool,
    #[schema(example = 1718300000)]
    pub utime: i64,
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub transaction_data: Option<Value>,
}

impl From<&StoredTransaction> for WebhookPayload {
    fn from(tx: &StoredTransaction) -> Self {
        Self {
            hash: tx.hash.clone(),
            lt: tx.lt,
            account_address: tx.account_address.clone(),
            success: tx.success,
            utime: tx.utime,
            created_at: tx.created_at,
            transaction_data: tx.transaction_data.clone(),
        }
    }
}

/// Request to reconcile an explicit logical-time range
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_lt_range"))]
pub struct FetchMissingRequest {
    /// Exclusive lower bound
    #[validate(range(min = 0, message = "after_lt must not be negative"))]
    #[schema(example = 0)]
    pub after_lt: i64,
    /// Exclusive upper bound
    #[schema(example = 47_812_001_000_003_i64)]
    pub before_lt: i64,
}

fn validate_lt_range(request: &FetchMissingRequest) -> Result<(), validator::ValidationError> {
    if request.before_lt <= request.after_lt {
        let mut err = validator::ValidationError::new("lt_range");
        err.message = Some("before_lt must be greater than after_lt".into());
        return Err(err);
    }
    Ok(())
}

/// Result of a manually triggered fetch job
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobRunResponse {
    #[schema(example = "fetch-latest-transactions")]
    pub job: String,
    /// Transactions inserted or updated
    #[schema(example = 12)]
    pub processed: usize,
}

/// Outcome of one webhook notification run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct NotificationSummary {
    /// Unnotified transactions found at the start of the run
    pub pending: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall service status
    pub status: HealthStatus,
    /// Database health status
    pub database: HealthStatus,
    /// Watched wallet
    pub wallet_address: String,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(database: HealthStatus, wallet_address: String) -> Self {
        Self {
            status: database,
            database,
            wallet_address,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Error type identifier
    #[schema(example = "validation_error")]
    pub r#type: String,
    /// Human-readable error message
    #[schema(example = "before_lt must be greater than after_lt")]
    pub message: String,
}
