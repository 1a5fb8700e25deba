//! Domain traits defining contracts for external systems.

use async_trait::async_trait;

use super::error::AppError;
use super::types::{LedgerTransaction, StagedWrite, StoredTransaction, WebhookPayload};

/// Durable transaction store.
///
/// Reads go straight to the backing store. Writes are staged by the caller
/// (see `app::StoreSession`) and handed over in one `apply_batch` call, which
/// must apply them atomically.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Check store connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Highest stored logical time for an account, 0 when none
    async fn max_lt(&self, account_address: &str) -> Result<i64, AppError>;

    /// Point lookup by primary key
    async fn get_by_hash(&self, hash: &str) -> Result<Option<StoredTransaction>, AppError>;

    /// All transactions not yet delivered to the webhook, ordered by `utime` ascending
    async fn get_unnotified(&self) -> Result<Vec<StoredTransaction>, AppError>;

    /// Apply staged writes in one atomic unit.
    ///
    /// Inserts are idempotent on `hash`, updates never turn `success` back to
    /// false, and notification marks only touch the webhook columns.
    async fn apply_batch(&self, writes: &[StagedWrite]) -> Result<(), AppError>;
}

/// One page request against the ledger API
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Fetch up to `limit` transactions of `account_address` with
    /// `after_lt < lt`, and `lt < before_lt` unless `before_lt` is 0,
    /// sorted by `lt` ascending.
    async fn get_account_transactions(
        &self,
        account_address: &str,
        after_lt: i64,
        before_lt: i64,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>, AppError>;
}

/// Outbound webhook transport
#[async_trait]
pub trait WebhookClient: Send + Sync {
    /// Deliver one payload. `Ok` only for a 2xx response.
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), AppError>;
}
