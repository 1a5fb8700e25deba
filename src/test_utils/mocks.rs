//! Mock implementations for testing.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::domain::{
    AppError, DatabaseError, LedgerApi, LedgerError, LedgerTransaction, StagedWrite,
    StoredTransaction, TransactionStore, WebhookClient, WebhookError, WebhookPayload,
};

/// Account used by [`ledger_transactions`]
pub const MOCK_ACCOUNT: &str = "0:watched";

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }
}

/// `count` consecutive ledger records starting at index `first`.
///
/// Record `i` has `lt = i * 10`, a 64-hex-digit hash of `i`, `utime`
/// increasing with `i` and `success = true`.
#[must_use]
pub fn ledger_transactions(first: i64, count: usize) -> Vec<LedgerTransaction> {
    (first..first + count as i64)
        .map(|i| {
            let hash = format!("{:064x}", i);
            let lt = i * 10;
            let utime = 1_700_000_000 + i;
            LedgerTransaction {
                payload: json!({
                    "hash": hash,
                    "lt": lt,
                    "success": true,
                    "utime": utime,
                    "account": { "address": MOCK_ACCOUNT },
                }),
                hash,
                lt,
                account_address: MOCK_ACCOUNT.to_string(),
                success: true,
                utime,
            }
        })
        .collect()
}

/// In-memory transaction store.
///
/// `apply_batch` follows the database semantics: inserts are ignored when the
/// hash exists, updates can only raise `success`.
pub struct MockTransactionStore {
    storage: Arc<Mutex<HashMap<String, StoredTransaction>>>,
    batches: Arc<Mutex<Vec<Vec<StagedWrite>>>>,
    config: MockConfig,
    is_healthy: AtomicBool,
}

impl MockTransactionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            storage: Arc::new(Mutex::new(HashMap::new())),
            batches: Arc::new(Mutex::new(Vec::new())),
            config,
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Seed a committed row directly, replacing any row with the same hash
    pub fn insert(&self, tx: StoredTransaction) {
        self.storage.lock().unwrap().insert(tx.hash.clone(), tx);
    }

    pub fn get(&self, hash: &str) -> Option<StoredTransaction> {
        self.storage.lock().unwrap().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.storage.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All committed rows ordered by `lt`
    pub fn all(&self) -> Vec<StoredTransaction> {
        let mut items: Vec<_> = self.storage.lock().unwrap().values().cloned().collect();
        items.sort_by_key(|tx| tx.lt);
        items
    }

    /// Size of every `apply_batch` call so far
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    /// Every write applied so far, in order
    pub fn applied_writes(&self) -> Vec<StagedWrite> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock error".to_string());
            return Err(AppError::Database(DatabaseError::Query(msg)));
        }
        Ok(())
    }
}

impl Default for MockTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionStore for MockTransactionStore {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        self.check_should_fail()
    }

    async fn max_lt(&self, account_address: &str) -> Result<i64, AppError> {
        self.check_should_fail()?;
        let storage = self.storage.lock().unwrap();
        Ok(storage
            .values()
            .filter(|tx| tx.account_address == account_address)
            .map(|tx| tx.lt)
            .max()
            .unwrap_or(0))
    }

    async fn get_by_hash(&self, hash: &str) -> Result<Option<StoredTransaction>, AppError> {
        self.check_should_fail()?;
        Ok(self.get(hash))
    }

    async fn get_unnotified(&self) -> Result<Vec<StoredTransaction>, AppError> {
        self.check_should_fail()?;
        let storage = self.storage.lock().unwrap();
        let mut items: Vec<_> = storage
            .values()
            .filter(|tx| !tx.webhook_notified)
            .cloned()
            .collect();
        items.sort_by_key(|tx| (tx.utime, tx.lt));
        Ok(items)
    }

    async fn apply_batch(&self, writes: &[StagedWrite]) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut storage = self.storage.lock().unwrap();
        for write in writes {
            match write {
                StagedWrite::Insert(tx) => {
                    storage.entry(tx.hash.clone()).or_insert_with(|| tx.clone());
                }
                StagedWrite::Update(tx) => {
                    if let Some(existing) = storage.get_mut(&tx.hash) {
                        existing.success = existing.success || tx.success;
                        existing.utime = tx.utime;
                        existing.transaction_data = tx.transaction_data.clone();
                    }
                }
                StagedWrite::MarkNotified { hash, notified_at } => {
                    if let Some(existing) = storage.get_mut(hash) {
                        existing.webhook_notified = true;
                        existing.webhook_notified_at = Some(*notified_at);
                    }
                }
            }
        }
        self.batches.lock().unwrap().push(writes.to_vec());
        Ok(())
    }
}

/// One recorded ledger page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCall {
    pub account_address: String,
    pub after_lt: i64,
    pub before_lt: i64,
    pub limit: usize,
}

/// In-memory ledger serving pages from a fixed transaction list
pub struct MockLedgerApi {
    transactions: Arc<Mutex<Vec<LedgerTransaction>>>,
    calls: Arc<Mutex<Vec<LedgerCall>>>,
    /// 1-based call number that fails, 0 for none
    fail_on_call: AtomicUsize,
    ignore_upper_bound: AtomicBool,
}

impl MockLedgerApi {
    #[must_use]
    pub fn new() -> Self {
        Self::with_transactions(Vec::new())
    }

    #[must_use]
    pub fn with_transactions(transactions: Vec<LedgerTransaction>) -> Self {
        let api = Self {
            transactions: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_on_call: AtomicUsize::new(0),
            ignore_upper_bound: AtomicBool::new(false),
        };
        api.push_transactions(transactions);
        api
    }

    /// Append records as if the ledger had produced them since
    pub fn push_transactions(&self, transactions: Vec<LedgerTransaction>) {
        let mut stored = self.transactions.lock().unwrap();
        stored.extend(transactions);
        stored.sort_by_key(|tx| tx.lt);
    }

    /// Make the `n`-th request (1-based) fail with a network error
    pub fn fail_on_call(&self, n: usize) {
        self.fail_on_call.store(n, Ordering::Relaxed);
    }

    /// Serve records at or above `before_lt` as well
    pub fn ignore_upper_bound(&self) {
        self.ignore_upper_bound.store(true, Ordering::Relaxed);
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockLedgerApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerApi for MockLedgerApi {
    async fn get_account_transactions(
        &self,
        account_address: &str,
        after_lt: i64,
        before_lt: i64,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>, AppError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(LedgerCall {
                account_address: account_address.to_string(),
                after_lt,
                before_lt,
                limit,
            });
            calls.len()
        };
        if call_number == self.fail_on_call.load(Ordering::Relaxed) {
            return Err(AppError::Ledger(LedgerError::Network(
                "Mock connection reset".to_string(),
            )));
        }

        let bounded = before_lt > 0 && !self.ignore_upper_bound.load(Ordering::Relaxed);
        let transactions = self.transactions.lock().unwrap();
        Ok(transactions
            .iter()
            .filter(|tx| tx.lt > after_lt && (!bounded || tx.lt < before_lt))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// One recorded webhook delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    pub hash: String,
    pub at: Instant,
    pub succeeded: bool,
}

/// Webhook client recording every attempt, with scripted failures
pub struct MockWebhookClient {
    attempts: Arc<Mutex<Vec<DeliveryAttempt>>>,
    delivered: Arc<Mutex<Vec<WebhookPayload>>>,
    fail_all: AtomicBool,
    fail_next: AtomicUsize,
    failing_hashes: Arc<Mutex<HashSet<String>>>,
}

impl MockWebhookClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            attempts: Arc::new(Mutex::new(Vec::new())),
            delivered: Arc::new(Mutex::new(Vec::new())),
            fail_all: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            failing_hashes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// A client whose every delivery is rejected
    #[must_use]
    pub fn failing() -> Self {
        let client = Self::new();
        client.fail_all.store(true, Ordering::Relaxed);
        client
    }

    /// Reject the next `n` deliveries
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::Relaxed);
    }

    /// Always reject deliveries for `hash`
    pub fn fail_hash(&self, hash: &str) {
        self.failing_hashes.lock().unwrap().insert(hash.to_string());
    }

    pub fn attempts(&self) -> Vec<DeliveryAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    /// Payloads that were accepted
    pub fn delivered(&self) -> Vec<WebhookPayload> {
        self.delivered.lock().unwrap().clone()
    }

    fn should_fail(&self, hash: &str) -> bool {
        if self.fail_all.load(Ordering::Relaxed)
            || self.failing_hashes.lock().unwrap().contains(hash)
        {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockWebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookClient for MockWebhookClient {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), AppError> {
        let failed = self.should_fail(&payload.hash);
        self.attempts.lock().unwrap().push(DeliveryAttempt {
            hash: payload.hash.clone(),
            at: Instant::now(),
            succeeded: !failed,
        });

        if failed {
            return Err(AppError::Webhook(WebhookError::Rejected { status_code: 500 }));
        }
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
