//! Bounded re-scan of a past logical-time range.
//!
//! Only records strictly below the `before_lt` ceiling fixed at the start of
//! the run are touched, so this can run alongside the forward scan, which
//! only appends at or above the stored watermark.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::domain::{AppError, TransactionStore, ValidationError, decide};

use super::batch::{Applied, BatchCommitter};
use super::latest::FetchSettings;
use super::pager::LedgerFetchClient;
use super::shutdown::Shutdown;

/// Reject empty or negative ranges
pub(crate) fn check_range(after_lt: i64, before_lt: i64) -> Result<(), AppError> {
    if after_lt < 0 || before_lt <= after_lt {
        return Err(AppError::Validation(ValidationError::InvalidField {
            field: "before_lt".to_string(),
            message: format!(
                "range ({}, {}) is empty or unbounded",
                after_lt, before_lt
            ),
        }));
    }
    Ok(())
}

/// Inserts missed transactions and upgrades failed ones that later succeeded
pub struct MissingTransactionFetcher {
    client: LedgerFetchClient,
    store: Arc<dyn TransactionStore>,
    settings: FetchSettings,
}

impl MissingTransactionFetcher {
    #[must_use]
    pub fn new(
        client: LedgerFetchClient,
        store: Arc<dyn TransactionStore>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    /// Reconcile `(after_lt, before_lt)`; returns inserts plus updates
    #[instrument(skip(self, shutdown), fields(account = %self.settings.account_address))]
    pub async fn fetch(
        &self,
        after_lt: i64,
        before_lt: i64,
        shutdown: Shutdown,
    ) -> Result<usize, AppError> {
        check_range(after_lt, before_lt)?;

        let account = self.settings.account_address.as_str();
        info!(after_lt, before_lt, "Starting missing transaction fetch");

        let mut pager =
            self.client
                .fetch(account, after_lt, before_lt, self.settings.page_size, shutdown);
        let mut committer = BatchCommitter::new(Arc::clone(&self.store), self.settings.batch_size);
        let (mut inserted, mut updated) = (0usize, 0usize);

        while let Some(incoming) = pager.next().await {
            let existing = committer.get_by_hash(&incoming.hash).await?;
            match committer
                .apply(decide(existing.as_ref(), &incoming, account))
                .await?
            {
                Applied::Inserted => {
                    inserted += 1;
                    debug!(hash = %incoming.hash, lt = incoming.lt, "Added missing transaction");
                }
                Applied::Updated => {
                    updated += 1;
                    debug!(hash = %incoming.hash, "Updated transaction from unsuccessful to successful");
                }
                Applied::Skipped => {
                    debug!(hash = %incoming.hash, "Transaction already exists and no update needed");
                }
            }
        }

        committer.finalize().await?;

        info!(
            inserted,
            updated,
            pages = pager.pages_fetched(),
            stop_reason = ?pager.stop_reason(),
            "Missing transaction fetch complete"
        );
        Ok(inserted + updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LedgerApi, StoredTransaction};
    use crate::test_utils::{MockLedgerApi, MockTransactionStore, ledger_transactions};
    use std::num::NonZeroU32;

    const ACCOUNT: &str = "0:watched";

    fn fetcher(
        api: &Arc<MockLedgerApi>,
        store: &Arc<MockTransactionStore>,
    ) -> MissingTransactionFetcher {
        let client = LedgerFetchClient::new(
            Arc::clone(api) as Arc<dyn LedgerApi>,
            NonZeroU32::new(1000).unwrap(),
        );
        MissingTransactionFetcher::new(client, Arc::clone(store) as _, FetchSettings::new(ACCOUNT))
    }

    #[tokio::test]
    async fn test_fills_gaps_below_ceiling() {
        let all = ledger_transactions(1, 10);
        let api = Arc::new(MockLedgerApi::with_transactions(all.clone()));
        let store = Arc::new(MockTransactionStore::new());
        for tx in all.iter().step_by(2) {
            store.insert(StoredTransaction::from_ledger(tx, ACCOUNT));
        }
        let ceiling = all[9].lt;

        let processed = fetcher(&api, &store)
            .fetch(0, ceiling, Shutdown::never())
            .await
            .unwrap();

        // Odd indices below the ceiling: 1, 3, 5, 7 (9 is the ceiling itself)
        assert_eq!(processed, 4);
        assert_eq!(store.len(), 9);
        assert!(store.get(&all[9].hash).is_none());
    }

    #[tokio::test]
    async fn test_upgrades_failed_transaction_once() {
        let mut incoming = ledger_transactions(1, 1).remove(0);
        incoming.hash = "abc".to_string();
        let mut failed = incoming.clone();
        failed.success = false;

        let store = Arc::new(MockTransactionStore::new());
        store.insert(StoredTransaction::from_ledger(&failed, ACCOUNT));
        let api = Arc::new(MockLedgerApi::with_transactions(vec![incoming.clone()]));

        let processed = fetcher(&api, &store)
            .fetch(0, incoming.lt + 1, Shutdown::never())
            .await
            .unwrap();

        assert_eq!(processed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("abc").unwrap().success);
        let writes = store.applied_writes();
        assert_eq!(writes.len(), 1);
        assert!(matches!(writes[0], crate::domain::StagedWrite::Update(_)));
    }

    #[tokio::test]
    async fn test_successful_transaction_is_not_downgraded() {
        let mut incoming = ledger_transactions(1, 1).remove(0);
        let store = Arc::new(MockTransactionStore::new());
        store.insert(StoredTransaction::from_ledger(&incoming, ACCOUNT));
        incoming.success = false;
        let api = Arc::new(MockLedgerApi::with_transactions(vec![incoming.clone()]));

        let processed = fetcher(&api, &store)
            .fetch(0, incoming.lt + 1, Shutdown::never())
            .await
            .unwrap();

        assert_eq!(processed, 0);
        assert!(store.get(&incoming.hash).unwrap().success);
        assert!(store.applied_writes().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_or_unbounded_range() {
        let api = Arc::new(MockLedgerApi::new());
        let store = Arc::new(MockTransactionStore::new());
        let job = fetcher(&api, &store);

        for (after, before) in [(0, 0), (10, 10), (10, 5), (-1, 5)] {
            let result = job.fetch(after, before, Shutdown::never()).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
        assert!(api.calls().is_empty());
    }
}
