//! Forward scan from the stored watermark to the head of the ledger.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::domain::{AppError, TransactionStore, decide};

use super::batch::{BatchCommitter, DEFAULT_BATCH_SIZE};
use super::pager::{DEFAULT_PAGE_SIZE, LedgerFetchClient};
use super::shutdown::Shutdown;

/// Settings shared by the fetch jobs
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Watched account
    pub account_address: String,
    pub page_size: usize,
    pub batch_size: usize,
}

impl FetchSettings {
    #[must_use]
    pub fn new(account_address: impl Into<String>) -> Self {
        Self {
            account_address: account_address.into(),
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Inserts transactions newer than anything stored.
///
/// Never updates existing rows; outcome upgrades belong to the missing scan.
pub struct LatestTransactionFetcher {
    client: LedgerFetchClient,
    store: Arc<dyn TransactionStore>,
    settings: FetchSettings,
}

impl LatestTransactionFetcher {
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

    /// Run one forward scan; returns the number of inserted transactions
    #[instrument(skip(self, shutdown), fields(account = %self.settings.account_address))]
    pub async fn fetch(&self, shutdown: Shutdown) -> Result<usize, AppError> {
        let account = self.settings.account_address.as_str();
        let max_lt = self.store.max_lt(account).await?;

        info!(max_lt, "Starting latest transaction fetch");

        let mut pager = self
            .client
            .fetch(account, max_lt, 0, self.settings.page_size, shutdown);
        let mut committer = BatchCommitter::new(Arc::clone(&self.store), self.settings.batch_size);
        let mut inserted = 0;

        while let Some(incoming) = pager.next().await {
            if committer.get_by_hash(&incoming.hash).await?.is_some() {
                debug!(hash = %incoming.hash, "Transaction already exists, skipping");
                continue;
            }

            committer.apply(decide(None, &incoming, account)).await?;
            inserted += 1;
            debug!(hash = %incoming.hash, lt = incoming.lt, "Added new transaction");
        }

        committer.finalize().await?;

        info!(
            inserted,
            pages = pager.pages_fetched(),
            stop_reason = ?pager.stop_reason(),
            "Latest transaction fetch complete"
        );
        Ok(inserted)
    }
}
