//! Reconciliation service: the entry points the scheduler and admin API call.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::domain::{AppError, HealthResponse, HealthStatus, TransactionStore};

use super::latest::{FetchSettings, LatestTransactionFetcher};
use super::missing::{MissingTransactionFetcher, check_range};
use super::pager::LedgerFetchClient;
use super::shutdown::Shutdown;

/// Facade over the latest and missing jobs.
///
/// Every failure is logged here before being returned, so callers only need
/// to decide what to do with it.
pub struct ReconciliationService {
    store: Arc<dyn TransactionStore>,
    latest: LatestTransactionFetcher,
    missing: MissingTransactionFetcher,
    account_address: String,
}

impl ReconciliationService {
    /// `latest_client` and `missing_client` may be clones of one client to
    /// share its rate limiter.
    #[must_use]
    pub fn new(
        store: Arc<dyn TransactionStore>,
        latest_client: LedgerFetchClient,
        missing_client: LedgerFetchClient,
        settings: FetchSettings,
    ) -> Self {
        Self {
            latest: LatestTransactionFetcher::new(
                latest_client,
                Arc::clone(&store),
                settings.clone(),
            ),
            missing: MissingTransactionFetcher::new(
                missing_client,
                Arc::clone(&store),
                settings.clone(),
            ),
            account_address: settings.account_address,
            store,
        }
    }

    /// Ingest everything newer than the stored watermark
    #[instrument(skip(self, shutdown))]
    pub async fn fetch_latest(&self, shutdown: Shutdown) -> Result<usize, AppError> {
        self.latest.fetch(shutdown).await.map_err(|e| {
            error!(error = %e, "Error occurred while fetching latest transactions");
            e
        })
    }

    /// Reconcile an explicit `(after_lt, before_lt)` range.
    ///
    /// `before_lt` is clamped to the stored watermark, read once here, so a
    /// range scan only fills gaps and never moves the watermark itself.
    #[instrument(skip(self, shutdown))]
    pub async fn fetch_missing(
        &self,
        after_lt: i64,
        before_lt: i64,
        shutdown: Shutdown,
    ) -> Result<usize, AppError> {
        check_range(after_lt, before_lt).map_err(|e| {
            warn!(after_lt, before_lt, error = %e, "Rejected missing transaction range");
            e
        })?;

        let watermark = self.read_watermark().await?;
        let ceiling = before_lt.min(watermark);
        if ceiling <= after_lt {
            info!(after_lt, watermark, "Range lies above the watermark, nothing to reconcile");
            return Ok(0);
        }
        if ceiling < before_lt {
            info!(before_lt, watermark, "Clamping missing transaction range to watermark");
        }

        self.scan_range(after_lt, ceiling, shutdown).await
    }

    /// Reconcile everything below the current watermark.
    ///
    /// The watermark is read once; records ingested by a concurrent forward
    /// scan sit at or above it and are never touched.
    #[instrument(skip(self, shutdown))]
    pub async fn fix_missing(&self, shutdown: Shutdown) -> Result<usize, AppError> {
        let before_lt = self.read_watermark().await?;
        if before_lt <= 0 {
            info!("No stored transactions yet, skipping missing transaction fix");
            return Ok(0);
        }

        self.scan_range(0, before_lt, shutdown).await
    }

    async fn read_watermark(&self) -> Result<i64, AppError> {
        self.store
            .max_lt(&self.account_address)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to read watermark for missing transaction fetch");
                e
            })
    }

    async fn scan_range(
        &self,
        after_lt: i64,
        before_lt: i64,
        shutdown: Shutdown,
    ) -> Result<usize, AppError> {
        self.missing
            .fetch(after_lt, before_lt, shutdown)
            .await
            .map_err(|e| {
                error!(after_lt, before_lt, error = %e, "Error occurred while fetching missing transactions");
                e
            })
    }

    /// Check the store connection
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let database = match self.store.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                error!(error = %e, "Database health check failed");
                HealthStatus::Unhealthy
            }
        };
        HealthResponse::new(database, self.account_address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LedgerApi, StoredTransaction};
    use crate::test_utils::{MockLedgerApi, MockTransactionStore, ledger_transactions};
    use std::num::NonZeroU32;

    const ACCOUNT: &str = "0:watched";

    fn service(api: &Arc<MockLedgerApi>, store: &Arc<MockTransactionStore>) -> ReconciliationService {
        let client = LedgerFetchClient::new(
            Arc::clone(api) as Arc<dyn LedgerApi>,
            NonZeroU32::new(1000).unwrap(),
        );
        ReconciliationService::new(
            Arc::clone(store) as _,
            client.clone(),
            client,
            FetchSettings::new(ACCOUNT),
        )
    }

    #[tokio::test]
    async fn test_fix_missing_on_empty_store_does_not_fetch() {
        let api = Arc::new(MockLedgerApi::with_transactions(ledger_transactions(1, 5)));
        let store = Arc::new(MockTransactionStore::new());

        let processed = service(&api, &store)
            .fix_missing(Shutdown::never())
            .await
            .unwrap();

        assert_eq!(processed, 0);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fix_missing_scans_below_watermark() {
        let all = ledger_transactions(1, 6);
        let api = Arc::new(MockLedgerApi::with_transactions(all.clone()));
        let store = Arc::new(MockTransactionStore::new());
        store.insert(StoredTransaction::from_ledger(&all[0], ACCOUNT));
        store.insert(StoredTransaction::from_ledger(&all[3], ACCOUNT));

        let processed = service(&api, &store)
            .fix_missing(Shutdown::never())
            .await
            .unwrap();

        assert_eq!(processed, 2);
        let calls = api.calls();
        assert_eq!(calls[0].after_lt, 0);
        assert_eq!(calls[0].before_lt, all[3].lt);
        assert!(store.get(&all[4].hash).is_none());
    }

    #[tokio::test]
    async fn test_fetch_missing_clamps_range_to_watermark() {
        let all = ledger_transactions(1, 10);
        let api = Arc::new(MockLedgerApi::with_transactions(all.clone()));
        let store = Arc::new(MockTransactionStore::new());
        store.insert(StoredTransaction::from_ledger(&all[2], ACCOUNT));

        let processed = service(&api, &store)
            .fetch_missing(0, 10_000, Shutdown::never())
            .await
            .unwrap();

        assert_eq!(processed, 2);
        assert_eq!(store.max_lt(ACCOUNT).await.unwrap(), all[2].lt);
        assert_eq!(store.len(), 3);
        assert!(api.calls().iter().all(|call| call.before_lt == all[2].lt));
    }

    #[tokio::test]
    async fn test_fetch_missing_above_watermark_does_not_fetch() {
        let all = ledger_transactions(1, 10);
        let api = Arc::new(MockLedgerApi::with_transactions(all.clone()));
        let store = Arc::new(MockTransactionStore::new());
        store.insert(StoredTransaction::from_ledger(&all[2], ACCOUNT));
        let svc = service(&api, &store);

        assert_eq!(
            svc.fetch_missing(all[2].lt, 10_000, Shutdown::never())
                .await
                .unwrap(),
            0
        );
        // Empty store: nothing lies below the watermark
        let empty = Arc::new(MockTransactionStore::new());
        assert_eq!(
            service(&api, &empty)
                .fetch_missing(0, 10_000, Shutdown::never())
                .await
                .unwrap(),
            0
        );

        assert!(api.calls().is_empty());
        assert_eq!(store.len(), 1);
        assert!(empty.all().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_missing_rejects_empty_range_before_reading_store() {
        let api = Arc::new(MockLedgerApi::new());
        let store = Arc::new(MockTransactionStore::failing("db down"));

        let result = service(&api, &store)
            .fetch_missing(50, 10, Shutdown::never())
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_returned_to_caller() {
        let api = Arc::new(MockLedgerApi::new());
        let store = Arc::new(MockTransactionStore::failing("db down"));
        let svc = service(&api, &store);

        assert!(svc.fetch_latest(Shutdown::never()).await.is_err());
        assert!(svc.fix_missing(Shutdown::never()).await.is_err());
    }

    #[tokio::test]
    async fn test_health_check_reports_store_state() {
        let api = Arc::new(MockLedgerApi::new());
        let store = Arc::new(MockTransactionStore::new());
        let svc = service(&api, &store);

        let health = svc.health_check().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.wallet_address, ACCOUNT);

        store.set_healthy(false);
        let health = svc.health_check().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.database, HealthStatus::Unhealthy);
    }
}
