//! End-to-end behaviour of the fetch jobs and notifier over in-memory backends.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use ton_watcher::app::{
    FetchSettings, LedgerFetchClient, NotifierConfig, ReconciliationService, Shutdown,
    WebhookNotifier,
};
use ton_watcher::domain::{LedgerTransaction, StoredTransaction, TransactionStore};
use ton_watcher::test_utils::{
    MOCK_ACCOUNT, MockLedgerApi, MockTransactionStore, MockWebhookClient, ledger_transactions,
};

fn service_with_page_size(
    api: &Arc<MockLedgerApi>,
    store: &Arc<MockTransactionStore>,
    page_size: usize,
) -> ReconciliationService {
    let ledger = LedgerFetchClient::new(Arc::clone(api) as _, NonZeroU32::new(10_000).unwrap());
    let mut settings = FetchSettings::new(MOCK_ACCOUNT);
    settings.page_size = page_size;
    settings.batch_size = 7;
    ReconciliationService::new(Arc::clone(store) as _, ledger.clone(), ledger, settings)
}

fn notifier(store: &Arc<MockTransactionStore>, webhook: &Arc<MockWebhookClient>) -> WebhookNotifier {
    WebhookNotifier::new(
        Arc::clone(store) as _,
        Arc::clone(webhook) as _,
        NotifierConfig {
            max_retries: 2,
            backoff_base: Duration::from_millis(1),
        },
    )
}

fn failed(mut tx: LedgerTransaction) -> LedgerTransaction {
    tx.success = false;
    tx.payload["success"] = serde_json::Value::Bool(false);
    tx
}

#[tokio::test]
async fn test_replaying_a_range_is_idempotent() {
    let all = ledger_transactions(1, 30);
    let api = Arc::new(MockLedgerApi::with_transactions(all.clone()));
    let store = Arc::new(MockTransactionStore::new());
    // Only the newest record is stored, everything below it is a gap
    store.insert(StoredTransaction::from_ledger(&all[29], MOCK_ACCOUNT));
    let service = service_with_page_size(&api, &store, 8);

    let first = service
        .fetch_missing(0, 1_000, Shutdown::never())
        .await
        .unwrap();
    let snapshot = store.all();

    let second = service
        .fetch_missing(0, 1_000, Shutdown::never())
        .await
        .unwrap();

    assert_eq!(first, 29);
    assert_eq!(second, 0);
    assert_eq!(store.all(), snapshot);
}

#[tokio::test]
async fn test_replaying_latest_below_stored_rows_adds_nothing() {
    let all = ledger_transactions(1, 12);
    let api = Arc::new(MockLedgerApi::with_transactions(all.clone()));
    let store = Arc::new(MockTransactionStore::new());
    // Only the oldest row counts towards the watermark; the rest were stored
    // under a previous account address
    store.insert(StoredTransaction::from_ledger(&all[0], MOCK_ACCOUNT));
    for tx in &all[1..] {
        store.insert(StoredTransaction::from_ledger(tx, "0:previous"));
    }
    let snapshot = store.all();
    let service = service_with_page_size(&api, &store, 5);

    let first = service.fetch_latest(Shutdown::never()).await.unwrap();
    let second = service.fetch_latest(Shutdown::never()).await.unwrap();

    assert_eq!(first, 0);
    assert_eq!(second, 0);
    assert_eq!(store.len(), 12);
    assert_eq!(store.all(), snapshot);
    assert!(store.applied_writes().is_empty());
    // Both runs rescanned from the lowered watermark
    let starts: Vec<_> = api
        .calls()
        .iter()
        .filter(|call| call.after_lt == all[0].lt)
        .map(|call| call.before_lt)
        .collect();
    assert_eq!(starts, vec![0, 0]);
}

#[tokio::test]
async fn test_watermark_never_decreases() {
    let all = ledger_transactions(1, 40);
    let api = Arc::new(MockLedgerApi::with_transactions(all[..10].to_vec()));
    let store = Arc::new(MockTransactionStore::new());
    let service = service_with_page_size(&api, &store, 4);

    let mut previous = 0;
    for chunk in all[10..].chunks(10) {
        service.fetch_latest(Shutdown::never()).await.unwrap();
        service.fix_missing(Shutdown::never()).await.unwrap();

        let watermark = store.max_lt(MOCK_ACCOUNT).await.unwrap();
        assert!(watermark >= previous);
        previous = watermark;

        api.push_transactions(chunk.to_vec());
    }
    service.fetch_latest(Shutdown::never()).await.unwrap();

    assert_eq!(store.max_lt(MOCK_ACCOUNT).await.unwrap(), 400);
    assert_eq!(store.len(), 40);
}

#[tokio::test]
async fn test_latest_and_missing_run_concurrently_without_conflict() {
    let all = ledger_transactions(1, 60);
    // Stored: every record below lt 300 except every fifth, nothing above
    let store = Arc::new(MockTransactionStore::new());
    for tx in all[..29].iter().filter(|tx| tx.lt % 50 != 0) {
        store.insert(StoredTransaction::from_ledger(tx, MOCK_ACCOUNT));
    }
    let watermark = store.max_lt(MOCK_ACCOUNT).await.unwrap();
    assert_eq!(watermark, 290);

    let api = Arc::new(MockLedgerApi::with_transactions(all.clone()));
    let service = service_with_page_size(&api, &store, 5);

    let (latest, missing) = tokio::join!(
        service.fetch_latest(Shutdown::never()),
        service.fetch_missing(0, watermark, Shutdown::never()),
    );
    let inserted_latest = latest.unwrap();
    let repaired = missing.unwrap();

    assert_eq!(inserted_latest, 31);
    assert_eq!(repaired, 5);
    assert_eq!(store.len(), 60);
    // Missing scan stays strictly below the watermark it read
    assert!(
        api.calls()
            .iter()
            .filter(|call| call.before_lt > 0)
            .all(|call| call.before_lt <= watermark)
    );
}

#[tokio::test]
async fn test_failed_transaction_is_upgraded_once_by_missing_scan() {
    let mut all = ledger_transactions(1, 5);
    all[1] = failed(all[1].clone());
    let api = Arc::new(MockLedgerApi::with_transactions(all.clone()));
    let store = Arc::new(MockTransactionStore::new());
    let service = service_with_page_size(&api, &store, 10);

    service.fetch_latest(Shutdown::never()).await.unwrap();
    assert!(!store.get(&all[1].hash).unwrap().success);

    // Ledger now reports the same transaction as successful
    let mut retried = ledger_transactions(2, 1).remove(0);
    retried.utime += 60;
    api.push_transactions(vec![retried.clone()]);

    assert_eq!(service.fix_missing(Shutdown::never()).await.unwrap(), 1);
    let row = store.get(&all[1].hash).unwrap();
    assert!(row.success);
    assert_eq!(row.utime, retried.utime);

    // A later report of failure never downgrades it
    api.push_transactions(vec![failed(retried)]);
    assert_eq!(service.fix_missing(Shutdown::never()).await.unwrap(), 0);
    assert!(store.get(&all[1].hash).unwrap().success);
}

#[tokio::test]
async fn test_every_stored_transaction_is_eventually_notified() {
    let all = ledger_transactions(1, 12);
    let api = Arc::new(MockLedgerApi::with_transactions(
        all.iter()
            .filter(|tx| tx.lt != 40 && tx.lt != 70)
            .cloned()
            .collect(),
    ));
    let store = Arc::new(MockTransactionStore::new());
    let webhook = Arc::new(MockWebhookClient::new());
    let service = service_with_page_size(&api, &store, 3);
    let first_run = notifier(&store, &webhook);

    service.fetch_latest(Shutdown::never()).await.unwrap();

    // One endpoint outage: that row stays pending for the next run
    webhook.fail_hash(&all[0].hash);
    let summary = first_run.send_pending(Shutdown::never()).await.unwrap();
    assert_eq!(summary.pending, 10);
    assert_eq!(summary.delivered, 9);
    assert_eq!(summary.failed, 1);
    assert!(!store.get(&all[0].hash).unwrap().webhook_notified);

    // The gap is filled later and the endpoint recovers
    api.push_transactions(vec![all[3].clone(), all[6].clone()]);
    service.fix_missing(Shutdown::never()).await.unwrap();
    let recovered = Arc::new(MockWebhookClient::new());
    let summary = notifier(&store, &recovered)
        .send_pending(Shutdown::never())
        .await
        .unwrap();

    assert_eq!(summary.delivered, 3);
    assert!(store.all().iter().all(|tx| tx.webhook_notified));
    assert!(store.get_unnotified().await.unwrap().is_empty());

    // Oldest execution time goes out first
    let delivered: Vec<_> = recovered.delivered().iter().map(|p| p.lt).collect();
    assert_eq!(delivered, vec![10, 40, 70]);
}
