//! Application layer: the ingestion and notification engine and shared state.

pub mod batch;
pub mod latest;
pub mod missing;
pub mod notifier;
pub mod pager;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod state;

pub use batch::{Applied, BatchCommitter, DEFAULT_BATCH_SIZE, StoreSession};
pub use latest::{FetchSettings, LatestTransactionFetcher};
pub use missing::MissingTransactionFetcher;
pub use notifier::{NotifierConfig, WebhookNotifier, backoff_delay};
pub use pager::{DEFAULT_PAGE_SIZE, LedgerFetchClient, StopReason, TransactionPager};
pub use scheduler::{
    FETCH_LATEST_JOB, FIX_MISSING_JOB, JobIntervals, JobScheduler, SEND_NOTIFICATIONS_JOB,
    register_watcher_jobs,
};
pub use service::ReconciliationService;
pub use shutdown::Shutdown;
pub use state::AppState;
