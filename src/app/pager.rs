//! Rate-limited, cursor-paginated reader of one account's ledger history.
//!
//! A fetch is a single-pass [`TransactionPager`]. It ends quietly when the
//! ledger is exhausted, the upper bound is reached, the rate limiter has no
//! permit, a page request fails, or shutdown is requested. Callers treat every
//! ending as "done for this run"; the cause is kept in
//! [`TransactionPager::stop_reason`] for logging.

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, error, warn};

use crate::domain::{LedgerApi, LedgerTransaction};

use super::shutdown::Shutdown;

/// Default number of transactions requested per page
pub const DEFAULT_PAGE_SIZE: usize = 250;

/// Why a pager stopped producing transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The ledger returned a short or empty page
    Exhausted,
    /// The cursor reached the exclusive upper bound
    ReachedUpperBound,
    /// No page permit was available
    RateLimited,
    /// A page request failed
    TransportError,
    /// Shutdown was requested between pages
    Cancelled,
}

/// Ledger fetch client with an embedded page rate limiter.
///
/// Clones share the limiter; independently constructed clients do not.
#[derive(Clone)]
pub struct LedgerFetchClient {
    api: Arc<dyn LedgerApi>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl LedgerFetchClient {
    #[must_use]
    pub fn new(api: Arc<dyn LedgerApi>, requests_per_second: NonZeroU32) -> Self {
        Self {
            api,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(requests_per_second))),
        }
    }

    /// Stream transactions of `account_address` with `after_lt < lt`, and
    /// `lt < before_lt` unless `before_lt` is 0, in ascending `lt` order.
    #[must_use]
    pub fn fetch(
        &self,
        account_address: &str,
        after_lt: i64,
        before_lt: i64,
        page_size: usize,
        shutdown: Shutdown,
    ) -> TransactionPager {
        TransactionPager {
            api: Arc::clone(&self.api),
            limiter: Arc::clone(&self.limiter),
            account_address: account_address.to_string(),
            cursor: after_lt,
            before_lt,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            stop_reason: None,
            pages_fetched: 0,
            shutdown,
        }
    }
}

/// Single-pass cursor over ledger pages
pub struct TransactionPager {
    api: Arc<dyn LedgerApi>,
    limiter: Arc<DefaultDirectRateLimiter>,
    account_address: String,
    cursor: i64,
    before_lt: i64,
    page_size: usize,
    buffer: VecDeque<LedgerTransaction>,
    stop_reason: Option<StopReason>,
    pages_fetched: usize,
    shutdown: Shutdown,
}

impl TransactionPager {
    /// Next transaction, or `None` once the pager has stopped
    pub async fn next(&mut self) -> Option<LedgerTransaction> {
        loop {
            if let Some(tx) = self.buffer.pop_front() {
                return Some(tx);
            }
            if self.stop_reason.is_some() {
                return None;
            }
            self.fetch_page().await;
        }
    }

    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn is_bounded(&self) -> bool {
        self.before_lt > 0
    }

    async fn fetch_page(&mut self) {
        if self.shutdown.is_triggered() {
            debug!(account = %self.account_address, "Shutdown requested, stopping ledger fetch");
            self.stop_reason = Some(StopReason::Cancelled);
            return;
        }

        if self.limiter.check().is_err() {
            warn!(
                account = %self.account_address,
                after_lt = self.cursor,
                "Ledger rate limit exceeded, ending fetch until next run"
            );
            self.stop_reason = Some(StopReason::RateLimited);
            return;
        }

        debug!(
            account = %self.account_address,
            after_lt = self.cursor,
            before_lt = self.before_lt,
            limit = self.page_size,
            "Fetching ledger page"
        );

        let page = match self
            .api
            .get_account_transactions(
                &self.account_address,
                self.cursor,
                self.before_lt,
                self.page_size,
            )
            .await
        {
            Ok(page) => page,
            Err(e) => {
                error!(
                    account = %self.account_address,
                    after_lt = self.cursor,
                    before_lt = self.before_lt,
                    error = %e,
                    "Failed to fetch ledger page"
                );
                self.stop_reason = Some(StopReason::TransportError);
                return;
            }
        };
        self.pages_fetched += 1;

        let Some(last_lt) = page.last().map(|tx| tx.lt) else {
            debug!(account = %self.account_address, "No more ledger transactions");
            self.stop_reason = Some(StopReason::Exhausted);
            return;
        };
        let page_len = page.len();

        let (after_lt, before_lt, bounded) = (self.cursor, self.before_lt, self.is_bounded());
        self.buffer.extend(
            page.into_iter()
                .filter(|tx| tx.lt > after_lt && (!bounded || tx.lt < before_lt)),
        );

        if page_len < self.page_size {
            self.stop_reason = Some(StopReason::Exhausted);
        } else if last_lt <= self.cursor {
            // A full page that does not move the cursor would repeat forever.
            warn!(
                account = %self.account_address,
                after_lt = self.cursor,
                "Ledger page did not advance the cursor, stopping"
            );
            self.stop_reason = Some(StopReason::Exhausted);
        } else {
            self.cursor = last_lt;
            if self.is_bounded() && self.cursor >= self.before_lt {
                self.stop_reason = Some(StopReason::ReachedUpperBound);
            }
        }
    }
}
