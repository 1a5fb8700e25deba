//! Webhook delivery of stored transactions with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{AppError, NotificationSummary, TransactionStore, WebhookClient, WebhookPayload};

use super::batch::StoreSession;
use super::shutdown::Shutdown;

/// Default delivery attempts per transaction per run
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default unit of the exponential backoff
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct NotifierConfig {
    /// Attempts per transaction, including the first one
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

/// Wait after failed attempt `attempt` (1-based): `base * 2^attempt`
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

enum Delivery {
    Delivered,
    Exhausted,
    Cancelled,
}

/// Sends every unnotified transaction to the webhook, oldest `utime` first
pub struct WebhookNotifier {
    store: Arc<dyn TransactionStore>,
    client: Arc<dyn WebhookClient>,
    config: NotifierConfig,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(
        store: Arc<dyn TransactionStore>,
        client: Arc<dyn WebhookClient>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    /// Deliver pending notifications.
    ///
    /// Delivered rows are marked in one commit at the end of the run. On
    /// shutdown the loop stops and rows delivered so far are still committed.
    #[instrument(skip(self, shutdown))]
    pub async fn send_pending(&self, mut shutdown: Shutdown) -> Result<NotificationSummary, AppError> {
        let pending = self.store.get_unnotified().await.map_err(|e| {
            error!(error = %e, "Failed to load pending notifications");
            e
        })?;

        let mut summary = NotificationSummary {
            pending: pending.len(),
            ..NotificationSummary::default()
        };
        if pending.is_empty() {
            debug!("No pending notifications to send");
            return Ok(summary);
        }

        info!(count = pending.len(), "Sending pending webhook notifications");

        let mut session = StoreSession::new(Arc::clone(&self.store));
        for tx in &pending {
            if shutdown.is_triggered() {
                warn!("Shutdown requested, stopping notification run");
                break;
            }

            let payload = WebhookPayload::from(tx);
            match self.deliver_with_retry(&payload, &mut shutdown).await {
                Delivery::Delivered => {
                    session.mark_notified(&tx.hash, Utc::now());
                    summary.delivered += 1;
                }
                Delivery::Exhausted => summary.failed += 1,
                Delivery::Cancelled => {
                    warn!(hash = %tx.hash, "Shutdown requested during webhook backoff");
                    break;
                }
            }
        }

        session.commit().await.map_err(|e| {
            error!(error = %e, "Failed to save notification state");
            e
        })?;

        info!(
            pending = summary.pending,
            delivered = summary.delivered,
            failed = summary.failed,
            "Notification run complete"
        );
        Ok(summary)
    }

    async fn deliver_with_retry(&self, payload: &WebhookPayload, shutdown: &mut Shutdown) -> Delivery {
        let max_retries = self.config.max_retries.max(1);

        for attempt in 1..=max_retries {
            match self.client.deliver(payload).await {
                Ok(()) => {
                    info!(hash = %payload.hash, attempt, "Webhook sent successfully");
                    return Delivery::Delivered;
                }
                Err(e) => {
                    warn!(
                        hash = %payload.hash,
                        attempt,
                        max_retries,
                        error = %e,
                        "Webhook delivery attempt failed"
                    );
                }
            }

            if attempt < max_retries {
                let delay = backoff_delay(self.config.backoff_base, attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.triggered() => return Delivery::Cancelled,
                }
            }
        }

        error!(
            hash = %payload.hash,
            attempts = max_retries,
            "Failed to send webhook after all attempts"
        );
        Delivery::Exhausted
    }
}
