//! Application state management.

use std::sync::Arc;

use super::notifier::WebhookNotifier;
use super::service::ReconciliationService;
use super::shutdown::Shutdown;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub reconciliation: Arc<ReconciliationService>,
    pub notifier: Arc<WebhookNotifier>,
    /// Handed to every job an API request starts
    pub shutdown: Shutdown,
}

impl AppState {
    /// Create a new application state
    #[must_use]
    pub fn new(
        reconciliation: Arc<ReconciliationService>,
        notifier: Arc<WebhookNotifier>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            reconciliation,
            notifier,
            shutdown,
        }
    }
}
