//! Interval scheduler for the recurring watcher jobs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::domain::AppError;

use super::notifier::WebhookNotifier;
use super::service::ReconciliationService;
use super::shutdown::Shutdown;

pub const FETCH_LATEST_JOB: &str = "fetch-latest-transactions";
pub const FIX_MISSING_JOB: &str = "fix-missing-transactions";
pub const SEND_NOTIFICATIONS_JOB: &str = "send-pending-notifications";

/// Cadence of each recurring job
#[derive(Debug, Clone, Copy)]
pub struct JobIntervals {
    pub fetch_latest: Duration,
    pub fix_missing: Duration,
    pub send_notifications: Duration,
}

impl Default for JobIntervals {
    fn default() -> Self {
        Self {
            fetch_latest: Duration::from_secs(30),
            fix_missing: Duration::from_secs(600),
            send_notifications: Duration::from_secs(10),
        }
    }
}

/// Runs each registered job on its own task at a fixed interval.
///
/// A job never overlaps itself: a tick that fires while the previous run is
/// still going is skipped. Different jobs run independently.
pub struct JobScheduler {
    shutdown_tx: watch::Sender<bool>,
    shutdown: Shutdown,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, shutdown) = Shutdown::channel();
        Self {
            shutdown_tx,
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Run `job` now and then every `every` until shutdown.
    /// Must be called from within a tokio runtime.
    pub fn register<F, Fut>(&mut self, name: &'static str, every: Duration, job: F)
    where
        F: Fn(Shutdown) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let mut shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.triggered() => break,
                    _ = interval.tick() => {}
                }

                debug!(job = name, "Running scheduled job");
                if let Err(e) = job(shutdown.clone()).await {
                    error!(job = name, error = %e, "Scheduled job failed");
                }
            }

            info!(job = name, "Scheduled job stopped");
        });

        info!(job = name, interval_secs = every.as_secs_f64(), "Registered recurring job");
        self.tasks.push((name, handle));
    }

    #[must_use]
    pub fn job_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Signal every job to stop and wait for in-flight runs to return
    pub async fn shutdown(self) {
        info!("Stopping scheduled jobs");
        let _ = self.shutdown_tx.send(true);

        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                error!(job = name, error = %e, "Scheduled job task panicked");
            }
        }
        info!("All scheduled jobs stopped");
    }
}

/// Register the three watcher jobs
pub fn register_watcher_jobs(
    scheduler: &mut JobScheduler,
    reconciliation: Arc<ReconciliationService>,
    notifier: Arc<WebhookNotifier>,
    intervals: JobIntervals,
) {
    let latest = Arc::clone(&reconciliation);
    scheduler.register(FETCH_LATEST_JOB, intervals.fetch_latest, move |shutdown| {
        let service = Arc::clone(&latest);
        async move { service.fetch_latest(shutdown).await.map(|_| ()) }
    });

    let missing = reconciliation;
    scheduler.register(FIX_MISSING_JOB, intervals.fix_missing, move |shutdown| {
        let service = Arc::clone(&missing);
        async move { service.fix_missing(shutdown).await.map(|_| ()) }
    });

    scheduler.register(
        SEND_NOTIFICATIONS_JOB,
        intervals.send_notifications,
        move |shutdown| {
            let notifier = Arc::clone(&notifier);
            async move { notifier.send_pending(shutdown).await.map(|_| ()) }
        },
    );
}
