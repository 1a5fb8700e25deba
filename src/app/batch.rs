//! Write staging and batched commits against the transaction store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{AppError, IngestionDecision, StagedWrite, StoredTransaction, TransactionStore};

/// Default number of mutations buffered before a commit
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Per-run unit of work.
///
/// Writes are staged in memory and only become durable on [`commit`].
/// Staged inserts and updates are visible to this session's own lookups.
///
/// [`commit`]: StoreSession::commit
pub struct StoreSession {
    store: Arc<dyn TransactionStore>,
    staged: Vec<StagedWrite>,
}

impl StoreSession {
    #[must_use]
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            store,
            staged: Vec::new(),
        }
    }

    pub async fn get_by_hash(&self, hash: &str) -> Result<Option<StoredTransaction>, AppError> {
        let staged = self.staged.iter().rev().find_map(|write| match write {
            StagedWrite::Insert(tx) | StagedWrite::Update(tx) if tx.hash == hash => {
                Some(tx.clone())
            }
            _ => None,
        });
        match staged {
            Some(tx) => Ok(Some(tx)),
            None => self.store.get_by_hash(hash).await,
        }
    }

    pub fn add(&mut self, tx: StoredTransaction) {
        self.staged.push(StagedWrite::Insert(tx));
    }

    pub fn update(&mut self, tx: StoredTransaction) {
        self.staged.push(StagedWrite::Update(tx));
    }

    pub fn mark_notified(&mut self, hash: &str, notified_at: DateTime<Utc>) {
        self.staged.push(StagedWrite::MarkNotified {
            hash: hash.to_string(),
            notified_at,
        });
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Flush staged writes; returns how many were applied
    pub async fn commit(&mut self) -> Result<usize, AppError> {
        if self.staged.is_empty() {
            return Ok(0);
        }
        self.store.apply_batch(&self.staged).await?;
        let count = self.staged.len();
        self.staged.clear();
        Ok(count)
    }
}

/// What [`BatchCommitter::apply`] did with a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Skipped,
}

/// Commits a session every `threshold` mutations and once more at the end.
///
/// A crash loses at most `threshold - 1` uncommitted mutations; re-running
/// the job re-observes and re-applies them.
pub struct BatchCommitter {
    session: StoreSession,
    threshold: usize,
    since_commit: usize,
}

impl BatchCommitter {
    #[must_use]
    pub fn new(store: Arc<dyn TransactionStore>, threshold: usize) -> Self {
        Self {
            session: StoreSession::new(store),
            threshold: threshold.max(1),
            since_commit: 0,
        }
    }

    pub async fn get_by_hash(&self, hash: &str) -> Result<Option<StoredTransaction>, AppError> {
        self.session.get_by_hash(hash).await
    }

    /// Stage the mutation a decision calls for, committing when the batch is full
    pub async fn apply(&mut self, decision: IngestionDecision) -> Result<Applied, AppError> {
        let applied = match decision {
            IngestionDecision::Insert(tx) => {
                self.session.add(tx);
                Applied::Inserted
            }
            IngestionDecision::Update(tx) => {
                self.session.update(tx);
                Applied::Updated
            }
            IngestionDecision::Skip => return Ok(Applied::Skipped),
        };

        self.since_commit += 1;
        if self.since_commit >= self.threshold {
            self.flush().await?;
        }
        Ok(applied)
    }

    pub async fn flush(&mut self) -> Result<(), AppError> {
        if self.since_commit > 0 {
            let count = self.session.commit().await?;
            debug!(count, "Saved batch of transactions");
            self.since_commit = 0;
        }
        Ok(())
    }

    /// Commit whatever is still buffered
    pub async fn finalize(mut self) -> Result<(), AppError> {
        self.flush().await
    }
}
