//! Ingestion policy: the single place deciding what happens to an incoming
//! ledger record given what is already stored.

use super::types::{IngestionDecision, LedgerTransaction, StoredTransaction};

/// Decide whether `incoming` is inserted, upgrades `existing`, or is ignored.
///
/// An existing record is only rewritten when its outcome improves from
/// unsuccessful to successful; `success` never goes back to false.
#[must_use]
pub fn decide(
    existing: Option<&StoredTransaction>,
    incoming: &LedgerTransaction,
    account_address: &str,
) -> IngestionDecision {
    match existing {
        None => IngestionDecision::Insert(StoredTransaction::from_ledger(incoming, account_address)),
        Some(stored) if !stored.success && incoming.success => {
            let mut updated = stored.clone();
            updated.apply_outcome(incoming);
            IngestionDecision::Update(updated)
        }
        Some(_) => IngestionDecision::Skip,
    }
}
