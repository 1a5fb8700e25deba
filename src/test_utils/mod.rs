//! Test doubles shared by unit and integration tests.

pub mod mocks;

pub use mocks::{
    DeliveryAttempt, LedgerCall, MOCK_ACCOUNT, MockConfig, MockLedgerApi, MockTransactionStore,
    MockWebhookClient, ledger_transactions,
};
