//! Ledger API transports.

pub mod tonapi;

pub use tonapi::{DEFAULT_TON_API_URL, TonApiClient, TonApiConfig};
