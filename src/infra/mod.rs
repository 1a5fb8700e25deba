//! Infrastructure layer implementations.

pub mod database;
pub mod ledger;
pub mod webhook;

pub use database::{PostgresClient, PostgresConfig};
pub use ledger::{DEFAULT_TON_API_URL, TonApiClient, TonApiConfig};
pub use webhook::{DEFAULT_CONTENT_TYPE, HttpWebhookClient, WebhookConfig};
