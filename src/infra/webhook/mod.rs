//! Outbound webhook transports.

pub mod http;

pub use http::{DEFAULT_CONTENT_TYPE, HttpWebhookClient, WebhookConfig};
