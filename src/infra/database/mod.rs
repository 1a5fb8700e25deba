//! Database implementations.

pub mod postgres;

pub use postgres::{PostgresClient, PostgresConfig};
