//! TON wallet transaction watcher.
//!
//! Keeps a durable, deduplicated copy of one account's transactions and
//! notifies a webhook about each of them at least once.

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
