//! Resilience helpers for the storage layer.

pub mod retry;

pub use retry::{retry, RetryConfig};
