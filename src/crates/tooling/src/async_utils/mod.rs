//! Async helpers: retry policies and timeouts

pub mod retry;
pub mod timeout;

pub use retry::{with_retry, RetryPolicy};
pub use timeout::{with_timeout, TimeoutError};
