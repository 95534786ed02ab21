//! Ambient utilities for the patchwork workspace
//!
//! # Modules
//!
//! - `async_utils` - retry policies with backoff/jitter and timeout wrappers
//! - `logging` - tracing subscriber bootstrap and timing helpers

pub mod async_utils;
pub mod logging;

pub use async_utils::{with_retry, with_timeout, RetryPolicy, TimeoutError};
pub use logging::init_logging;
