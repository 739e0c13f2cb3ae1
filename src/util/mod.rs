//! Utility modules: cancellation, retry, timeout.

pub mod cancel;
pub mod retry;
pub mod timeout;
