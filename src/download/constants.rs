//! Constants for the download module (timeouts, streaming).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (10 minutes for large archives).
pub const READ_TIMEOUT_SECS: u64 = 600;
