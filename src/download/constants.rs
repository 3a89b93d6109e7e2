//! Constants for the download module (timeouts, concurrency bounds).

use std::time::Duration;

/// Default HTTP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for fetching one listing page.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of concurrent fetch workers per batch.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Lowest accepted `max_concurrency`.
pub const MIN_CONCURRENCY: usize = 1;

/// Highest accepted `max_concurrency`.
pub const MAX_CONCURRENCY: usize = 32;
