//! Constants for the download module (timeouts, fetch limits).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large direct streams).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Maximum Retry-After header value (10 minutes) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

/// Default number of segments fetched in parallel per rendition.
pub const DEFAULT_SEGMENT_CONCURRENCY: usize = 4;

/// Upper bound for segment concurrency.
pub const MAX_SEGMENT_CONCURRENCY: usize = 16;

/// Media segments included in a preview, after the initialization segment.
pub const PREVIEW_MEDIA_SEGMENTS: usize = 10;
