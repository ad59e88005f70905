//! Shared constants used across gcsfs crates.

/// URI scheme every object path must carry.
pub const SCHEME: &str = "gs";

/// Separator between key segments. A key ending in it names a directory.
pub const PATH_DELIMITER: char = '/';

/// Number of listing results requested when probing whether a prefix is a directory.
pub const DIRECTORY_PROBE_LIMIT: u32 = 20;

/// Content type used by `put_string` when the caller does not supply one.
pub const DEFAULT_STRING_CONTENT_TYPE: &str = "text/plain";

/// Default number of retries applied to each remote request.
pub const DEFAULT_REQUEST_RETRIES: u32 = 5;

/// Default timeout applied to each remote request (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default interval between consistency probes (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default upper bound on a single consistency wait (seconds).
pub const DEFAULT_MAX_WAIT_SECS: u64 = 300;
