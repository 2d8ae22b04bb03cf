//! Application constants for M2M Fetcher
//!
//! Centralizes the constants used throughout the application, organized by
//! functional domain.

use std::time::Duration;

/// M2M API endpoints
pub mod api {
    /// Production API base URL
    pub const OPS_BASE_URL: &str = "https://m2m.cr.usgs.gov/api/api/json/stable/";

    /// Development mainline API base URL
    pub const DEVMAST_BASE_URL: &str = "https://m2mdevmast.cr.usgs.gov/api/api/json/stable/";

    /// Development system API base URL
    pub const DEVSYS_BASE_URL: &str = "https://m2mdev.cr.usgs.gov/devsys/api/api/json/stable/";

    /// Value sent as `downloadApplication` on download-request/retrieve calls
    pub const DOWNLOAD_APPLICATION: &str = "M2M";

    /// Auth token request header
    pub const AUTH_HEADER: &str = "X-Auth-Token";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "M2M-Fetcher/0.1.0 (Land Remote Sensing Tool)";

    /// API request timeout
    pub const API_TIMEOUT: Duration = Duration::from_secs(60);

    /// HEAD request timeout during filename/redirect resolution
    pub const HEAD_TIMEOUT: Duration = Duration::from_secs(60);

    /// Streaming GET timeout for file transfers (long; archives can be large)
    pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(6000);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default rate limit for API calls (requests per second)
    pub const API_RATE_LIMIT_RPS: u32 = 4;
}

/// Staging protocol constants
pub mod staging {
    use super::Duration;

    /// Single-shot wait before the final download-retrieve poll when not
    /// every requested entity was immediately available
    pub const RETRIEVE_WAIT: Duration = Duration::from_secs(30);

    /// statusCode values whose URLs are usable for GET:
    /// Available, Proxied, Downloading
    pub const USABLE_STATUS_CODES: [&str; 3] = ["A", "P", "D"];

    /// Path marker identifying staging redirect URLs
    pub const STAGING_PATH_MARKER: &str = "/download-staging";
}

/// File operation constants
pub mod files {
    /// Suffix for in-progress transfers
    pub const PARTIAL_SUFFIX: &str = ".part";

    /// Extension applied when a derived filename has none
    pub const DEFAULT_EXTENSION: &str = "tar";

    /// Default credentials file name
    pub const CREDENTIALS_FILE: &str = "credentials.json";
}

/// Worker and concurrency configuration
pub mod workers {
    use super::Duration;

    /// Default number of download workers
    pub const DEFAULT_WORKER_COUNT: usize = 12;

    /// Default overall pipeline timeout while waiting for the pool
    pub const DEFAULT_POOL_TIMEOUT: Duration = Duration::from_secs(6000);
}

/// Search defaults
pub mod search {
    /// Default maximum number of search results
    pub const DEFAULT_MAX_RESULTS: u32 = 50_000;

    /// Cloud cover range bounds
    pub const CLOUD_COVER_MIN: u8 = 0;
    pub const CLOUD_COVER_MAX: u8 = 100;
}

// Re-export commonly used constants for convenience
pub use files::{CREDENTIALS_FILE, PARTIAL_SUFFIX};
pub use http::USER_AGENT;
pub use staging::RETRIEVE_WAIT;
pub use workers::DEFAULT_WORKER_COUNT;
