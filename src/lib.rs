//! M2M Fetcher Library
//!
//! A Rust library for searching the USGS EarthExplorer Machine-to-Machine
//! catalog and downloading matching products concurrently with resumable
//! transfers.

pub mod app;
pub mod auth;
pub mod cli;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_accessible() {
        assert_eq!(constants::DEFAULT_WORKER_COUNT, 12);
        assert_eq!(constants::PARTIAL_SUFFIX, ".part");
        assert!(constants::USER_AGENT.contains("M2M-Fetcher"));
    }
}
