//! Core retrieval pipeline for M2M Fetcher
//!
//! The pipeline runs search → product resolution → URL resolution →
//! parallel download. Each stage only needs the previous stage's output:
//! search yields entity ids, the resolver maps them to fetchable product
//! ids, the staging protocol turns those into URLs, and the downloader
//! takes a flat task list.

pub mod downloader;
pub mod models;
pub mod products;
pub mod search;
pub mod session;
pub mod staging;

// Re-export main public API
pub use downloader::{Downloader, DownloaderConfig, PoolOutcome};
pub use models::{
    DownloadOption, DownloadTask, RetrieveItem, SceneRecord, SearchResults, UrlMapping,
};
pub use products::resolve_products;
pub use search::{search, SearchCriteria};
pub use session::{ApiInstance, M2mSession, SessionConfig};
pub use staging::{resolve_urls, run_label};
