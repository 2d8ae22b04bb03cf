//! Command-line argument parsing for M2M Fetcher

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::app::{ApiInstance, SearchCriteria};
use crate::constants::{files, search, workers};

/// M2M Fetcher - search and download EarthExplorer catalog products
#[derive(Parser, Debug)]
#[command(
    name = "m2m_fetcher",
    version,
    about = "Search the USGS M2M catalog and download matching products",
    long_about = "Searches the USGS EarthExplorer Machine-to-Machine catalog for Landsat and
Sentinel-2 products, resolves staged download URLs, and fetches the archives
concurrently with byte-range resume."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (shows API requests/responses)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the catalog and download matching products
    Download(DownloadArgs),

    /// Manage M2M credentials
    Auth(AuthArgs),
}

/// Arguments for the download command
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Directory to download all data into (created if missing)
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Path to the credentials file
    #[arg(long, default_value = files::CREDENTIALS_FILE)]
    pub credentials: PathBuf,

    /// EarthExplorer catalog dataset (e.g. landsat_ard_tile_c2, sentinel_2a)
    #[arg(long)]
    pub dataset: String,

    /// ARD tile grid horizontal number
    #[arg(short = 'H', long)]
    pub horizontal: Option<i64>,

    /// ARD tile grid vertical number
    #[arg(long)]
    pub vertical: Option<i64>,

    /// WRS-2 path (scene datasets)
    #[arg(short, long)]
    pub path: Option<i64>,

    /// WRS-2 row (scene datasets)
    #[arg(short, long)]
    pub row: Option<i64>,

    /// ARD tile grid region
    #[arg(long, value_parser = ["CU", "AK", "HI"])]
    pub region: Option<String>,

    /// Sentinel-2 tile number (e.g. T19TDK)
    #[arg(long)]
    pub tile_number: Option<String>,

    /// Sentinel-2 platform (SENTINEL-2A, SENTINEL-2B)
    #[arg(long)]
    pub platform: Option<String>,

    /// ARD tile sensor identifier
    #[arg(short, long, value_parser = ["All", "OLI_TIRS", "ETM", "TM"])]
    pub sensor: Option<String>,

    /// ARD tile spacecraft identifier (LANDSAT_4 .. LANDSAT_9)
    #[arg(long)]
    pub spacecraft: Option<String>,

    /// Scene spacecraft identifier (4, 5, 7, 8, 9)
    #[arg(long, value_parser = ["4", "5", "7", "8", "9"])]
    pub satellite: Option<String>,

    /// Comma-delimited product flavors for tile bundles (e.g. "SR,TOA,QA")
    #[arg(long)]
    pub products: Option<String>,

    /// Acquisition date YYYY-MM-DD, or a comma-separated pair for a range
    #[arg(long)]
    pub acq_date: Option<String>,

    /// ARD tile production date
    #[arg(long)]
    pub prod_date: Option<String>,

    /// ARD tile cloud cover upper bound
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub cloud_cover: Option<u8>,

    /// Scene-based land cloud cover upper bound (0-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub land_cloud_cover: Option<u8>,

    /// Number of parallel download workers
    #[arg(short, long, default_value_t = workers::DEFAULT_WORKER_COUNT)]
    pub threads: usize,

    /// Maximum number of search results to return
    #[arg(short, long, default_value_t = search::DEFAULT_MAX_RESULTS)]
    pub max_results: u32,

    /// Only write search results to a text file, do not download
    #[arg(long)]
    pub search_only: bool,

    /// Which M2M instance to use
    #[arg(long, value_enum, default_value_t = ApiInstance::Ops)]
    pub instance: ApiInstance,

    /// Overall download timeout in seconds
    #[arg(long, default_value_t = workers::DEFAULT_POOL_TIMEOUT.as_secs())]
    pub timeout: u64,
}

impl DownloadArgs {
    /// Build immutable search criteria from the parsed flags
    pub fn criteria(&self) -> SearchCriteria {
        let mut criteria = SearchCriteria::new(self.dataset.clone());
        criteria.max_results = self.max_results;
        criteria.acquisition_date = self.acq_date.clone();
        criteria.region = self.region.clone();
        criteria.horizontal = self.horizontal;
        criteria.vertical = self.vertical;
        criteria.path = self.path;
        criteria.row = self.row;
        criteria.sensor = self.sensor.clone();
        criteria.spacecraft = self.spacecraft.clone();
        criteria.satellite = self.satellite.clone();
        criteria.production_date = self.prod_date.clone();
        criteria.cloud_cover = self.cloud_cover;
        criteria.land_cloud_cover = self.land_cloud_cover;
        criteria.tile_number = self.tile_number.clone();
        criteria.platform = self.platform.clone();
        criteria
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.threads == 0 {
            return Err("Number of threads must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Arguments for credentials management
#[derive(Args, Debug)]
pub struct AuthArgs {
    /// Path to the credentials file
    #[arg(long, default_value = files::CREDENTIALS_FILE)]
    pub credentials: PathBuf,

    #[command(subcommand)]
    pub action: AuthAction,
}

/// Credentials management actions
#[derive(Subcommand, Debug)]
pub enum AuthAction {
    /// Create or replace the credentials file interactively
    Setup {
        /// Overwrite an existing credentials file
        #[arg(short, long)]
        force: bool,
    },

    /// Show credentials file status
    Status,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level implied by the global flags
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}
