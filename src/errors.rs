//! Error types for M2M Fetcher
//!
//! Errors are split by pipeline phase. Setup-phase errors (authentication,
//! search, product resolution) terminate the run; downloader errors are
//! contained per task and only surface in the final pool statistics.

use std::path::PathBuf;

use thiserror::Error;

/// Authentication and credential errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Credentials file missing
    #[error("Credentials file not found: {path}. Run 'auth setup' to create it")]
    MissingCredentials { path: PathBuf },

    /// Credentials file present but not parseable
    #[error("Malformed credentials file: {path}")]
    MalformedCredentials {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// HTTP request failed during login
    #[error("HTTP request failed during authentication")]
    Http(#[from] reqwest::Error),

    /// The M2M login-token endpoint rejected the credentials
    #[error("M2M login failed: {reason}")]
    LoginFailed { reason: String },

    /// Login succeeded but no token came back in the response
    #[error("M2M login response did not contain an auth token")]
    TokenMissing,

    /// Interactive credential entry failed
    #[error("Failed to read credentials from terminal")]
    Prompt(#[source] std::io::Error),

    /// File I/O error during credential storage
    #[error("Failed to write credentials file: {path}")]
    CredentialStorage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the API request envelope
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP transport failure
    #[error("HTTP request to {resource} failed")]
    Http {
        resource: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API rejected the request (HTTP 4xx or an errorCode in the body)
    #[error("M2M API rejected request to {resource}: {message}")]
    Request { resource: String, message: String },

    /// The response body was not the expected envelope shape
    #[error("Unexpected M2M response from {resource}: {reason}")]
    Protocol { resource: String, reason: String },

    /// HTTP 5xx. Only raised when the session is configured to treat
    /// server faults as fatal; otherwise logged and tolerated.
    #[error("M2M server fault on {resource}: HTTP {status}")]
    ServerFault { resource: String, status: u16 },
}

/// Search criteria construction errors
#[derive(Error, Debug)]
pub enum SearchError {
    /// A requested filter has no filter id registered for the dataset
    #[error("Filter '{filter}' is not supported for dataset '{dataset}'")]
    UnsupportedFilter { dataset: String, filter: String },

    /// API failure while executing the search
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Product flavor resolution errors
#[derive(Error, Debug)]
pub enum ProductError {
    /// Flavor string not recognized for the dataset
    #[error("Unknown product flavor '{flavor}' for dataset '{dataset}'")]
    UnknownFlavor { dataset: String, flavor: String },

    /// Dataset has no product codes registered
    #[error("No product codes registered for dataset '{dataset}'")]
    UnknownDataset { dataset: String },

    /// API failure while fetching download options
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Per-task download errors. These never abort sibling tasks.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP request failed
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// A staging URL returned no Location header to follow
    #[error("No redirect location for staging URL: {url}")]
    RedirectResolution { url: String },

    /// No filename could be derived from the response headers or URL
    #[error("Unable to determine filename for {url}")]
    FilenameResolution { url: String },

    /// Server returned an error status for the file GET
    #[error("Server returned HTTP {status} for {url}")]
    ServerStatus { status: u16, url: String },

    /// File I/O error
    #[error("File I/O error")]
    Io(#[from] std::io::Error),
}

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// One or more download tasks failed; the rest of the run completed
    #[error("{failed} of {total} download tasks failed")]
    TasksFailed { failed: usize, total: usize },

    /// Command-line arguments rejected before any network activity
    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },
}

impl AppError {
    /// Error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "authentication",
            AppError::Api(_) => "api",
            AppError::Search(_) => "search",
            AppError::Product(_) => "product",
            AppError::Download(_) => "download",
            AppError::Io(_) => "io",
            AppError::TasksFailed { .. } => "download",
            AppError::InvalidArguments { .. } => "cli",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Authentication result type alias
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// API result type alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;
