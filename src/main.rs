//! M2M Fetcher CLI application

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use m2m_fetcher::cli::{handle_auth, handle_download, Cli, Commands};
use m2m_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error ({}): {}", e.category(), e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load environment variables from .env if present
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(&cli);

    info!("M2M Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Download(args) => handle_download(args).await,
        Commands::Auth(args) => handle_auth(args).await,
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("m2m_fetcher={}", cli.log_level()).parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
