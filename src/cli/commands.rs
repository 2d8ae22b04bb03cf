//! Command handlers wiring the CLI to the retrieval pipeline

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use crate::app::{
    resolve_products, resolve_urls, run_label, search, Downloader, DownloaderConfig, DownloadTask,
    M2mSession, SessionConfig,
};
use crate::auth::{credentials_status, load_credentials, prompt_credentials, save_credentials};
use crate::cli::args::{AuthAction, AuthArgs, DownloadArgs};
use crate::errors::{AppError, Result};

/// Execute the download (or search-only) pipeline
pub async fn handle_download(args: DownloadArgs) -> Result<()> {
    args.validate()
        .map_err(|message| AppError::InvalidArguments { message })?;

    if args.directory.is_none() && !args.search_only {
        // Documented early exit, not an error.
        warn!("Must specify a download directory; nothing to do");
        return Ok(());
    }

    let directory = args
        .directory
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&directory)?;

    let credentials = load_credentials(&args.credentials)?;
    let mut session = M2mSession::new(args.instance, SessionConfig::default())?;
    session.login(&credentials).await?;

    let criteria = args.criteria();
    let results = search(&session, &criteria).await?;

    if results.is_empty() {
        // Terminal condition: stop the pipeline without error.
        warn!("No results found!");
        return Ok(());
    }

    if args.search_only {
        let listing = write_search_results(&directory, &results.display_ids())?;
        info!("Wrote {} search results to {}", results.scenes.len(), listing.display());
        return Ok(());
    }

    let entity_ids = results.entity_ids();
    let options = resolve_products(
        &session,
        &entity_ids,
        &criteria.dataset,
        args.products.as_deref(),
    )
    .await?;

    if options.is_empty() {
        warn!("No available download options for any searched entity");
        return Ok(());
    }

    let label = run_label(&criteria.dataset);
    let urls = resolve_urls(&session, &options, &label).await?;

    if urls.is_empty() {
        warn!("No download URLs became available in this run; re-run later to retry");
        return Ok(());
    }

    let tasks: Vec<DownloadTask> = urls
        .unique_urls()
        .into_iter()
        .map(|url| DownloadTask::new(url, directory.clone()))
        .collect();

    let downloader = Downloader::new(DownloaderConfig {
        worker_count: args.threads,
        pool_timeout: args.pool_timeout(),
    })?;
    let outcome = downloader.fetch_all(tasks).await;

    if outcome.failed > 0 {
        return Err(AppError::TasksFailed {
            failed: outcome.failed,
            total: outcome.total,
        });
    }
    Ok(())
}

/// Write the display-identifier listing for a search-only run and return
/// its path.
pub fn write_search_results(directory: &Path, display_ids: &[String]) -> Result<PathBuf> {
    let name = format!("results_{}.txt", Local::now().format("%Y-%m-%d_%H:%M:%S"));
    let path = directory.join(name);

    let mut contents = String::new();
    for id in display_ids {
        contents.push_str(id);
        contents.push('\n');
    }
    std::fs::write(&path, contents)?;
    Ok(path)
}

/// Execute credentials management actions
pub async fn handle_auth(args: AuthArgs) -> Result<()> {
    match args.action {
        AuthAction::Setup { force } => {
            if args.credentials.exists() && !force {
                println!(
                    "Credentials file {} already exists. Use --force to replace it.",
                    args.credentials.display()
                );
                return Ok(());
            }
            let credentials = prompt_credentials()?;
            save_credentials(&args.credentials, &credentials)?;
            println!("Credentials saved to {}", args.credentials.display());
        }
        AuthAction::Status => {
            let status = credentials_status(&args.credentials);
            println!("{}", status.status_message());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn search_results_file_one_id_per_line() {
        let dir = tempdir().unwrap();
        let ids = vec![
            "LC08_CU_011009_20221001_20221012_02".to_string(),
            "LC08_CU_011009_20221017_20221028_02".to_string(),
            "LC08_CU_011009_20221102_20221113_02".to_string(),
        ];

        let path = write_search_results(dir.path(), &ids).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines, ids.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("results_"));
    }

    #[test]
    fn empty_search_results_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = write_search_results(dir.path(), &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
