//! Parallel resumable downloader
//!
//! Executes a flat list of (URL, destination directory) tasks on a bounded
//! pool. Tasks are independent and unordered; one task's failure is caught
//! and logged without touching its siblings. Transfers with a known length
//! stream into a `.part` staging file and are renamed into place only once
//! the byte count reaches the server-reported size, so an interrupted run
//! leaves a valid resume point behind.
//!
//! Correctness of the filesystem handling depends on the caller never
//! submitting two tasks with the same destination path; submit one task
//! per distinct URL, not one per URL-mapping key.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, LOCATION, RANGE};
use reqwest::{redirect, Client};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::app::models::DownloadTask;
use crate::constants::{files, http, staging, workers};
use crate::errors::{DownloadError, DownloadResult};

/// Scene/granule identifier patterns found in redirect Location headers
/// (Landsat Collection 2 scenes and tiles, Sentinel-2 granules).
const SCENE_ID_PATTERN: &str = r"(L[ETOC]\d{2}_L\d\w{2}_\d{6}_\d{8}_\d{8}_\d{2}_\w\d(\.tar)?)|(L\w\d{2}_\w{2}_\d{6}_\d{8}_\d{8}_\d{2}_\w+\.tar)|(L1C_.*\.zip)|(S2A_.*\.zip)";

fn scene_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SCENE_ID_PATTERN).expect("scene id pattern compiles"))
}

/// Cloud-hosted domain whose URLs embed the product id as a query parameter
const CLOUD_HOST_MARKER: &str = "landsatlook.usgs.gov";

/// Downloader pool configuration
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Number of concurrent transfer workers
    pub worker_count: usize,
    /// Overall timeout waiting for the pool to drain. Elapsing abandons
    /// the wait; in-flight transfers are not killed and their `.part`
    /// files remain valid resume points.
    pub pool_timeout: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            pool_timeout: workers::DEFAULT_POOL_TIMEOUT,
        }
    }
}

/// Aggregate result of one pool run
#[derive(Debug, Default)]
pub struct PoolOutcome {
    /// Tasks that fetched their file to completion
    pub completed: usize,
    /// Tasks skipped because the final file already existed
    pub skipped: usize,
    /// Tasks whose stream ended before the declared length; `.part` kept
    pub incomplete: usize,
    /// Tasks that failed with an error
    pub failed: usize,
    /// Total tasks submitted
    pub total: usize,
    /// Whether the overall timeout elapsed before the pool drained
    pub timed_out: bool,
}

impl PoolOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && !self.timed_out
    }
}

/// How a single task ended
#[derive(Debug)]
enum TaskOutcome {
    Completed,
    Skipped,
    Incomplete,
}

#[derive(Default)]
struct PoolCounters {
    completed: AtomicUsize,
    skipped: AtomicUsize,
    incomplete: AtomicUsize,
    failed: AtomicUsize,
}

/// Parallel resumable downloader
pub struct Downloader {
    /// Client for HEAD probes; redirects must not be followed so the
    /// Location header stays visible.
    head_client: Client,
    /// Client for streaming GETs; follows redirects
    get_client: Client,
    config: DownloaderConfig,
}

impl Downloader {
    pub fn new(config: DownloaderConfig) -> DownloadResult<Self> {
        let head_client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(http::HEAD_TIMEOUT)
            .connect_timeout(http::CONNECT_TIMEOUT)
            .user_agent(http::USER_AGENT)
            .build()?;

        let get_client = Client::builder()
            .timeout(http::TRANSFER_TIMEOUT)
            .connect_timeout(http::CONNECT_TIMEOUT)
            .user_agent(http::USER_AGENT)
            .build()?;

        Ok(Self {
            head_client,
            get_client,
            config,
        })
    }

    /// Run every task on the bounded pool and block until all finish or
    /// the overall timeout elapses.
    pub async fn fetch_all(&self, tasks: Vec<DownloadTask>) -> PoolOutcome {
        let total = tasks.len();
        let counters = Arc::new(PoolCounters::default());
        let semaphore = Arc::new(Semaphore::new(self.config.worker_count.max(1)));

        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} files",
            )
            .expect("progress template is valid")
            .progress_chars("=> "),
        );

        let mut handles = Vec::with_capacity(total);
        for task in tasks {
            let permit_source = Arc::clone(&semaphore);
            let counters = Arc::clone(&counters);
            let head_client = self.head_client.clone();
            let get_client = self.get_client.clone();
            let progress = progress.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit_source
                    .acquire()
                    .await
                    .expect("semaphore is never closed");

                // Isolated failure domain: log and count, never propagate.
                match fetch_one(&head_client, &get_client, &task).await {
                    Ok(TaskOutcome::Completed) => {
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(TaskOutcome::Skipped) => {
                        counters.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(TaskOutcome::Incomplete) => {
                        counters.incomplete.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        error!("Failed download {}: {}", task.url, e);
                    }
                }
                progress.inc(1);
            }));
        }

        let joined = tokio::time::timeout(
            self.config.pool_timeout,
            futures::future::join_all(handles),
        )
        .await;

        let timed_out = joined.is_err();
        if timed_out {
            warn!(
                "Download pool timed out after {}s; in-flight transfers keep running and partial files remain resumable",
                self.config.pool_timeout.as_secs()
            );
        }
        progress.finish_and_clear();

        let outcome = PoolOutcome {
            completed: counters.completed.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            incomplete: counters.incomplete.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            total,
            timed_out,
        };
        info!(
            "Pool finished: {} completed, {} skipped, {} incomplete, {} failed of {}",
            outcome.completed, outcome.skipped, outcome.incomplete, outcome.failed, outcome.total
        );
        outcome
    }
}

/// Resolve the real target of a staging redirect URL. The server answers
/// the HEAD with a relative Location that is rejoined onto the URL prefix
/// before the staging path marker.
async fn resolve_staging_redirect(head_client: &Client, url: &str) -> DownloadResult<String> {
    let response = head_client.head(url).send().await?;

    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| DownloadError::RedirectResolution {
            url: url.to_string(),
        })?;

    let base = url
        .split(staging::STAGING_PATH_MARKER)
        .next()
        .unwrap_or(url);
    Ok(format!("{}{}", base, location))
}

/// Derive the local filename for a download, in priority order:
/// Content-Disposition, a scene identifier embedded in the redirect
/// Location, or the product-id query parameter of the known cloud host.
pub(crate) fn derive_filename(
    url: &str,
    content_disposition: Option<&str>,
    location: Option<&str>,
) -> DownloadResult<String> {
    let name = if let Some(disposition) = content_disposition {
        disposition
            .rsplit("filename=")
            .next()
            .map(|n| n.trim_matches(|c| c == '"' || c == '\'').to_string())
    } else if let Some(location) = location {
        scene_id_regex()
            .find(location)
            .map(|m| m.as_str().to_string())
    } else if url.contains(CLOUD_HOST_MARKER) {
        url.split("&requestSignature")
            .next()
            .and_then(|prefix| prefix.split("landsat_product_id=").nth(1))
            .map(str::to_string)
    } else {
        None
    };

    let name = match name {
        Some(name) if !name.is_empty() => name,
        _ => {
            return Err(DownloadError::FilenameResolution {
                url: url.to_string(),
            })
        }
    };

    // Landsat C2 names often come without an extension; default to the
    // archive form.
    if Path::new(&name).extension().is_none() {
        Ok(format!("{}.{}", name, files::DEFAULT_EXTENSION))
    } else {
        Ok(name)
    }
}

/// Path of the in-progress staging file for a destination
pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(files::PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

/// Byte offset to resume from: the size of an existing partial file
pub(crate) fn resume_offset(partial: &Path) -> u64 {
    std::fs::metadata(partial).map(|m| m.len()).unwrap_or(0)
}

async fn fetch_one(
    head_client: &Client,
    get_client: &Client,
    task: &DownloadTask,
) -> DownloadResult<TaskOutcome> {
    let resolved_url = if task.url.contains(staging::STAGING_PATH_MARKER) {
        resolve_staging_redirect(head_client, &task.url).await?
    } else {
        task.url.clone()
    };

    let head = head_client.head(&resolved_url).send().await?;
    let content_disposition = head
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let location = head
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_length = head
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let filename = derive_filename(
        &resolved_url,
        content_disposition.as_deref(),
        location.as_deref(),
    )?;
    let destination = task.directory.join(&filename);

    if destination.exists() {
        warn!("Already exists - skipping: {}", destination.display());
        return Ok(TaskOutcome::Skipped);
    }

    let result = match content_length {
        Some(expected) => {
            transfer_resumable(get_client, &resolved_url, &destination, expected).await
        }
        None => transfer_unsized(get_client, &resolved_url, &destination).await,
    };

    if result.is_err() {
        // Clean up anything written under the final name. The `.part`
        // staging file is deliberately preserved as a resume point.
        if destination.exists() {
            let _ = tokio::fs::remove_file(&destination).await;
        }
    }
    result
}

/// Length-verified transfer: append to the `.part` file from the resume
/// offset and rename into place once the byte count reaches the declared
/// size. A short stream leaves the `.part` behind for a later run.
async fn transfer_resumable(
    get_client: &Client,
    url: &str,
    destination: &Path,
    expected: u64,
) -> DownloadResult<TaskOutcome> {
    let partial = partial_path(destination);
    let mut bytes_recv = resume_offset(&partial);

    info!(
        "Downloading {} to {} (resuming at byte {})",
        url,
        destination.display(),
        bytes_recv
    );

    let response = get_client
        .get(url)
        .header(RANGE, format!("bytes={}-", bytes_recv))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::ServerStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let started = Instant::now();
    let resumed_from = bytes_recv;

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&partial)
        .await?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        bytes_recv += chunk.len() as u64;
    }
    file.flush().await?;

    log_transfer_rate(destination, bytes_recv - resumed_from, started.elapsed());

    if bytes_recv >= expected {
        tokio::fs::rename(&partial, destination).await?;
        Ok(TaskOutcome::Completed)
    } else {
        warn!(
            "Incomplete transfer for {}: {}/{} bytes; keeping {} for resume",
            destination.display(),
            bytes_recv,
            expected,
            partial.display()
        );
        Ok(TaskOutcome::Incomplete)
    }
}

/// Transfer without a known length: completion cannot be verified, so no
/// `.part` staging is used and any stale partial file is discarded first.
async fn transfer_unsized(
    get_client: &Client,
    url: &str,
    destination: &Path,
) -> DownloadResult<TaskOutcome> {
    let partial = partial_path(destination);
    if partial.exists() {
        debug!(
            "Discarding stale partial {} (length unknown, cannot resume)",
            partial.display()
        );
        tokio::fs::remove_file(&partial).await?;
    }

    info!("Downloading {} to {}", url, destination.display());

    let response = get_client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::ServerStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let started = Instant::now();
    let mut bytes_recv: u64 = 0;

    let mut file = File::create(destination).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        bytes_recv += chunk.len() as u64;
    }
    file.flush().await?;

    log_transfer_rate(destination, bytes_recv, started.elapsed());
    Ok(TaskOutcome::Completed)
}

fn log_transfer_rate(destination: &Path, bytes: u64, elapsed: Duration) {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        "Complete - {} ({:.2} MB in {:.2} s, {:.2} MB/s)",
        destination.display(),
        mb,
        secs,
        mb / secs
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_content_disposition() {
        let name = derive_filename(
            "https://dds.cr.usgs.gov/download/abc",
            Some("attachment; filename=\"LC08_L2SP_033032_20221001_20221010_02_T1.tar\""),
            None,
        )
        .unwrap();
        assert_eq!(name, "LC08_L2SP_033032_20221001_20221010_02_T1.tar");
    }

    #[test]
    fn filename_from_redirect_location() {
        let name = derive_filename(
            "https://dds.cr.usgs.gov/download/abc",
            None,
            Some("/stage/LC08_L2SP_033032_20221001_20221010_02_T1/download"),
        )
        .unwrap();
        assert_eq!(name, "LC08_L2SP_033032_20221001_20221010_02_T1.tar");
    }

    #[test]
    fn filename_from_sentinel_location() {
        let name = derive_filename(
            "https://dds.cr.usgs.gov/download/abc",
            None,
            Some("/files/L1C_T19TDK_A030123_20221001T153621.zip?sig=x"),
        )
        .unwrap();
        assert_eq!(name, "L1C_T19TDK_A030123_20221001T153621.zip");
    }

    #[test]
    fn filename_from_cloud_host_query_parameter() {
        let url = "https://landsatlook.usgs.gov/gen-bundle?landsat_product_id=LC09_L2SP_011009_20221105_20221107_02_T1&requestSignature=abcdef";
        let name = derive_filename(url, None, None).unwrap();
        assert_eq!(name, "LC09_L2SP_011009_20221105_20221107_02_T1.tar");
    }

    #[test]
    fn content_disposition_takes_priority() {
        let url = "https://landsatlook.usgs.gov/x?landsat_product_id=WRONG&requestSignature=s";
        let name = derive_filename(url, Some("filename=right.tar"), Some("/stage/other")).unwrap();
        assert_eq!(name, "right.tar");
    }

    #[test]
    fn unresolvable_filename_fails() {
        let result = derive_filename("https://example.com/data", None, None);
        assert!(matches!(
            result,
            Err(DownloadError::FilenameResolution { .. })
        ));
    }

    #[test]
    fn extensionless_names_default_to_tar() {
        let name = derive_filename(
            "https://example.com/data",
            Some("filename=LC08_CU_011009_20221001_20221010_02"),
            None,
        )
        .unwrap();
        assert!(name.ends_with(".tar"));
    }

    #[test]
    fn partial_path_appends_suffix() {
        let partial = partial_path(Path::new("/data/LC08_x.tar"));
        assert_eq!(partial, PathBuf::from("/data/LC08_x.tar.part"));
    }

    #[test]
    fn resume_offset_reads_partial_size() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("scene.tar");
        let partial = partial_path(&destination);

        assert_eq!(resume_offset(&partial), 0);

        std::fs::write(&partial, vec![0u8; 4096]).unwrap();
        assert_eq!(resume_offset(&partial), 4096);
    }

    #[test]
    fn scene_pattern_matches_ard_tile_names() {
        let re = scene_id_regex();
        assert!(re.is_match("LC08_CU_011009_20221001_20221012_02_BA.tar"));
        assert!(re.is_match("LE07_L2SP_033032_20020810_20200917_02_T1"));
        assert!(!re.is_match("random_file_name.txt"));
    }

    #[tokio::test]
    async fn pool_reports_failures_without_aborting_siblings() {
        // Unreachable URLs fail fast at the HEAD stage; the pool must
        // collect every failure instead of propagating the first one.
        let downloader = Downloader::new(DownloaderConfig {
            worker_count: 4,
            pool_timeout: Duration::from_secs(30),
        })
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let tasks = vec![
            DownloadTask::new("http://127.0.0.1:9/nothing-a", dir.path()),
            DownloadTask::new("http://127.0.0.1:9/nothing-b", dir.path()),
        ];

        let outcome = downloader.fetch_all(tasks).await;
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.failed, 2);
        assert!(!outcome.all_succeeded());
        assert!(!outcome.timed_out);
    }
}
