//! URL resolution protocol: the download-request / download-retrieve
//! handshake
//!
//! The API decouples "request a download" from "it is ready". A request
//! partitions entities into downloads that are available now and products
//! already staged under another run's label. Duplicate labels are polled
//! first because they can resolve without waiting at all; only when the
//! original label still has unready items does the single fixed wait and
//! final retrieve happen.
//!
//! Entities whose URL never becomes usable in this run are silently absent
//! from the returned mapping. Callers must treat missing keys as "not yet
//! downloadable", not as an error.

use chrono::Local;
use serde_json::json;

use crate::app::models::{
    DownloadOption, DownloadRequestData, DownloadRetrieveData, RetrieveItem, UrlMapping,
};
use crate::app::session::M2mSession;
use crate::constants::{api, staging};
use crate::errors::{ApiError, ApiResult};

/// Run-scoped correlation token: dataset name plus a second-resolution
/// timestamp, unique across invocations so it cannot collide with another
/// run's in-flight staging jobs.
pub fn run_label(dataset: &str) -> String {
    format!("{}-{}", dataset, Local::now().format("%Y%m%d%H%M%S"))
}

async fn download_request(
    session: &M2mSession,
    options: &[DownloadOption],
    label: &str,
) -> ApiResult<DownloadRequestData> {
    let downloads: Vec<_> = options
        .iter()
        .map(|opt| json!({"entityId": opt.entity_id, "productId": opt.product_id}))
        .collect();

    let payload = json!({
        "downloads": downloads,
        "downloadApplication": api::DOWNLOAD_APPLICATION,
        "label": label,
    });

    let data = session.request("download-request", payload).await?;
    serde_json::from_value(data).map_err(|e| ApiError::Protocol {
        resource: "download-request".to_string(),
        reason: format!("unexpected download-request payload: {}", e),
    })
}

async fn download_retrieve(session: &M2mSession, label: &str) -> ApiResult<DownloadRetrieveData> {
    let payload = json!({
        "downloadApplication": api::DOWNLOAD_APPLICATION,
        "label": label,
    });

    let data = session.request("download-retrieve", payload).await?;
    serde_json::from_value(data).map_err(|e| ApiError::Protocol {
        resource: "download-retrieve".to_string(),
        reason: format!("unexpected download-retrieve payload: {}", e),
    })
}

/// Fold usable retrieve items into the mapping, first-resolution-wins.
///
/// When `disambiguate` is set, keys are suffixed with the product code so
/// an entity with several simultaneously fetchable products keeps them all.
pub(crate) fn absorb_items(
    mapping: &mut UrlMapping,
    items: &[&RetrieveItem],
    disambiguate: bool,
) {
    for item in items {
        let (entity_id, url) = match (&item.entity_id, &item.url) {
            (Some(entity_id), Some(url)) => (entity_id, url),
            _ => continue,
        };

        let key = match (&item.product_code, disambiguate) {
            (Some(code), true) => format!("{}_{}", entity_id, code),
            _ => entity_id.clone(),
        };

        mapping.insert_first(key, url.clone());
    }
}

/// Whether the final retrieve must be delayed. Only when some requested
/// download was not immediately available does the server need staging time.
pub(crate) fn retrieve_wait_needed(request: &DownloadRequestData, requested: usize) -> bool {
    request.available_downloads.len() < requested
}

/// Orchestrate the request → retrieve handshake for one run label and
/// return the accumulated entity-to-URL mapping.
pub async fn resolve_urls(
    session: &M2mSession,
    options: &[DownloadOption],
    label: &str,
) -> ApiResult<UrlMapping> {
    let requested = options.len();
    let mut mapping = UrlMapping::new();

    let request = download_request(session, options, label).await?;

    // Duplicate-label lookups can resolve without waiting, so drain them
    // before considering the original label.
    for other_label in request.duplicate_products.labels() {
        let retrieve = download_retrieve(session, &other_label).await?;
        let found = retrieve.usable_items();
        tracing::debug!(
            "Retrieved {}/{} downloads using duplicateProducts label {}",
            found.len(),
            requested,
            other_label
        );
        absorb_items(&mut mapping, &found, false);

        if mapping.len() >= requested {
            tracing::debug!("All {} URLs retrieved from duplicate labels", requested);
            return Ok(mapping);
        }
    }

    if retrieve_wait_needed(&request, requested) {
        // Single-shot wait: the server has had time to stage the rest by
        // then. No re-poll loop.
        tracing::info!(
            "Waiting {}s before retrieving remaining downloads",
            staging::RETRIEVE_WAIT.as_secs()
        );
        tokio::time::sleep(staging::RETRIEVE_WAIT).await;
    }

    let retrieve = download_retrieve(session, label).await?;
    let found = retrieve.usable_items();
    absorb_items(&mut mapping, &found, found.len() > 1);

    tracing::info!("Resolved {}/{} download URLs", mapping.len(), requested);
    Ok(mapping)
}
