//! Wire types for the M2M JSON API and the domain types built from them
//!
//! Every response is decoded into these structures immediately after the
//! wire call so downstream code never inspects untyped JSON.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use serde::Deserialize;

use crate::constants::staging;

/// The uniform `{data, errorCode, errorMessage}` response envelope
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    /// Endpoint-specific payload
    pub data: Option<serde_json::Value>,
    /// Explicit API error code, if any
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
    /// Explicit API error message, if any
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

/// Raw `scene-search` payload
#[derive(Debug, Deserialize)]
pub struct SceneSearchData {
    /// Total number of catalog hits (may exceed the returned page)
    #[serde(rename = "totalHits", default)]
    pub total_hits: u64,
    /// Returned scene records
    #[serde(default)]
    pub results: Vec<SceneRecord>,
}

/// One scene in a search response
#[derive(Debug, Clone, Deserialize)]
pub struct SceneRecord {
    /// Human-readable product identifier, for reporting only
    #[serde(rename = "displayId")]
    pub display_id: String,
    /// Opaque catalog key driving all subsequent API calls
    #[serde(rename = "entityId")]
    pub entity_id: String,
}

/// Search outcome: total hit count plus index-aligned scene identifiers
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub total_hits: u64,
    pub scenes: Vec<SceneRecord>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.scenes.iter().map(|s| s.entity_id.clone()).collect()
    }

    pub fn display_ids(&self) -> Vec<String> {
        self.scenes.iter().map(|s| s.display_id.clone()).collect()
    }
}

/// One entry from the `download-options` response
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadOptionRecord {
    /// Entity this option belongs to
    #[serde(rename = "entityId")]
    pub entity_id: String,
    /// Concrete download product id used in download-request
    pub id: String,
    /// Product code matched against the per-dataset tables
    #[serde(rename = "productCode", default)]
    pub product_code: Option<String>,
    /// Whether the option is currently fetchable
    #[serde(default)]
    pub available: bool,
}

/// A concrete fetchable (entity, product) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOption {
    pub entity_id: String,
    pub product_id: String,
}

/// `download-request` payload: entities partitioned by readiness
#[derive(Debug, Deserialize)]
pub struct DownloadRequestData {
    /// Downloads whose URL is usable right away
    #[serde(rename = "availableDownloads", default)]
    pub available_downloads: Vec<RetrieveItem>,
    /// Downloads still staging under this label
    #[serde(rename = "preparingDownloads", default)]
    pub preparing_downloads: Vec<RetrieveItem>,
    /// Products already staged under another label
    #[serde(rename = "duplicateProducts", default)]
    pub duplicate_products: DuplicateProducts,
}

/// The API returns `duplicateProducts` as an empty list when there are
/// none, and as a map of download id to other label when there are.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DuplicateProducts {
    List(Vec<serde_json::Value>),
    Map(HashMap<String, String>),
}

impl Default for DuplicateProducts {
    fn default() -> Self {
        DuplicateProducts::List(Vec::new())
    }
}

impl DuplicateProducts {
    /// Distinct labels under which duplicates are already staged
    pub fn labels(&self) -> BTreeSet<String> {
        match self {
            DuplicateProducts::List(_) => BTreeSet::new(),
            DuplicateProducts::Map(map) => map.values().cloned().collect(),
        }
    }
}

/// `download-retrieve` payload
#[derive(Debug, Deserialize)]
pub struct DownloadRetrieveData {
    #[serde(default)]
    pub available: Vec<RetrieveItem>,
    #[serde(default)]
    pub requested: Vec<RetrieveItem>,
}

impl DownloadRetrieveData {
    /// Items from both partitions whose status allows an immediate GET
    pub fn usable_items(&self) -> Vec<&RetrieveItem> {
        self.available
            .iter()
            .chain(self.requested.iter())
            .filter(|item| item.is_usable())
            .collect()
    }
}

/// One download entry in a request/retrieve response
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveItem {
    #[serde(rename = "entityId", default)]
    pub entity_id: Option<String>,
    #[serde(rename = "productCode", default)]
    pub product_code: Option<String>,
    #[serde(rename = "statusCode", default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl RetrieveItem {
    /// Whether this item's URL can be fetched now (Available, Proxied or
    /// Downloading)
    pub fn is_usable(&self) -> bool {
        match &self.status_code {
            Some(code) => staging::USABLE_STATUS_CODES.contains(&code.as_str()),
            None => false,
        }
    }
}

/// Mapping from dedup key to resolved URL. Once a key is populated it is
/// never overwritten: first resolution wins.
#[derive(Debug, Default, Clone)]
pub struct UrlMapping {
    entries: BTreeMap<String, String>,
}

impl UrlMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the key is already resolved. Returns whether the
    /// entry was added.
    pub fn insert_first(&mut self, key: impl Into<String>, url: impl Into<String>) -> bool {
        match self.entries.entry(key.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(url.into());
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Distinct URLs across all keys. An entity resolved in more than one
    /// pass can sit under both its plain and product-suffixed key with the
    /// same URL; downloads are submitted per URL, never per key.
    pub fn unique_urls(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.entries
            .values()
            .filter(|url| seen.insert(url.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// An immutable download work item: where to fetch from and where the
/// result lands. Carries no other state, so re-issuing is trivial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub directory: PathBuf,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            directory: directory.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_products_decodes_empty_list() {
        let data: DownloadRequestData = serde_json::from_value(serde_json::json!({
            "availableDownloads": [],
            "duplicateProducts": []
        }))
        .unwrap();

        assert!(data.duplicate_products.labels().is_empty());
    }

    #[test]
    fn duplicate_products_decodes_label_map() {
        let data: DownloadRequestData = serde_json::from_value(serde_json::json!({
            "duplicateProducts": {
                "1001": "other-run-a",
                "1002": "other-run-b",
                "1003": "other-run-a"
            }
        }))
        .unwrap();

        let labels = data.duplicate_products.labels();
        assert_eq!(labels.len(), 2);
        assert!(labels.contains("other-run-a"));
        assert!(labels.contains("other-run-b"));
    }

    #[test]
    fn retrieve_item_usability() {
        for code in ["A", "P", "D"] {
            let item = RetrieveItem {
                entity_id: Some("e1".into()),
                product_code: None,
                status_code: Some(code.into()),
                url: Some("https://example.com/f".into()),
            };
            assert!(item.is_usable(), "status {} should be usable", code);
        }

        let preparing = RetrieveItem {
            entity_id: Some("e1".into()),
            product_code: None,
            status_code: Some("R".into()),
            url: None,
        };
        assert!(!preparing.is_usable());
    }

    #[test]
    fn url_mapping_first_resolution_wins() {
        let mut mapping = UrlMapping::new();
        assert!(mapping.insert_first("e1", "https://first.example/f"));
        assert!(!mapping.insert_first("e1", "https://second.example/f"));
        assert_eq!(mapping.get("e1"), Some("https://first.example/f"));
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn unique_urls_collapse_cross_key_duplicates() {
        let mut mapping = UrlMapping::new();
        mapping.insert_first("e1", "https://x/sr");
        mapping.insert_first("e1_D773", "https://x/sr");
        mapping.insert_first("e2", "https://x/other");

        let urls = mapping.unique_urls();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&"https://x/sr"));
        assert!(urls.contains(&"https://x/other"));
    }

    #[test]
    fn retrieve_data_merges_partitions() {
        let data: DownloadRetrieveData = serde_json::from_value(serde_json::json!({
            "available": [
                {"entityId": "e1", "statusCode": "A", "url": "https://x/1"}
            ],
            "requested": [
                {"entityId": "e2", "statusCode": "D", "url": "https://x/2"},
                {"entityId": "e3", "statusCode": "R"}
            ]
        }))
        .unwrap();

        let usable = data.usable_items();
        assert_eq!(usable.len(), 2);
    }
}
