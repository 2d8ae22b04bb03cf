//! Catalog search: criteria, per-dataset filter tables and scene-search
//!
//! User-level filter parameters are turned into the API's nested filter-tree
//! representation. Filter identifiers are opaque per-dataset constants
//! assigned by the catalog; requesting a filter with no identifier for the
//! dataset is a caller error.

use serde_json::{json, Value};

use crate::app::models::{SceneSearchData, SearchResults};
use crate::app::session::M2mSession;
use crate::constants::search as defaults;
use crate::errors::{ApiError, SearchError};

/// Immutable search parameters, built once per invocation
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    /// EarthExplorer catalog dataset name, e.g. `landsat_ard_tile_c2`
    pub dataset: String,
    /// Maximum number of results to return
    pub max_results: u32,
    /// Acquisition date or comma-separated date range, `YYYY-MM-DD`
    pub acquisition_date: Option<String>,
    /// ARD tile grid region (AK, CU, HI)
    pub region: Option<String>,
    /// ARD tile grid horizontal number
    pub horizontal: Option<i64>,
    /// ARD tile grid vertical number
    pub vertical: Option<i64>,
    /// WRS-2 path (scene datasets)
    pub path: Option<i64>,
    /// WRS-2 row (scene datasets)
    pub row: Option<i64>,
    /// ARD tile sensor (All, OLI_TIRS, ETM, TM)
    pub sensor: Option<String>,
    /// ARD tile spacecraft (LANDSAT_4 .. LANDSAT_9)
    pub spacecraft: Option<String>,
    /// Scene satellite number (4, 5, 7, 8, 9)
    pub satellite: Option<String>,
    /// ARD tile production date
    pub production_date: Option<String>,
    /// ARD tile cloud cover upper bound
    pub cloud_cover: Option<u8>,
    /// Scene-based land cloud cover upper bound
    pub land_cloud_cover: Option<u8>,
    /// Sentinel-2 tile number, e.g. T19TDK
    pub tile_number: Option<String>,
    /// Sentinel-2 platform (SENTINEL-2A, SENTINEL-2B)
    pub platform: Option<String>,
}

impl SearchCriteria {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            max_results: defaults::DEFAULT_MAX_RESULTS,
            acquisition_date: None,
            region: None,
            horizontal: None,
            vertical: None,
            path: None,
            row: None,
            sensor: None,
            spacecraft: None,
            satellite: None,
            production_date: None,
            cloud_cover: None,
            land_cloud_cover: None,
            tile_number: None,
            platform: None,
        }
    }

    fn has_metadata_filters(&self) -> bool {
        self.region.is_some()
            || self.horizontal.is_some()
            || self.vertical.is_some()
            || self.path.is_some()
            || self.row.is_some()
            || self.sensor.is_some()
            || self.spacecraft.is_some()
            || self.satellite.is_some()
            || self.production_date.is_some()
            || self.cloud_cover.is_some()
            || self.land_cloud_cover.is_some()
            || self.tile_number.is_some()
            || self.platform.is_some()
    }
}

/// Acquisition date range after normalization of single-date input.
/// One date means start == end; `"a,b"` means start=a, end=b.
pub fn temporal_criteria(input: &str) -> (String, String) {
    match input.split_once(',') {
        Some((start, end)) => (start.trim().to_string(), end.trim().to_string()),
        None => {
            let date = input.trim().to_string();
            (date.clone(), date)
        }
    }
}

// Catalog-assigned filter identifiers. The catalog assigns a distinct id to
// each (dataset, field) pair; a missing entry means the dataset does not
// support that filter.
mod filter_ids {
    pub fn wrs2_path(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_tm_c2_l1" => "5e83d0a017869321",
            "landsat_etm_c2_l1" => "5e83d0d0a996690d",
            "landsat_ot_c2_l1" => "5e81f14f8faf8048",
            "landsat_tm_c2_l2" => "5e83d119a7bb2df1",
            "landsat_etm_c2_l2" => "5e83d12a85c68941",
            "landsat_ot_c2_l2" => "5e83d14fb9436d88",
            _ => return None,
        })
    }

    pub fn wrs2_row(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_tm_c2_l1" => "5e83d0a0f068314e",
            "landsat_etm_c2_l1" => "5e83d0d05ec3c916",
            "landsat_ot_c2_l1" => "5e81f14f8d2a7c24",
            "landsat_tm_c2_l2" => "5e83d1191d93d422",
            "landsat_etm_c2_l2" => "5e83d12a86c531b9",
            "landsat_ot_c2_l2" => "5e83d14ff1eda1b8",
            _ => return None,
        })
    }

    pub fn scene_satellite(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_tm_c2_l1" => "5e83d0a072ef8b3f",
            "landsat_ot_c2_l1" => "61af93b8fad2acf5",
            "landsat_tm_c2_l2" => "5e83d119ec912f46",
            "landsat_ot_c2_l2" => "61b0ca3aec6387e5",
            _ => return None,
        })
    }

    pub fn scene_cloud_cover(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_tm_c2_l1" => "5f6aa1544fb24d4e",
            "landsat_etm_c2_l1" => "5f6aa1792786a363",
            "landsat_ot_c2_l1" => "5f6aa1a4e0985d4c",
            "landsat_tm_c2_l2" => "5f6a715e654f6a9",
            "landsat_etm_c2_l2" => "5f6a709195093287",
            "landsat_ot_c2_l2" => "5f6a6f4a564f7484",
            _ => return None,
        })
    }

    pub fn ard_region(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_ard_tile_c2" => "60fabf689767f137",
            "landsat_dswe_tile_c2" => "6182717769cdbf49",
            "landsat_ba_tile_c2" => "6183d3218e59dd06",
            "landsat_fsca_tile_c2" => "618533b6ba46a347",
            "landsat_fsca_tile_stat_c2" => "61979926e9ed7a92",
            _ => return None,
        })
    }

    pub fn ard_htile(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_ard_tile_c2" => "60fabf683e8957ca",
            "landsat_dswe_tile_c2" => "6182717754c4ba2b",
            "landsat_ba_tile_c2" => "6183d32138f962e3",
            "landsat_fsca_tile_c2" => "618533b62b6213a7",
            "landsat_fsca_tile_stat_c2" => "61979926660504ff",
            _ => return None,
        })
    }

    pub fn ard_vtile(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_ard_tile_c2" => "60fabf68a4fb8ff9",
            "landsat_dswe_tile_c2" => "618271776640e10b",
            "landsat_ba_tile_c2" => "6183d321c4a6fd67",
            "landsat_fsca_tile_c2" => "618533b6763ab6ea",
            "landsat_fsca_tile_stat_c2" => "6197992669094e66",
            _ => return None,
        })
    }

    pub fn ard_sensor(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_ard_tile_c2" => "60fabf6810783d37",
            "landsat_dswe_tile_c2" => "61827177e711118b",
            "landsat_ba_tile_c2" => "6183d32142bce78f",
            "landsat_fsca_tile_c2" => "618533b6c2d0f60e",
            _ => return None,
        })
    }

    pub fn ard_satellite(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_ard_tile_c2" => "60fabf68dce2badd",
            "landsat_dswe_tile_c2" => "6182717722c519c2",
            "landsat_ba_tile_c2" => "6183d321a596f015",
            "landsat_fsca_tile_c2" => "618533b6cf159c35",
            _ => return None,
        })
    }

    pub fn ard_production_date(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_ard_tile_c2" => "60fabf686abb6abf",
            "landsat_dswe_tile_c2" => "618271779883310d",
            "landsat_ba_tile_c2" => "6183d3216647e656",
            "landsat_fsca_tile_c2" => "618533b68f9f4d61",
            "landsat_fsca_tile_stat_c2" => "61979926ab310b9c",
            _ => return None,
        })
    }

    pub fn ard_cloud_cover(dataset: &str) -> Option<&'static str> {
        Some(match dataset {
            "landsat_ard_tile_c2" => "60fabf689e9c00a6",
            "landsat_dswe_tile_c2" => "61827177f71b9ebb",
            "landsat_ba_tile_c2" => "6183d3219f34ec04",
            "landsat_fsca_tile_c2" => "618533b6e5c97fb8",
            _ => return None,
        })
    }

    pub fn s2_tile_number(dataset: &str) -> Option<&'static str> {
        match dataset {
            "sentinel_2a" => Some("5e83a42cc36e732d"),
            _ => None,
        }
    }

    pub fn s2_platform(dataset: &str) -> Option<&'static str> {
        match dataset {
            "sentinel_2a" => Some("5e83a42c8f7042bb"),
            _ => None,
        }
    }
}

fn value_filter(id: &str, value: &Value) -> Value {
    json!({"filterType": "value", "filterId": id, "value": value})
}

fn between_filter(id: &str, first: &Value, second: &Value) -> Value {
    json!({
        "filterType": "between",
        "filterId": id,
        "firstValue": first,
        "secondValue": second,
    })
}

fn require_id(
    dataset: &str,
    filter: &str,
    id: Option<&'static str>,
) -> Result<&'static str, SearchError> {
    id.ok_or_else(|| SearchError::UnsupportedFilter {
        dataset: dataset.to_string(),
        filter: filter.to_string(),
    })
}

/// Build the `sceneFilter` tree from whichever criteria are set
pub fn build_scene_filter(criteria: &SearchCriteria) -> Result<Value, SearchError> {
    let dataset = criteria.dataset.as_str();
    let mut children: Vec<Value> = Vec::new();

    if let Some(region) = &criteria.region {
        let id = require_id(dataset, "region", filter_ids::ard_region(dataset))?;
        children.push(value_filter(id, &json!(region)));
    }
    if let Some(h) = criteria.horizontal {
        let id = require_id(dataset, "horizontal", filter_ids::ard_htile(dataset))?;
        children.push(between_filter(id, &json!(h), &json!(h)));
    }
    if let Some(v) = criteria.vertical {
        let id = require_id(dataset, "vertical", filter_ids::ard_vtile(dataset))?;
        children.push(between_filter(id, &json!(v), &json!(v)));
    }
    if let Some(sensor) = &criteria.sensor {
        let id = require_id(dataset, "sensor", filter_ids::ard_sensor(dataset))?;
        children.push(value_filter(id, &json!(sensor)));
    }
    if let Some(spacecraft) = &criteria.spacecraft {
        let id = require_id(dataset, "spacecraft", filter_ids::ard_satellite(dataset))?;
        children.push(value_filter(id, &json!(spacecraft)));
    }
    if let Some(production_date) = &criteria.production_date {
        let id = require_id(
            dataset,
            "production_date",
            filter_ids::ard_production_date(dataset),
        )?;
        children.push(between_filter(id, &json!(production_date), &json!(production_date)));
    }
    if let Some(cc) = criteria.cloud_cover {
        let id = require_id(dataset, "cloud_cover", filter_ids::ard_cloud_cover(dataset))?;
        children.push(value_filter(id, &json!(cc)));
    }
    if let Some(path) = criteria.path {
        let id = require_id(dataset, "path", filter_ids::wrs2_path(dataset))?;
        children.push(between_filter(id, &json!(path), &json!(path)));
    }
    if let Some(row) = criteria.row {
        let id = require_id(dataset, "row", filter_ids::wrs2_row(dataset))?;
        children.push(between_filter(id, &json!(row), &json!(row)));
    }
    if let Some(satellite) = &criteria.satellite {
        let id = require_id(dataset, "satellite", filter_ids::scene_satellite(dataset))?;
        children.push(value_filter(id, &json!(satellite)));
    }
    if let Some(lcc) = criteria.land_cloud_cover {
        let id = require_id(
            dataset,
            "land_cloud_cover",
            filter_ids::scene_cloud_cover(dataset),
        )?;
        children.push(between_filter(id, &json!(0), &json!(lcc)));
    }
    if let Some(tile_number) = &criteria.tile_number {
        let id = require_id(dataset, "tile_number", filter_ids::s2_tile_number(dataset))?;
        children.push(json!({
            "filterType": "value",
            "filterId": id,
            "value": tile_number,
            "operand": "like",
        }));
    }
    if let Some(platform) = &criteria.platform {
        let id = require_id(dataset, "platform", filter_ids::s2_platform(dataset))?;
        children.push(value_filter(id, &json!(platform)));
    }

    let metadata_filter = if criteria.has_metadata_filters() {
        json!({"filterType": "and", "childFilters": children})
    } else {
        Value::Null
    };

    let acquisition_filter = match &criteria.acquisition_date {
        Some(input) => {
            let (start, end) = temporal_criteria(input);
            json!({"start": start, "end": end})
        }
        None => Value::Null,
    };

    Ok(json!({
        "metadataFilter": metadata_filter,
        "cloudCoverFilter": {
            "min": defaults::CLOUD_COVER_MIN,
            "max": defaults::CLOUD_COVER_MAX,
        },
        "acquisitionFilter": acquisition_filter,
    }))
}

/// Execute a bounded `scene-search` against the catalog
pub async fn search(
    session: &M2mSession,
    criteria: &SearchCriteria,
) -> Result<SearchResults, SearchError> {
    let scene_filter = build_scene_filter(criteria)?;

    // maxResults goes over the wire as a string.
    let payload = json!({
        "datasetName": criteria.dataset,
        "maxResults": criteria.max_results.to_string(),
        "sceneFilter": scene_filter,
    });

    let data = session.request("scene-search", payload).await?;
    let parsed: SceneSearchData =
        serde_json::from_value(data).map_err(|e| ApiError::Protocol {
            resource: "scene-search".to_string(),
            reason: format!("unexpected scene-search payload: {}", e),
        })?;

    tracing::info!("Total search results: {}", parsed.total_hits);

    Ok(SearchResults {
        total_hits: parsed.total_hits,
        scenes: parsed.results,
    })
}
