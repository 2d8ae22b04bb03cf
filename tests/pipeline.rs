//! End-to-end tests for the non-network parts of the pipeline:
//! search results handling, option filtering, and URL mapping semantics.

use m2m_fetcher::app::models::{DownloadOptionRecord, SceneSearchData};
use m2m_fetcher::app::products::{filter_options, resolve_product_codes};
use m2m_fetcher::app::search::{build_scene_filter, SearchCriteria};
use m2m_fetcher::app::{SearchResults, UrlMapping};
use m2m_fetcher::cli::commands::write_search_results;

fn three_hit_response() -> SearchResults {
    let data: SceneSearchData = serde_json::from_value(serde_json::json!({
        "totalHits": 3,
        "results": [
            {"displayId": "LC08_CU_011009_20221001_20221012_02", "entityId": "e-1001"},
            {"displayId": "LC08_CU_011009_20221017_20221028_02", "entityId": "e-1002"},
            {"displayId": "LC08_CU_011009_20221102_20221113_02", "entityId": "e-1003"},
        ]
    }))
    .unwrap();

    SearchResults {
        total_hits: data.total_hits,
        scenes: data.results,
    }
}

#[test]
fn search_results_stay_index_aligned() {
    let results = three_hit_response();

    assert_eq!(results.total_hits, 3);
    let display = results.display_ids();
    let entity = results.entity_ids();
    assert_eq!(display.len(), entity.len());
    assert_eq!(display[1], "LC08_CU_011009_20221017_20221028_02");
    assert_eq!(entity[1], "e-1002");
}

#[test]
fn search_only_run_writes_exactly_the_display_ids() {
    let results = three_hit_response();
    let dir = tempfile::tempdir().unwrap();

    let listing = write_search_results(dir.path(), &results.display_ids()).unwrap();
    let contents = std::fs::read_to_string(&listing).unwrap();

    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    for (line, scene) in lines.iter().zip(&results.scenes) {
        assert_eq!(*line, scene.display_id);
    }
}

#[test]
fn entities_without_available_options_are_dropped_quietly() {
    let codes = resolve_product_codes("landsat_ba_tile_c2", None).unwrap();

    let records: Vec<DownloadOptionRecord> = serde_json::from_value(serde_json::json!([
        {"entityId": "e-1001", "id": "7001", "productCode": "D784", "available": true},
        // Staged elsewhere, not currently available: must drop.
        {"entityId": "e-1002", "id": "7002", "productCode": "D784", "available": false},
        // Wrong product family entirely: must drop.
        {"entityId": "e-1003", "id": "7003", "productCode": "D999", "available": true},
    ]))
    .unwrap();

    let options = filter_options(records, &codes);
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].entity_id, "e-1001");
    assert_eq!(options[0].product_id, "7001");
}

#[test]
fn url_mapping_resolution_is_idempotent() {
    // Resolving twice for the same label and entity set must never replace
    // an already-populated entry.
    let mut mapping = UrlMapping::new();

    for _ in 0..2 {
        mapping.insert_first("e-1001", "https://dds.cr.usgs.gov/first");
        mapping.insert_first("e-1002", "https://dds.cr.usgs.gov/second");
    }
    mapping.insert_first("e-1001", "https://dds.cr.usgs.gov/replacement");

    assert_eq!(mapping.len(), 2);
    assert_eq!(mapping.get("e-1001"), Some("https://dds.cr.usgs.gov/first"));
}

#[test]
fn filter_tree_rejects_foreign_dataset_filters() {
    let mut criteria = SearchCriteria::new("landsat_fsca_tile_stat_c2");
    // This dataset registers no sensor filter id.
    criteria.sensor = Some("TM".to_string());

    assert!(build_scene_filter(&criteria).is_err());
}
