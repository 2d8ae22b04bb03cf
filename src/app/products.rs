//! Product flavor resolution and download-options filtering
//!
//! Scene-based datasets carry two possible product codes, one for on-prem
//! and one for cloud-hosted copies; the download-options response says
//! which one is live via its `available` flag. Tile datasets have a single
//! real code, paired with the never-valid placeholder `D000`. The ARD tile
//! collection instead exposes named flavors (SR, TOA, ST, BT, QA, META)
//! that each map to their own code.

use serde_json::json;

use crate::app::models::{DownloadOption, DownloadOptionRecord};
use crate::app::session::M2mSession;
use crate::errors::{ApiError, ProductError};

/// ARD tile bundle dataset with per-flavor product codes
pub const ARD_TILE_DATASET: &str = "landsat_ard_tile_c2";

/// Default flavor requested for ARD tiles when the caller names none
pub const DEFAULT_ARD_FLAVOR: &str = "SR";

fn ard_flavor_code(flavor: &str) -> Option<&'static str> {
    Some(match flavor {
        "SR" => "D773",
        "TOA" => "D775",
        "ST" => "D774",
        "BT" => "D776",
        "QA" => "D777",
        "META" => "D772",
        _ => return None,
    })
}

fn dataset_code_pair(dataset: &str) -> Option<(&'static str, &'static str)> {
    Some(match dataset {
        "landsat_tm_c2_l1" | "landsat_etm_c2_l1" | "landsat_ot_c2_l1" => ("D688", "D690"),
        "landsat_tm_c2_l2" | "landsat_etm_c2_l2" | "landsat_ot_c2_l2" => ("D692", "D694"),
        "landsat_dswe_tile_c2" => ("D000", "D788"),
        "landsat_ba_tile_c2" => ("D000", "D784"),
        "landsat_fsca_tile_c2" => ("D000", "D792"),
        "landsat_fsca_tile_stat_c2" => ("D000", "D796"),
        "sentinel_2a" | "modis_mod09a1_v61" | "modis_myd09a1_v61" | "modis_mod09ga_v61"
        | "modis_myd09ga_v61" => ("D000", "D557"),
        _ => return None,
    })
}

/// Map a dataset and an optional comma-delimited flavor list to the
/// concrete product codes accepted from download-options.
pub fn resolve_product_codes(
    dataset: &str,
    flavors: Option<&str>,
) -> Result<Vec<&'static str>, ProductError> {
    let dataset_lower = dataset.to_ascii_lowercase();

    if dataset_lower == ARD_TILE_DATASET {
        let flavor_list = match flavors {
            Some(list) if !list.trim().is_empty() => {
                list.split(',').map(str::trim).collect::<Vec<_>>()
            }
            _ => vec![DEFAULT_ARD_FLAVOR],
        };

        return flavor_list
            .into_iter()
            .map(|flavor| {
                ard_flavor_code(flavor).ok_or_else(|| ProductError::UnknownFlavor {
                    dataset: dataset.to_string(),
                    flavor: flavor.to_string(),
                })
            })
            .collect();
    }

    let (on_prem, cloud) =
        dataset_code_pair(&dataset_lower).ok_or_else(|| ProductError::UnknownDataset {
            dataset: dataset.to_string(),
        })?;
    Ok(vec![on_prem, cloud])
}

/// Filter raw download-options records to the resolved code set, keeping
/// only currently available entries.
pub fn filter_options(
    records: Vec<DownloadOptionRecord>,
    codes: &[&str],
) -> Vec<DownloadOption> {
    records
        .into_iter()
        .filter(|record| {
            record.available
                && record
                    .product_code
                    .as_deref()
                    .map(|code| codes.contains(&code))
                    .unwrap_or(false)
        })
        .map(|record| DownloadOption {
            entity_id: record.entity_id,
            product_id: record.id,
        })
        .collect()
}

/// Call download-options once for all entities and reduce the response to
/// the fetchable (entity, product) pairs for the requested flavors.
///
/// Entities with no surviving option are silently dropped from the result;
/// that is documented behavior, not an error.
pub async fn resolve_products(
    session: &M2mSession,
    entity_ids: &[String],
    dataset: &str,
    flavors: Option<&str>,
) -> Result<Vec<DownloadOption>, ProductError> {
    let codes = resolve_product_codes(dataset, flavors)?;

    let payload = json!({
        "entityIds": entity_ids,
        "datasetName": dataset,
    });
    let data = session.request("download-options", payload).await?;

    let records: Vec<DownloadOptionRecord> =
        serde_json::from_value(data).map_err(|e| ApiError::Protocol {
            resource: "download-options".to_string(),
            reason: format!("unexpected download-options payload: {}", e),
        })?;

    let options = filter_options(records, &codes);
    tracing::info!(
        "{} of {} entities have an available product option",
        options.len(),
        entity_ids.len()
    );
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_dataset_resolves_code_pair() {
        let codes = resolve_product_codes("landsat_ot_c2_l2", None).unwrap();
        assert_eq!(codes, vec!["D692", "D694"]);
    }

    #[test]
    fn ard_flavors_resolve_individually() {
        let codes = resolve_product_codes("landsat_ard_tile_c2", Some("SR,TOA,META")).unwrap();
        assert_eq!(codes, vec!["D773", "D775", "D772"]);
    }

    #[test]
    fn ard_defaults_to_surface_reflectance() {
        let codes = resolve_product_codes("landsat_ard_tile_c2", None).unwrap();
        assert_eq!(codes, vec!["D773"]);
    }

    #[test]
    fn unknown_flavor_fails() {
        match resolve_product_codes("landsat_ard_tile_c2", Some("SR,NDVI")) {
            Err(ProductError::UnknownFlavor { flavor, .. }) => assert_eq!(flavor, "NDVI"),
            other => panic!("expected UnknownFlavor, got {:?}", other),
        }
    }

    #[test]
    fn unknown_dataset_fails() {
        assert!(matches!(
            resolve_product_codes("aster_l1t", None),
            Err(ProductError::UnknownDataset { .. })
        ));
    }

    #[test]
    fn dataset_name_matching_is_case_insensitive() {
        let codes = resolve_product_codes("Landsat_BA_Tile_C2", None).unwrap();
        assert_eq!(codes, vec!["D000", "D784"]);
    }

    fn record(entity: &str, id: &str, code: &str, available: bool) -> DownloadOptionRecord {
        serde_json::from_value(serde_json::json!({
            "entityId": entity,
            "id": id,
            "productCode": code,
            "available": available,
        }))
        .unwrap()
    }

    #[test]
    fn options_filtered_by_code_and_availability() {
        let records = vec![
            record("e1", "100", "D688", false),
            record("e1", "101", "D690", true),
            record("e2", "102", "D123", true),
            record("e3", "103", "D688", true),
        ];

        let options = filter_options(records, &["D688", "D690"]);
        assert_eq!(
            options,
            vec![
                DownloadOption {
                    entity_id: "e1".into(),
                    product_id: "101".into()
                },
                DownloadOption {
                    entity_id: "e3".into(),
                    product_id: "103".into()
                },
            ]
        );
    }

    #[test]
    fn entity_with_no_matching_option_is_dropped() {
        let records = vec![record("e1", "100", "D000", true)];
        let options = filter_options(records, &["D688", "D690"]);
        assert!(options.is_empty());
    }
}
