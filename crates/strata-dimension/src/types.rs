//! Dimension version rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use strata_core::SurrogateKey;

/// One SCD2 row: an entity's tracked attribute state over a validity
/// interval.
///
/// For a given entity, versions partition time without gaps or overlaps
/// and exactly one version is current (`valid_to` = `None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionVersion {
    /// Entity-grain surrogate key (property + segment).
    pub surrogate_key: SurrogateKey,
    /// Natural key of the property.
    pub property_id: String,
    /// Tracked attribute values, canonicalized.
    pub attributes: BTreeMap<String, String>,
    /// Date the attribute state was first observed.
    pub valid_from: NaiveDate,
    /// Date a later state superseded this one; `None` while current.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<NaiveDate>,
    /// Whether this is the entity's current version.
    pub is_current: bool,
}

impl DimensionVersion {
    /// Merge key within the dimension table: `{property_id}/{valid_from}`.
    ///
    /// Closing a version and inserting its successor touch different keys,
    /// so both land (or neither lands) in one manifest swap.
    #[must_use]
    pub fn merge_key(&self) -> String {
        format!("{}/{}", self.property_id, self.valid_from.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_round_trips_through_json() {
        let version = DimensionVersion {
            surrogate_key: serde_json::from_str("\"abc\"").expect("key"),
            property_id: "p1".into(),
            attributes: BTreeMap::from([("bedrooms".to_string(), "2".to_string())]),
            valid_from: NaiveDate::from_ymd_opt(2025, 2, 4).expect("date"),
            valid_to: None,
            is_current: true,
        };

        let json = serde_json::to_string(&version).expect("serialize");
        assert!(!json.contains("validTo"), "open interval omits validTo");
        let back: DimensionVersion = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, version);
    }
}
