//! Lifecycle and price states, and the cumulative per-run state record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

/// Day-over-day lifecycle state of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyState {
    /// First ever appearance in the feed.
    New,
    /// Was active yesterday and is present today.
    Retained,
    /// Was active yesterday and is absent today.
    Churned,
    /// Was churned/inactive and reappeared today.
    Resurrected,
    /// Churned yesterday and still absent today.
    Inactive,
    /// State could not be determined (carried forward).
    Unknown,
}

impl PropertyState {
    /// Whether this state counts as actively listed.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::New | Self::Retained | Self::Resurrected)
    }

    /// Whether this state counts as dropped out of the feed.
    #[must_use]
    pub const fn is_dormant(self) -> bool {
        matches!(self, Self::Churned | Self::Inactive)
    }
}

impl fmt::Display for PropertyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "New",
            Self::Retained => "Retained",
            Self::Churned => "Churned",
            Self::Resurrected => "Resurrected",
            Self::Inactive => "Inactive",
            Self::Unknown => "Unknown",
        })
    }
}

/// Day-over-day price-movement state of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceState {
    /// First ever appearance; no prior price to compare.
    New,
    /// Price rose versus the previous record.
    #[serde(rename = "Price Increased")]
    PriceIncreased,
    /// Price fell versus the previous record.
    #[serde(rename = "Price Decreased")]
    PriceDecreased,
    /// Price equals the previous record.
    #[serde(rename = "Price Unchanged")]
    PriceUnchanged,
    /// Reappeared after churn and no price comparison was possible.
    Resurrected,
    /// No comparison was possible.
    Unknown,
}

impl fmt::Display for PriceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "New",
            Self::PriceIncreased => "Price Increased",
            Self::PriceDecreased => "Price Decreased",
            Self::PriceUnchanged => "Price Unchanged",
            Self::Resurrected => "Resurrected",
            Self::Unknown => "Unknown",
        })
    }
}

/// One row per (property, run date) in a cumulative state table.
///
/// Classification is first-order Markov: each record is computed from the
/// immediately preceding record and the current day's observation (or its
/// absence) only. Once a property's first record exists, a record is
/// written for every subsequent run date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeStateRecord {
    /// Natural key of the property.
    pub property_id: String,
    /// First date the property ever appeared. Carried forward once set.
    pub first_listed_date: NaiveDate,
    /// Most recent date the property appeared in the feed.
    pub last_active_date: NaiveDate,
    /// Run date this record belongs to.
    pub date: NaiveDate,
    /// Last known asking price (carried forward when absent or null).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    /// Days since first listed, as of this record's effective date.
    pub days_on_market: i64,
    /// Lifecycle state for this run date.
    pub property_state: PropertyState,
    /// Price-movement state for this run date.
    pub price_state: PriceState,
}

impl CumulativeStateRecord {
    /// Merge key within the cumulative table: `{property_id}/{date}`.
    ///
    /// The ISO date suffix makes per-property key ranges sort
    /// chronologically.
    #[must_use]
    pub fn merge_key(&self) -> String {
        format!("{}/{}", self.property_id, self.date.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn price_states_serialize_with_feed_facing_labels() {
        assert_eq!(
            serde_json::to_string(&PriceState::PriceIncreased).expect("serialize"),
            "\"Price Increased\""
        );
        let back: PriceState = serde_json::from_str("\"Price Unchanged\"").expect("deserialize");
        assert_eq!(back, PriceState::PriceUnchanged);
    }

    #[test]
    fn active_and_dormant_partition_the_classified_states() {
        for state in [
            PropertyState::New,
            PropertyState::Retained,
            PropertyState::Churned,
            PropertyState::Resurrected,
            PropertyState::Inactive,
        ] {
            assert_ne!(state.is_active(), state.is_dormant(), "{state}");
        }
        assert!(!PropertyState::Unknown.is_active());
        assert!(!PropertyState::Unknown.is_dormant());
    }

    #[test]
    fn merge_key_sorts_chronologically_per_property() {
        let mk = |d: NaiveDate| CumulativeStateRecord {
            property_id: "p1".into(),
            first_listed_date: d,
            last_active_date: d,
            date: d,
            price: None,
            days_on_market: 0,
            property_state: PropertyState::New,
            price_state: PriceState::New,
        };

        let jan = mk(date(2025, 1, 31)).merge_key();
        let feb = mk(date(2025, 2, 1)).merge_key();
        assert!(jan < feb);
    }
}
