//! Cumulative state derivation for one run date.
//!
//! Yesterday's state rows and today's keyed observations are merged over
//! the union of natural keys — the explicit-merge analogue of a full outer
//! join — visiting each key exactly once and handing
//! `(previous | absent, current | absent)` to the classifier. Entities
//! absent from today's feed still produce a carried-forward record, which
//! is what keeps the continuity invariant: once first seen, a record
//! exists for every subsequent run date.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use strata_core::{CumulativeStateRecord, ListingObservation};

use crate::classifier::classify;
use crate::error::Result;

/// Keys a day's observations by natural key.
///
/// Duplicate rows for one property within a day collapse
/// deterministically: last-in-batch wins, matching the dimension
/// tracker's tie-break.
#[must_use]
pub fn key_by_property(
    observations: Vec<ListingObservation>,
) -> BTreeMap<String, ListingObservation> {
    let mut keyed = BTreeMap::new();
    for obs in observations {
        keyed.insert(obs.property_id.clone(), obs);
    }
    keyed
}

/// Derives the cumulative state rows for `run_date`.
///
/// # Errors
///
/// Propagates classifier errors; with inputs drawn from the two maps the
/// both-absent case cannot arise.
pub fn derive_day(
    previous: &BTreeMap<String, CumulativeStateRecord>,
    observations: &BTreeMap<String, ListingObservation>,
    run_date: NaiveDate,
) -> Result<Vec<CumulativeStateRecord>> {
    let mut records = Vec::new();

    let keys = previous
        .keys()
        .chain(observations.keys())
        .collect::<std::collections::BTreeSet<_>>();

    for key in keys {
        let record = classify(key, previous.get(key), observations.get(key), run_date)?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Money, PriceState, PropertyState};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn observation(property: &str, load: NaiveDate, price_dollars: i64) -> ListingObservation {
        serde_json::from_value(serde_json::json!({
            "id": property,
            "price": price_dollars,
            "loadDate": load.format("%Y-%m-%d").to_string(),
        }))
        .expect("valid observation")
    }

    #[test]
    fn union_covers_new_retained_and_churned_in_one_pass() {
        let day1 = date(2025, 2, 3);
        let day2 = date(2025, 2, 4);

        let previous_rows = derive_day(
            &BTreeMap::new(),
            &key_by_property(vec![
                observation("gone", day1, 900),
                observation("stays", day1, 1000),
            ]),
            day1,
        )
        .expect("day1");
        let previous: BTreeMap<_, _> = previous_rows
            .into_iter()
            .map(|r| (r.property_id.clone(), r))
            .collect();

        let today = key_by_property(vec![
            observation("stays", day2, 1100),
            observation("fresh", day2, 2000),
        ]);

        let records = derive_day(&previous, &today, day2).expect("day2");
        let by_id: BTreeMap<_, _> = records
            .into_iter()
            .map(|r| (r.property_id.clone(), r))
            .collect();

        assert_eq!(by_id.len(), 3, "every key visited exactly once");
        assert_eq!(by_id["fresh"].property_state, PropertyState::New);
        assert_eq!(by_id["stays"].property_state, PropertyState::Retained);
        assert_eq!(by_id["stays"].price_state, PriceState::PriceIncreased);
        assert_eq!(by_id["gone"].property_state, PropertyState::Churned);
        assert_eq!(by_id["gone"].price, Some(Money::from_dollars(900)));
    }

    #[test]
    fn duplicate_observations_collapse_last_in_batch_wins() {
        let day = date(2025, 2, 4);
        let keyed = key_by_property(vec![
            observation("p1", day, 1000),
            observation("p1", day, 1250),
        ]);

        assert_eq!(keyed.len(), 1);
        assert_eq!(keyed["p1"].price, Some(Money::from_dollars(1250)));
    }

    #[test]
    fn empty_feed_day_still_carries_every_known_entity() {
        let day1 = date(2025, 2, 3);
        let day2 = date(2025, 2, 4);

        let day1_rows = derive_day(
            &BTreeMap::new(),
            &key_by_property(vec![observation("p1", day1, 1000)]),
            day1,
        )
        .expect("day1");
        let previous: BTreeMap<_, _> = day1_rows
            .into_iter()
            .map(|r| (r.property_id.clone(), r))
            .collect();

        let records = derive_day(&previous, &BTreeMap::new(), day2).expect("day2");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].property_state, PropertyState::Churned);
        assert_eq!(records[0].date, day2);
    }
}
