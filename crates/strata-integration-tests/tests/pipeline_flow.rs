//! End-to-end pipeline flow over a realistic feed week, exercising the
//! watermark, the dimension tracker, the classifier, and the merge writer
//! together against both memory and filesystem backends.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use strata_core::storage::{LocalFsBackend, MemoryBackend, StorageBackend};
use strata_core::{CumulativeStateRecord, ListingObservation, PriceState, PropertyState, Segment};
use strata_dimension::DimensionVersion;
use strata_engine::DailyRun;
use strata_merge::TableReader;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// A realistic feed row, shaped like staged listing JSON.
fn listing(
    property: &str,
    load: NaiveDate,
    price_dollars: i64,
    bedrooms: i64,
    address: &str,
) -> ListingObservation {
    serde_json::from_value(serde_json::json!({
        "id": property,
        "formattedAddress": address,
        "city": "Philadelphia",
        "state": "PA",
        "zipCode": "19106",
        "propertyType": "Apartment",
        "bedrooms": bedrooms,
        "bathrooms": 1.0,
        "squareFootage": 780,
        "status": "Active",
        "price": price_dollars,
        "listingType": "Standard",
        "listedDate": "2025-01-15T00:00:00Z",
        "mlsName": "BrightMLS",
        "loadDate": load.format("%Y-%m-%d").to_string(),
    }))
    .expect("valid listing")
}

async fn cumulative_at(
    storage: &Arc<dyn StorageBackend>,
    segment: Segment,
    day: NaiveDate,
) -> BTreeMap<String, CumulativeStateRecord> {
    TableReader::new(Arc::clone(storage), segment.cumulative_table())
        .rows_at_date(day)
        .await
        .expect("rows at date")
}

#[tokio::test]
async fn week_of_rent_feed_produces_consistent_state_and_dimension() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let run = DailyRun::new(Arc::clone(&storage), Segment::Rent);

    let days: Vec<NaiveDate> = (1..=6).map(|d| date(2025, 2, d)).collect();

    // Day 1: two listings appear.
    run.execute(
        vec![
            listing("ph-100", days[0], 1800, 1, "100 Market St Unit 1"),
            listing("ph-200", days[0], 2400, 2, "200 Walnut St Unit 3"),
        ],
        days[0],
        false,
        Utc::now(),
    )
    .await
    .expect("day 1");

    // Day 2: ph-100 drops its price, ph-200 unchanged.
    run.execute(
        vec![
            listing("ph-100", days[1], 1750, 1, "100 Market St Unit 1"),
            listing("ph-200", days[1], 2400, 2, "200 Walnut St Unit 3"),
        ],
        days[1],
        false,
        Utc::now(),
    )
    .await
    .expect("day 2");

    // Day 3: ph-200 vanishes; ph-100 gets renovated to 2 bedrooms.
    run.execute(
        vec![listing("ph-100", days[2], 1950, 2, "100 Market St Unit 1")],
        days[2],
        false,
        Utc::now(),
    )
    .await
    .expect("day 3");

    // Days 4 and 5: ph-200 still gone; ph-100 stable.
    for day in [days[3], days[4]] {
        run.execute(
            vec![listing("ph-100", day, 1950, 2, "100 Market St Unit 1")],
            day,
            false,
            Utc::now(),
        )
        .await
        .expect("mid-week day");
    }

    // Day 6: ph-200 comes back at a higher price.
    run.execute(
        vec![
            listing("ph-100", days[5], 1950, 2, "100 Market St Unit 1"),
            listing("ph-200", days[5], 2550, 2, "200 Walnut St Unit 3"),
        ],
        days[5],
        false,
        Utc::now(),
    )
    .await
    .expect("day 6");

    // Lifecycle of ph-200: New -> Price Unchanged/Retained -> Churned ->
    // Inactive -> Inactive -> Resurrected with a price increase.
    let expectations = [
        (days[0], PropertyState::New, PriceState::New),
        (days[1], PropertyState::Retained, PriceState::PriceUnchanged),
        (days[2], PropertyState::Churned, PriceState::Unknown),
        (days[3], PropertyState::Inactive, PriceState::Unknown),
        (days[4], PropertyState::Inactive, PriceState::Unknown),
        (days[5], PropertyState::Resurrected, PriceState::PriceIncreased),
    ];
    for (day, property_state, price_state) in expectations {
        let rows = cumulative_at(&storage, Segment::Rent, day).await;
        let record = &rows["ph-200"];
        assert_eq!(record.property_state, property_state, "{day}");
        assert_eq!(record.price_state, price_state, "{day}");
    }

    // Continuity: ph-200 has a record for all six days; days on market
    // never regresses.
    let reader = TableReader::new(Arc::clone(&storage), Segment::Rent.cumulative_table());
    let history: Vec<(String, CumulativeStateRecord)> =
        reader.scan_prefix("ph-200/").await.expect("history");
    assert_eq!(history.len(), 6);
    assert!(
        history
            .windows(2)
            .all(|pair| pair[0].1.days_on_market <= pair[1].1.days_on_market)
    );

    // Dimension: ph-100 has two versions split at the renovation date;
    // price changes alone never created one.
    let dim_reader = TableReader::new(Arc::clone(&storage), Segment::Rent.dimension_table());
    let versions: Vec<(String, DimensionVersion)> =
        dim_reader.scan_prefix("ph-100/").await.expect("versions");
    assert_eq!(versions.len(), 2);
    let chain: Vec<DimensionVersion> = versions.into_iter().map(|(_, v)| v).collect();
    strata_dimension::validate_partition(&chain).expect("partition invariant");
    assert_eq!(chain[0].valid_to, Some(days[2]));
    assert_eq!(chain[1].attributes["bedrooms"], "2");

    // The watermark now sits at day 6.
    let stats = reader.stats().await.expect("stats").expect("present");
    assert_eq!(stats.max_date, Some(days[5]));
}

#[tokio::test]
async fn pipeline_survives_process_restarts_on_filesystem_storage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let d1 = date(2025, 3, 1);
    let d2 = date(2025, 3, 2);

    // First "process": day 1.
    {
        let storage: Arc<dyn StorageBackend> =
            Arc::new(LocalFsBackend::new(dir.path()).expect("backend"));
        let run = DailyRun::new(Arc::clone(&storage), Segment::Sale);
        run.execute(
            vec![listing("row-9", d1, 425_000, 3, "9 Pine St")],
            d1,
            false,
            Utc::now(),
        )
        .await
        .expect("day 1");
    }

    // Second "process" over the same root: the watermark and prior state
    // come from storage, not memory.
    let storage: Arc<dyn StorageBackend> =
        Arc::new(LocalFsBackend::new(dir.path()).expect("backend"));
    let run = DailyRun::new(Arc::clone(&storage), Segment::Sale);
    let summary = run
        .execute(
            vec![listing("row-9", d2, 430_000, 3, "9 Pine St")],
            d2,
            false,
            Utc::now(),
        )
        .await
        .expect("day 2");

    assert_eq!(summary.cutoff, d1, "watermark read back from storage");

    let rows = cumulative_at(&storage, Segment::Sale, d2).await;
    assert_eq!(rows["row-9"].property_state, PropertyState::Retained);
    assert_eq!(rows["row-9"].price_state, PriceState::PriceIncreased);
    assert_eq!(rows["row-9"].days_on_market, 1);
}

#[tokio::test]
async fn resubmitting_a_day_end_to_end_is_idempotent() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let run = DailyRun::new(Arc::clone(&storage), Segment::Rent);
    let day = date(2025, 3, 10);
    let feed = vec![listing("p1", day, 1500, 1, "1 Race St")];

    run.execute(feed.clone(), day, false, Utc::now())
        .await
        .expect("first");
    let manifest_after_first = TableReader::new(Arc::clone(&storage), Segment::Rent.cumulative_table())
        .manifest()
        .await
        .expect("manifest")
        .expect("present");

    // Incremental replay: filtered by the watermark.
    run.execute(feed.clone(), day, false, Utc::now())
        .await
        .expect("watermark replay");

    // Forced replay: identical batch detected by fingerprint.
    run.execute(feed, day, true, Utc::now())
        .await
        .expect("full refresh replay");

    let manifest_after_replays = TableReader::new(Arc::clone(&storage), Segment::Rent.cumulative_table())
        .manifest()
        .await
        .expect("manifest")
        .expect("present");

    assert_eq!(
        manifest_after_first.rows, manifest_after_replays.rows,
        "row pointers unchanged by replays"
    );
    assert_eq!(manifest_after_first.version, manifest_after_replays.version);
}
