//! Multi-day lifecycle scenarios driven through the full run pipeline.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use strata_core::storage::{MemoryBackend, StorageBackend};
use strata_core::{CumulativeStateRecord, ListingObservation, PriceState, PropertyState, Segment};
use strata_dimension::DimensionVersion;
use strata_engine::DailyRun;
use strata_merge::TableReader;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn observation(property: &str, load: NaiveDate, price_dollars: i64, bedrooms: i64) -> ListingObservation {
    serde_json::from_value(serde_json::json!({
        "id": property,
        "price": price_dollars,
        "bedrooms": bedrooms,
        "bathrooms": 1.0,
        "loadDate": load.format("%Y-%m-%d").to_string(),
    }))
    .expect("valid observation")
}

async fn rows_at(
    storage: &Arc<dyn StorageBackend>,
    table: &str,
    day: NaiveDate,
) -> BTreeMap<String, CumulativeStateRecord> {
    TableReader::new(Arc::clone(storage), table)
        .rows_at_date(day)
        .await
        .expect("rows at date")
}

#[tokio::test]
async fn lifecycle_across_a_week() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let run = DailyRun::new(Arc::clone(&storage), Segment::Rent);
    let table = Segment::Rent.cumulative_table();

    let d1 = date(2025, 2, 1);
    let d2 = date(2025, 2, 2);
    let d3 = date(2025, 2, 3);
    let d4 = date(2025, 2, 4);
    let d5 = date(2025, 2, 5);

    // Day 1: first sight.
    run.execute(vec![observation("p1", d1, 1000, 2)], d1, false, Utc::now())
        .await
        .expect("day 1");
    let day1 = rows_at(&storage, table, d1).await;
    assert_eq!(day1["p1"].property_state, PropertyState::New);
    assert_eq!(day1["p1"].price_state, PriceState::New);
    assert_eq!(day1["p1"].days_on_market, 0);

    // Day 2: retained with a price increase.
    run.execute(vec![observation("p1", d2, 1200, 2)], d2, false, Utc::now())
        .await
        .expect("day 2");
    let day2 = rows_at(&storage, table, d2).await;
    assert_eq!(day2["p1"].property_state, PropertyState::Retained);
    assert_eq!(day2["p1"].price_state, PriceState::PriceIncreased);
    assert_eq!(day2["p1"].days_on_market, 1);

    // Day 3: absent from the feed -> churned, record still written.
    run.execute(Vec::new(), d3, false, Utc::now())
        .await
        .expect("day 3");
    let day3 = rows_at(&storage, table, d3).await;
    assert_eq!(day3["p1"].property_state, PropertyState::Churned);
    assert_eq!(day3["p1"].last_active_date, d2);

    // Day 4: still absent -> inactive.
    run.execute(Vec::new(), d4, false, Utc::now())
        .await
        .expect("day 4");
    let day4 = rows_at(&storage, table, d4).await;
    assert_eq!(day4["p1"].property_state, PropertyState::Inactive);

    // Day 5: back at the same price -> resurrected; the delta comparison
    // wins over the resurrection price state.
    run.execute(vec![observation("p1", d5, 1200, 2)], d5, false, Utc::now())
        .await
        .expect("day 5");
    let day5 = rows_at(&storage, table, d5).await;
    assert_eq!(day5["p1"].property_state, PropertyState::Resurrected);
    assert_eq!(day5["p1"].price_state, PriceState::PriceUnchanged);
    assert_eq!(day5["p1"].last_active_date, d5);

    // Continuity: a record exists for every date since first sight.
    let reader = TableReader::new(Arc::clone(&storage), table);
    let history: Vec<(String, CumulativeStateRecord)> =
        reader.scan_prefix("p1/").await.expect("history");
    assert_eq!(history.len(), 5);
    let mut last_dom = -1;
    for (_, record) in &history {
        assert!(record.days_on_market >= last_dom, "days on market never regresses");
        last_dom = record.days_on_market;
    }
}

#[tokio::test]
async fn dimension_versions_track_attribute_changes_only() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let run = DailyRun::new(Arc::clone(&storage), Segment::Sale);
    let dim_table = Segment::Sale.dimension_table();

    let d1 = date(2025, 1, 1);
    let d5 = date(2025, 1, 5);
    let d10 = date(2025, 1, 10);

    // Stable attributes for days 1 and 5; price changes are untracked.
    run.execute(vec![observation("f1", d1, 500_000, 2)], d1, false, Utc::now())
        .await
        .expect("day 1");
    run.execute(vec![observation("f1", d5, 480_000, 2)], d5, false, Utc::now())
        .await
        .expect("day 5");

    let reader = TableReader::new(Arc::clone(&storage), dim_table);
    let versions: Vec<(String, DimensionVersion)> =
        reader.scan_prefix("f1/").await.expect("versions");
    assert_eq!(versions.len(), 1, "price change must not fragment history");

    // Bedrooms 2 -> 3 on day 10.
    run.execute(vec![observation("f1", d10, 480_000, 3)], d10, false, Utc::now())
        .await
        .expect("day 10");

    let versions: Vec<(String, DimensionVersion)> =
        reader.scan_prefix("f1/").await.expect("versions");
    assert_eq!(versions.len(), 2);

    let first = &versions[0].1;
    assert_eq!(first.valid_from, d1);
    assert_eq!(first.valid_to, Some(d10));
    assert!(!first.is_current);

    let second = &versions[1].1;
    assert_eq!(second.valid_from, d10);
    assert_eq!(second.valid_to, None);
    assert!(second.is_current);
    assert_eq!(second.attributes["bedrooms"], "3");

    strata_dimension::validate_partition(&[first.clone(), second.clone()])
        .expect("partition invariant holds");
}

#[tokio::test]
async fn full_refresh_backfills_history_and_converges() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let run = DailyRun::new(Arc::clone(&storage), Segment::Rent);
    let table = Segment::Rent.cumulative_table();

    let d1 = date(2025, 2, 1);
    let d2 = date(2025, 2, 2);

    let history = vec![
        observation("p1", d1, 1000, 2),
        observation("p1", d2, 1100, 2),
    ];

    let summary = run
        .execute(history.clone(), d2, true, Utc::now())
        .await
        .expect("backfill");
    assert_eq!(summary.dates_processed, vec![d1, d2]);

    let day2 = rows_at(&storage, table, d2).await;
    assert_eq!(day2["p1"].property_state, PropertyState::Retained);
    assert_eq!(day2["p1"].price_state, PriceState::PriceIncreased);

    // Re-running the same full refresh converges to the same state.
    let again = run
        .execute(history, d2, true, Utc::now())
        .await
        .expect("re-run");
    assert_eq!(again.dates_processed, vec![d1, d2]);

    let reader = TableReader::new(Arc::clone(&storage), table);
    let stats = reader.stats().await.expect("stats").expect("present");
    assert_eq!(stats.rows, 2, "no duplicate rows after replay");
}

#[tokio::test]
async fn segments_run_concurrently_without_sharing_state() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let day = date(2025, 2, 4);

    let rent_run = DailyRun::new(Arc::clone(&storage), Segment::Rent);
    let sale_run = DailyRun::new(Arc::clone(&storage), Segment::Sale);

    let rent = rent_run.execute(
        vec![observation("p1", day, 1800, 2)],
        day,
        false,
        Utc::now(),
    );
    let sale = sale_run.execute(
        vec![observation("p1", day, 450_000, 2)],
        day,
        false,
        Utc::now(),
    );

    let (rent, sale) = tokio::join!(rent, sale);
    rent.expect("rent run");
    sale.expect("sale run");

    let rent_rows = rows_at(&storage, Segment::Rent.cumulative_table(), day).await;
    let sale_rows = rows_at(&storage, Segment::Sale.cumulative_table(), day).await;
    assert_eq!(rent_rows.len(), 1);
    assert_eq!(sale_rows.len(), 1);
    assert_ne!(rent_rows["p1"].price, sale_rows["p1"].price);
}
