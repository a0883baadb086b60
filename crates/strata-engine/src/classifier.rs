//! Day-over-day lifecycle and price classification.
//!
//! `classify` is a pure function of the immediately preceding cumulative
//! record and the current day's observation (or its absence). Exactly one
//! side may legitimately be absent; both absent indicates an upstream join
//! defect and fails loudly. The run date is an explicit parameter — the
//! classifier never reads the clock.
//!
//! Rule ordering matters and is fixed here: price delta comparisons are
//! exhausted before the resurrection fallback, so a resurrected listing
//! with both prices known reports its price delta, and
//! `PriceState::Resurrected` fires only when a comparison is impossible.

use chrono::NaiveDate;

use strata_core::{CumulativeStateRecord, ListingObservation, PriceState, PropertyState};

use crate::error::{EngineError, Result};

/// Classifies one entity for `run_date` and builds its next cumulative
/// record.
///
/// # Errors
///
/// Returns [`EngineError::ContradictoryInput`] when both `previous` and
/// `current` are absent.
pub fn classify(
    property_id: &str,
    previous: Option<&CumulativeStateRecord>,
    current: Option<&ListingObservation>,
    run_date: NaiveDate,
) -> Result<CumulativeStateRecord> {
    match (previous, current) {
        (None, None) => Err(EngineError::ContradictoryInput {
            property_id: property_id.to_string(),
            date: run_date,
        }),
        (None, Some(obs)) => Ok(CumulativeStateRecord {
            property_id: property_id.to_string(),
            first_listed_date: run_date,
            last_active_date: run_date,
            date: run_date,
            price: obs.price,
            days_on_market: 0,
            property_state: PropertyState::New,
            price_state: PriceState::New,
        }),
        (Some(prev), current) => Ok(advance_record(property_id, prev, current, run_date)),
    }
}

fn advance_record(
    property_id: &str,
    prev: &CumulativeStateRecord,
    current: Option<&ListingObservation>,
    run_date: NaiveDate,
) -> CumulativeStateRecord {
    let present = current.is_some();

    let property_state = next_property_state(prev.property_state, present);
    let price_state = next_price_state(prev, current);

    // The effective date is today when the listing appears; when absent,
    // the record still ages by one day past the previous record.
    let effective_date = if present {
        run_date
    } else {
        prev.date.succ_opt().unwrap_or(run_date)
    };
    let days_on_market = (effective_date - prev.first_listed_date).num_days().max(0);

    CumulativeStateRecord {
        property_id: property_id.to_string(),
        // first_listed_date is carried forward once set, never overwritten.
        first_listed_date: prev.first_listed_date,
        last_active_date: if present {
            run_date
        } else {
            prev.last_active_date
        },
        date: run_date,
        price: current.and_then(|obs| obs.price).or(prev.price),
        days_on_market,
        property_state,
        price_state,
    }
}

/// Lifecycle transition, first match wins.
fn next_property_state(previous: PropertyState, present: bool) -> PropertyState {
    use PropertyState::{Churned, Inactive, Resurrected, Retained, Unknown};

    if previous.is_active() {
        return if present { Retained } else { Churned };
    }
    if previous.is_dormant() {
        if present {
            return Resurrected;
        }
        return match previous {
            Churned => Inactive,
            _ => previous, // Inactive stays Inactive
        };
    }
    // Unknown: a presence means the feed picked the listing back up;
    // absence carries the state forward.
    if present { Resurrected } else { Unknown }
}

/// Price transition, first match wins: delta comparisons, then the
/// resurrection fallback, then Unknown.
fn next_price_state(prev: &CumulativeStateRecord, current: Option<&ListingObservation>) -> PriceState {
    let Some(obs) = current else {
        return PriceState::Unknown;
    };

    match (obs.price, prev.price) {
        (Some(today), Some(yesterday)) if today > yesterday => PriceState::PriceIncreased,
        (Some(today), Some(yesterday)) if today < yesterday => PriceState::PriceDecreased,
        (Some(_), Some(_)) => PriceState::PriceUnchanged,
        _ if prev.property_state.is_dormant() => PriceState::Resurrected,
        _ => PriceState::Unknown,
    }
}
