//! Single-pass SCD2 interval derivation.
//!
//! `advance` consumes an entity's new observations in date order, carrying
//! only the previous tracked snapshot, and emits the version boundary
//! changes: the closed prior version (if any) plus the inserted versions.
//! No deeper history is consulted — the persisted current version is the
//! only state needed between runs.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use strata_core::{ListingObservation, Segment};

use crate::config::DimensionConfig;
use crate::error::{DimensionError, Result};
use crate::types::DimensionVersion;

/// The atomic unit of dimension change for one entity.
///
/// Closing the previous current version and inserting its successors must
/// be committed together; the merge writer applies all rows in one
/// manifest swap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionDelta {
    /// The prior current version, now closed (`valid_to` set,
    /// `is_current` false). `None` when the prior version survives
    /// unchanged or never existed.
    pub close: Option<DimensionVersion>,
    /// New versions to insert, oldest first. The last one is current.
    pub insert: Vec<DimensionVersion>,
}

impl VersionDelta {
    /// Whether the entity's dimension state is unchanged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.close.is_none() && self.insert.is_empty()
    }

    /// All rows to merge, close first.
    pub fn rows(&self) -> impl Iterator<Item = &DimensionVersion> {
        self.close.iter().chain(self.insert.iter())
    }
}

/// SCD2 version tracker for one segment's property dimension.
#[derive(Debug, Clone)]
pub struct VersionTracker {
    config: DimensionConfig,
    segment: Segment,
}

impl VersionTracker {
    /// Creates a tracker for `segment` with the given tracked-attribute
    /// configuration.
    #[must_use]
    pub fn new(config: DimensionConfig, segment: Segment) -> Self {
        Self { config, segment }
    }

    /// Creates a tracker with the default tracked attributes.
    #[must_use]
    pub fn with_defaults(segment: Segment) -> Self {
        Self::new(DimensionConfig::default(), segment)
    }

    /// Advances one entity's version chain over new observations.
    ///
    /// `prior_current` is the entity's persisted current version (if any);
    /// `observations` are the entity's new snapshot rows in batch order.
    /// Observations sharing a date are collapsed deterministically:
    /// last-in-batch wins.
    ///
    /// # Errors
    ///
    /// - [`DimensionError::OutOfOrderObservation`] if an observation
    ///   predates the prior current version
    /// - [`DimensionError::PartitionViolation`] if the resulting chain
    ///   would violate the partition invariant (this halts the run; it is
    ///   never committed)
    pub fn advance(
        &self,
        prior_current: Option<&DimensionVersion>,
        observations: &[ListingObservation],
    ) -> Result<VersionDelta> {
        // Collapse same-date duplicates: later batch entries replace
        // earlier ones, and the BTreeMap yields dates in order.
        let mut by_date: BTreeMap<NaiveDate, &ListingObservation> = BTreeMap::new();
        for obs in observations {
            by_date.insert(obs.load_date, obs);
        }

        if let (Some(prior), Some((first_date, first_obs))) =
            (prior_current, by_date.iter().next())
        {
            if *first_date < prior.valid_from {
                return Err(DimensionError::OutOfOrderObservation {
                    property_id: first_obs.property_id.clone(),
                    observed: *first_date,
                    current_valid_from: prior.valid_from,
                });
            }
        }

        let mut chain: Vec<DimensionVersion> = prior_current.cloned().into_iter().collect();

        for (date, obs) in by_date {
            let snapshot = self.config.snapshot(obs);
            enum Step {
                Open,
                Replace,
                CloseAndOpen,
                Unchanged,
            }
            let step = match chain.last() {
                None => Step::Open,
                Some(last) if last.attributes == snapshot => Step::Unchanged,
                // Same-date conflicting attributes: the later observation
                // replaces the version in place rather than opening a
                // zero-length interval.
                Some(last) if last.valid_from == date => Step::Replace,
                Some(_) => Step::CloseAndOpen,
            };
            match step {
                Step::Unchanged => {}
                Step::Open => chain.push(self.open_version(obs, date, snapshot)),
                Step::Replace => {
                    if let Some(last) = chain.last_mut() {
                        *last = self.open_version(obs, date, snapshot);
                    }
                }
                Step::CloseAndOpen => {
                    if let Some(last) = chain.last_mut() {
                        last.valid_to = Some(date);
                        last.is_current = false;
                    }
                    chain.push(self.open_version(obs, date, snapshot));
                }
            }
        }

        validate_partition(&chain)?;

        let mut delta = VersionDelta::default();
        let mut chain = chain.into_iter();
        if let Some(first) = chain.next() {
            match prior_current {
                Some(prior) if first == *prior => {}
                Some(prior) if first.valid_from == prior.valid_from && first.valid_to.is_none() => {
                    // Replaced in place; the merge key is unchanged so the
                    // insert supersedes the prior row.
                    delta.insert.push(first);
                }
                Some(_) => delta.close = Some(first),
                None => delta.insert.push(first),
            }
        }
        delta.insert.extend(chain);

        Ok(delta)
    }

    fn open_version(
        &self,
        obs: &ListingObservation,
        valid_from: NaiveDate,
        attributes: BTreeMap<String, String>,
    ) -> DimensionVersion {
        DimensionVersion {
            surrogate_key: obs.property_sk(self.segment),
            property_id: obs.property_id.clone(),
            attributes,
            valid_from,
            valid_to: None,
            is_current: true,
        }
    }
}

/// Validates the partition invariant over one entity's version chain.
///
/// The chain must be ordered by `valid_from`, each version's `valid_to`
/// must equal its successor's `valid_from`, intervals must be non-empty,
/// and exactly the last version may be current with an open interval.
///
/// # Errors
///
/// Returns [`DimensionError::PartitionViolation`] naming the entity and
/// the violated condition.
pub fn validate_partition(versions: &[DimensionVersion]) -> Result<()> {
    let Some(last) = versions.last() else {
        return Ok(());
    };
    let entity = last.property_id.as_str();

    for pair in versions.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.valid_from >= b.valid_from {
            return Err(DimensionError::partition(
                entity,
                format!("versions out of order at {} >= {}", a.valid_from, b.valid_from),
            ));
        }
        match a.valid_to {
            None => {
                return Err(DimensionError::partition(
                    entity,
                    format!("open interval at {} is not the last version", a.valid_from),
                ));
            }
            Some(to) if to != b.valid_from => {
                return Err(DimensionError::partition(
                    entity,
                    format!(
                        "interval ending {} does not meet successor starting {} (gap or overlap)",
                        to, b.valid_from
                    ),
                ));
            }
            Some(_) => {}
        }
        if a.is_current {
            return Err(DimensionError::partition(
                entity,
                format!("closed version at {} still marked current", a.valid_from),
            ));
        }
    }

    if !last.is_current || last.valid_to.is_some() {
        return Err(DimensionError::partition(
            entity,
            "last version must be current with an open interval",
        ));
    }

    Ok(())
}
