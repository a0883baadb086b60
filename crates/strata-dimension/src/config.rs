//! Tracked attribute configuration.
//!
//! A dimension version boundary is emitted when any *tracked* attribute
//! changes. The tracked set is configuration: untracked fields (prices,
//! feed timestamps, MLS metadata) change daily and must not fragment the
//! version history.

use std::collections::BTreeMap;

use strata_core::ListingObservation;
use strata_core::key::NULL_SENTINEL;

/// A listing attribute the dimension tracks for change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrackedField {
    /// Full formatted street address.
    FormattedAddress,
    /// Bedroom count.
    Bedrooms,
    /// Bathroom count.
    Bathrooms,
    /// Interior square footage.
    SquareFootage,
    /// Lot size in square feet.
    LotSize,
    /// Year the structure was built.
    YearBuilt,
    /// Property type.
    PropertyType,
}

impl TrackedField {
    /// Column name used in the persisted attribute map.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FormattedAddress => "formattedAddress",
            Self::Bedrooms => "bedrooms",
            Self::Bathrooms => "bathrooms",
            Self::SquareFootage => "squareFootage",
            Self::LotSize => "lotSize",
            Self::YearBuilt => "yearBuilt",
            Self::PropertyType => "propertyType",
        }
    }

    /// Canonical string value of this field on an observation.
    ///
    /// Nulls map to the key sentinel so a null is never confused with an
    /// empty string and comparison stays total.
    #[must_use]
    pub fn canonical_value(self, obs: &ListingObservation) -> String {
        let value = match self {
            Self::FormattedAddress => obs.formatted_address.clone(),
            Self::Bedrooms => obs.bedrooms.map(|n| n.to_string()),
            Self::Bathrooms => obs.bathrooms.map(|n| n.to_string()),
            Self::SquareFootage => obs.square_footage.map(|n| n.to_string()),
            Self::LotSize => obs.lot_size.map(|n| n.to_string()),
            Self::YearBuilt => obs.year_built.map(|n| n.to_string()),
            Self::PropertyType => obs.property_type.clone(),
        };
        value.unwrap_or_else(|| NULL_SENTINEL.to_string())
    }
}

/// The set of attributes that participate in change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionConfig {
    /// Tracked fields, in a fixed order.
    pub tracked: Vec<TrackedField>,
}

impl Default for DimensionConfig {
    fn default() -> Self {
        Self {
            tracked: vec![
                TrackedField::FormattedAddress,
                TrackedField::Bedrooms,
                TrackedField::Bathrooms,
                TrackedField::SquareFootage,
                TrackedField::LotSize,
                TrackedField::YearBuilt,
                TrackedField::PropertyType,
            ],
        }
    }
}

impl DimensionConfig {
    /// Extracts the tracked attribute snapshot of an observation.
    #[must_use]
    pub fn snapshot(&self, obs: &ListingObservation) -> BTreeMap<String, String> {
        self.tracked
            .iter()
            .map(|field| (field.name().to_string(), field.canonical_value(obs)))
            .collect()
    }
}
