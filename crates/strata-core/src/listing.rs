//! Listing feed model: segments and daily observations.
//!
//! An observation is one (property, as-of date) snapshot row from the
//! staging boundary. Observations are immutable once ingested; a daily
//! batch may omit a property entirely or repeat it with unchanged or
//! changed attributes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::key::{self, KeyPart, SurrogateKey};
use crate::money::Money;

/// The feed variant a listing belongs to.
///
/// Rent and sale listings flow through identical logic but land in
/// disjoint output tables, so segment runs never share a merge target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    /// Long-term rental listings.
    Rent,
    /// For-sale listings.
    Sale,
}

impl Segment {
    /// The feed-facing status label, used in surrogate key derivation.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rent => "For Rent",
            Self::Sale => "For Sale",
        }
    }

    /// Name of the cumulative state table for this segment.
    #[must_use]
    pub const fn cumulative_table(self) -> &'static str {
        match self {
            Self::Rent => "cumulative_rent_listing",
            Self::Sale => "cumulative_sale_listing",
        }
    }

    /// Name of the versioned property dimension table for this segment.
    #[must_use]
    pub const fn dimension_table(self) -> &'static str {
        match self {
            Self::Rent => "dim_rent_property",
            Self::Sale => "dim_sale_property",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rent => "rent",
            Self::Sale => "sale",
        })
    }
}

impl FromStr for Segment {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rent" => Ok(Self::Rent),
            "sale" => Ok(Self::Sale),
            other => Err(crate::error::Error::InvalidInput(format!(
                "unknown segment '{other}' (expected 'rent' or 'sale')"
            ))),
        }
    }
}

/// One daily snapshot row for a single property.
///
/// Field names follow the feed's camelCase JSON convention. Every field
/// except the natural key and the load date may be null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingObservation {
    /// Natural key of the property (required).
    #[serde(alias = "id")]
    pub property_id: String,
    /// Full formatted street address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    /// First address line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    /// Second address line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    /// City name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Two-letter state code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// ZIP code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    /// County name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    /// Latitude in decimal degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Property type (e.g. "Single Family", "Condo").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    /// Bedroom count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<i64>,
    /// Bathroom count (halves allowed by the feed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<f64>,
    /// Interior square footage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub square_footage: Option<i64>,
    /// Lot size in square feet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<i64>,
    /// Year the structure was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i64>,
    /// Listing status as reported by the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Asking price (rent or sale, per segment).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    /// Listing type (e.g. "Standard", "New Construction").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_type: Option<String>,
    /// When the listing was first listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listed_date: Option<DateTime<Utc>>,
    /// When the listing was removed, if it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_date: Option<DateTime<Utc>>,
    /// When the feed first created this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
    /// When the feed last saw this listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_date: Option<DateTime<Utc>>,
    /// Days on market as reported by the feed (recomputed downstream).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_on_market: Option<i64>,
    /// MLS board name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mls_name: Option<String>,
    /// MLS listing number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mls_number: Option<String>,
    /// Snapshot date this row belongs to (required; stamped by staging).
    pub load_date: NaiveDate,
}

impl ListingObservation {
    /// Entity-grain surrogate key: stable per (property, segment).
    ///
    /// Used as the dimension merge identity.
    #[must_use]
    pub fn property_sk(&self, segment: Segment) -> SurrogateKey {
        key::derive([
            KeyPart::Text(Some(&self.property_id)),
            KeyPart::Text(Some(segment.label())),
        ])
    }

    /// Fact-grain surrogate key: unique per (property, segment, snapshot date).
    #[must_use]
    pub fn listing_sk(&self, segment: Segment) -> SurrogateKey {
        key::derive([
            KeyPart::Text(Some(&self.property_id)),
            KeyPart::Text(Some(segment.label())),
            KeyPart::Date(Some(self.load_date)),
        ])
    }
}
