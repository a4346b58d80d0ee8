#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Canonical data model for the hazard-watch engine.
//!
//! This crate defines the shared vocabulary used across the entire engine:
//! the hazard taxonomy, severity bands, the `GeoCell` spatial partition,
//! normalized observations, decaying risk events, subscriber projections,
//! facility capacity records, and alert records. All other packages depend
//! on these types; none of them carries behavior beyond validation and
//! simple derivation.

mod alert;
mod facility;
mod geo;
mod observation;
mod risk;
mod subscriber;

pub use alert::{Alert, AlertChannel, AlertKey, DeliveryState};
pub use facility::{
    Facility, FacilityId, FacilityKind, FacilityStatus, ResourceKind, ResourceLevels,
};
pub use geo::{GeoCell, InvalidLocation, Location};
pub use observation::{HazardObservation, SourceId};
pub use risk::{RiskEvent, RiskEventId};
pub use subscriber::{Subscriber, SubscriberId};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The hazard types the engine understands.
///
/// Every feed normalizes its records into exactly one of these kinds; risk
/// accumulation, subscriber filtering, and scoring calibration are all keyed
/// by it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HazardKind {
    /// River or surface flooding.
    Flood,
    /// Tropical cyclone / severe wind event.
    Cyclone,
    /// Earthquake activity.
    Seismic,
    /// Extreme rainfall (flash-flood precursor).
    Rainfall,
    /// Slope failure / landslide.
    Landslide,
}

impl HazardKind {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Flood,
            Self::Cyclone,
            Self::Seismic,
            Self::Rainfall,
            Self::Landslide,
        ]
    }
}

/// Severity band for an active risk event, derived from the continuous
/// score via configured thresholds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Score below the medium threshold.
    Low = 1,
    /// Score at or above the medium threshold.
    Medium = 2,
    /// Score at or above the high threshold.
    High = 3,
}

impl Severity {
    /// Returns the numeric value of this severity band.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Creates a severity band from a numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 1-3.
    pub const fn from_value(value: u8) -> Result<Self, InvalidSeverityError> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            _ => Err(InvalidSeverityError { value }),
        }
    }
}

/// Error returned when attempting to create a [`Severity`] from an invalid
/// numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid severity value {value}: expected 1-3")]
pub struct InvalidSeverityError {
    /// The invalid severity value that was provided.
    pub value: u8,
}
