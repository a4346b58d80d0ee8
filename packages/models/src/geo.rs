//! Geographic primitives: locations and the `GeoCell` spatial partition.
//!
//! A [`GeoCell`] wraps an H3 cell index at a fixed resolution. Every
//! coordinate maps to exactly one cell per resolution, and cell adjacency
//! (`grid_disk`) gives the engine a well-defined neighbor expansion for
//! distance-banded queries.

use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Mean Earth radius in kilometers, used for haversine distances.
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A geographic coordinate in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Latitude in degrees, south negative.
    pub lat: f64,
    /// Longitude in degrees, west negative.
    pub lng: f64,
}

impl Location {
    /// Creates a location from latitude/longitude degrees.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle (haversine) distance to another location, in km.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Error returned when a coordinate cannot be mapped to a cell.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("invalid coordinate ({lat}, {lng})")]
pub struct InvalidLocation {
    /// The rejected latitude.
    pub lat: f64,
    /// The rejected longitude.
    pub lng: f64,
}

/// A fixed-resolution spatial partition — one tile of the hierarchical H3
/// grid. Used as the unit of indexing for observations, subscribers,
/// facilities, and risk state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeoCell(CellIndex);

impl GeoCell {
    /// Returns the cell containing `location` at `resolution`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLocation`] if the coordinate is outside the valid
    /// latitude/longitude range.
    pub fn containing(location: Location, resolution: Resolution) -> Result<Self, InvalidLocation> {
        let coord = LatLng::new(location.lat, location.lng).map_err(|_| InvalidLocation {
            lat: location.lat,
            lng: location.lng,
        })?;
        Ok(Self(coord.to_cell(resolution)))
    }

    /// The center coordinate of this cell.
    #[must_use]
    pub fn center(self) -> Location {
        let coord = LatLng::from(self.0);
        Location::new(coord.lat(), coord.lng())
    }

    /// The resolution this cell was indexed at.
    #[must_use]
    pub fn resolution(self) -> Resolution {
        self.0.resolution()
    }

    /// The cells within `rings` grid steps of this cell, including itself.
    #[must_use]
    pub fn disk(self, rings: u32) -> Vec<Self> {
        self.0.grid_disk::<Vec<_>>(rings).into_iter().map(Self).collect()
    }

    /// The directly adjacent cells (one grid step), excluding this cell.
    #[must_use]
    pub fn neighbors(self) -> Vec<Self> {
        self.disk(1).into_iter().filter(|c| *c != self).collect()
    }

    /// The coarser parent cell at `resolution`, used for index sharding.
    /// Returns `self` if `resolution` is not coarser than this cell's.
    #[must_use]
    pub fn parent(self, resolution: Resolution) -> Self {
        self.0.parent(resolution).map_or(self, Self)
    }

    /// Approximate center-to-center distance to an adjacent cell, in km.
    ///
    /// Drives the radius-to-ring-count conversion for distance-banded
    /// neighbor expansion. Cell pitch varies slightly across the globe, so
    /// this is measured from the cell's own neighborhood rather than taken
    /// from a global constant.
    #[must_use]
    pub fn pitch_km(self) -> f64 {
        let center = self.center();
        self.neighbors()
            .first()
            .map_or(1.0, |n| center.distance_km(&n.center()))
    }

    /// Number of grid rings needed so that a disk around this cell covers
    /// `radius_km` in every direction.
    #[must_use]
    pub fn rings_for_radius(self, radius_km: f64) -> u32 {
        let pitch = self.pitch_km();
        if pitch <= f64::EPSILON || radius_km <= 0.0 {
            return 0;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rings = (radius_km / pitch).ceil() as u32;
        rings
    }

    /// The raw H3 index value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        u64::from(self.0)
    }

    /// Reconstructs a cell from a raw H3 index value.
    ///
    /// # Errors
    ///
    /// Returns the original value if it is not a valid H3 cell index.
    pub fn from_u64(raw: u64) -> Result<Self, u64> {
        CellIndex::try_from(raw).map(Self).map_err(|_| raw)
    }
}

impl From<CellIndex> for GeoCell {
    fn from(cell: CellIndex) -> Self {
        Self(cell)
    }
}

impl std::fmt::Display for GeoCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for GeoCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.as_u64())
    }
}

impl<'de> Deserialize<'de> for GeoCell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u64::deserialize(deserializer)?;
        Self::from_u64(raw)
            .map_err(|v| serde::de::Error::custom(format!("invalid H3 cell index {v:#x}")))
    }
}
