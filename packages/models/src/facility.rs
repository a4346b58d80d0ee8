//! Hospital and shelter records with live capacity state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::Location;

/// Identifier of a facility, owned by facility-operator tooling.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(pub String);

impl FacilityId {
    /// Creates a facility id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for FacilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of facility this is.
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
pub enum FacilityKind {
    /// Medical facility with ICU resources.
    Hospital,
    /// Evacuation shelter.
    Shelter,
}

/// Trackable resource types within a facility.
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
pub enum ResourceKind {
    /// Intensive-care beds.
    IcuBeds,
    /// Mechanical ventilators.
    Ventilators,
    /// Oxygen-supported beds.
    OxygenBeds,
}

impl ResourceKind {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::IcuBeds, Self::Ventilators, Self::OxygenBeds]
    }
}

/// Used/total counts for one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLevels {
    /// Units currently in use.
    pub used: u32,
    /// Units installed.
    pub total: u32,
}

impl ResourceLevels {
    /// Creates a level record, clamping `used` to `total`.
    #[must_use]
    pub const fn new(used: u32, total: u32) -> Self {
        let used = if used > total { total } else { used };
        Self { used, total }
    }

    /// Utilization ratio in [0, 1]. A zero-capacity resource reads as
    /// fully utilized.
    #[must_use]
    pub fn ratio(self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        f64::from(self.used) / f64::from(self.total)
    }

    /// Units still free.
    #[must_use]
    pub const fn free(self) -> u32 {
        self.total - self.used
    }
}

/// Operational status of a facility, driven solely by operator capacity
/// reports (no internal timer ever flips this).
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
pub enum FacilityStatus {
    /// Normal operation.
    Accepting,
    /// At least one resource above the limited threshold.
    Limited,
    /// At least one resource exhausted.
    Full,
    /// Explicitly closed by the operator; ratio triggers are ignored
    /// until an explicit reopen.
    Closed,
}

/// A hospital or shelter with its live capacity state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facility {
    /// External facility id.
    pub id: FacilityId,
    /// Human-readable name.
    pub name: String,
    /// Hospital or shelter.
    pub kind: FacilityKind,
    /// Facility location.
    pub location: Location,
    /// Per-resource used/total counts.
    pub resources: BTreeMap<ResourceKind, ResourceLevels>,
    /// Current operational status.
    pub status: FacilityStatus,
    /// When the last operator report was applied.
    pub last_updated: DateTime<Utc>,
}

impl Facility {
    /// Overall free-capacity ratio across tracked resources, used as a
    /// routing tie-breaker. `None` when no resources are tracked.
    #[must_use]
    pub fn free_ratio(&self) -> Option<f64> {
        if self.resources.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = self
            .resources
            .values()
            .map(|r| 1.0 - r.ratio())
            .sum::<f64>()
            / self.resources.len() as f64;
        Some(avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_clamp_used_to_total() {
        let levels = ResourceLevels::new(12, 10);
        assert_eq!(levels.used, 10);
        assert_eq!(levels.free(), 0);
    }

    #[test]
    fn zero_capacity_reads_full() {
        let levels = ResourceLevels::new(0, 0);
        assert!((levels.ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn free_ratio_averages_resources() {
        let mut resources = BTreeMap::new();
        resources.insert(ResourceKind::IcuBeds, ResourceLevels::new(5, 10));
        resources.insert(ResourceKind::Ventilators, ResourceLevels::new(0, 10));
        let facility = Facility {
            id: FacilityId::new("f1"),
            name: "Test".into(),
            kind: FacilityKind::Hospital,
            location: Location::new(0.0, 0.0),
            resources,
            status: FacilityStatus::Accepting,
            last_updated: Utc::now(),
        };
        let ratio = facility.free_ratio().unwrap();
        assert!((ratio - 0.75).abs() < 1e-9);
    }
}
