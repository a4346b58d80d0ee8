#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Live hospital/shelter capacity tracking.
//!
//! Each facility is a small state machine (accepting → limited → full,
//! plus an operator-latched closed state) driven solely by validated
//! capacity reports from the facility's operator — the engine never
//! infers capacity and no internal timer ever flips a state. Queries
//! expose a staleness confidence flag instead of erroring when a
//! facility has not reported recently.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use hazard_watch_index::SpatialIndex;
use hazard_watch_models::{
    Facility, FacilityId, FacilityStatus, Location, ResourceKind, ResourceLevels,
};
use serde::{Deserialize, Serialize};

/// Errors raised by capacity operations.
#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    /// The facility id has never been registered.
    #[error("unknown facility {id}")]
    UnknownFacility {
        /// The unrecognized id.
        id: FacilityId,
    },
}

/// Ratio thresholds that drive status transitions, per configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapacityThresholds {
    /// A resource at or above this used/total ratio marks the facility
    /// `limited`.
    pub limited_ratio: f64,
    /// A resource at or above this used/total ratio marks the facility
    /// `full`.
    pub full_ratio: f64,
}

impl Default for CapacityThresholds {
    fn default() -> Self {
        Self {
            limited_ratio: 0.8,
            full_ratio: 1.0,
        }
    }
}

/// One entry in an operator capacity report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ResourceDelta {
    /// Set absolute used/total counts for a resource.
    Set {
        /// Which resource the report covers.
        resource: ResourceKind,
        /// Units in use.
        used: u32,
        /// Units installed.
        total: u32,
    },
    /// Adjust the used count by a signed delta (admissions/discharges).
    Adjust {
        /// Which resource the report covers.
        resource: ResourceKind,
        /// Signed change to the used count.
        used_delta: i32,
    },
    /// Operator closes the facility; ratio triggers are ignored until
    /// an explicit `Reopen`.
    Close,
    /// Operator reopens a closed facility; status is re-derived from
    /// current ratios.
    Reopen,
}

/// A point-in-time view of a facility plus a capacity-confidence flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacitySnapshot {
    /// The facility record.
    pub facility: Facility,
    /// `true` when the last operator report is older than the freshness
    /// bound. A confidence signal, never an error.
    pub stale: bool,
}

/// A facility returned by [`CapacityTracker::nearest_available`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableFacility {
    /// The facility record.
    pub facility: Facility,
    /// Great-circle distance from the query origin, in km.
    pub distance_km: f64,
}

/// Configuration for a [`CapacityTracker`].
#[derive(Debug, Clone)]
pub struct CapacityConfig {
    /// Status transition thresholds.
    pub thresholds: CapacityThresholds,
    /// Reports older than this mark queries stale.
    pub freshness_bound: Duration,
    /// Search radius for `nearest_available`, in km.
    pub search_radius_km: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            thresholds: CapacityThresholds::default(),
            freshness_bound: Duration::hours(2),
            search_radius_km: 50.0,
        }
    }
}

/// Tracks capacity state for all registered facilities.
///
/// Transitions for a single facility are serialized behind a per-facility
/// mutex, so concurrent operator reports cannot lose updates. The spatial
/// index is refreshed under the same lock, so registry and index always
/// agree on the order reports were applied in.
pub struct CapacityTracker {
    config: CapacityConfig,
    facilities: RwLock<HashMap<FacilityId, Arc<Mutex<Facility>>>>,
    index: SpatialIndex<Facility>,
}

impl CapacityTracker {
    /// Creates a tracker with the given configuration; the spatial index
    /// shards at `shard_resolution`.
    #[must_use]
    pub fn new(config: CapacityConfig, shard_resolution: h3o::Resolution) -> Self {
        Self {
            config,
            facilities: RwLock::new(HashMap::new()),
            index: SpatialIndex::new(shard_resolution),
        }
    }

    /// Registers (or re-registers) a facility.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn register(&self, facility: Facility) {
        // The registry write lock covers the index write too; reports
        // cannot interleave until both are in place.
        let mut facilities = self.facilities.write().expect("facility registry poisoned");
        self.index.upsert(facility.clone());
        facilities.insert(facility.id.clone(), Arc::new(Mutex::new(facility)));
    }

    fn entry(&self, id: &FacilityId) -> Result<Arc<Mutex<Facility>>, CapacityError> {
        let facilities = self.facilities.read().expect("facility registry poisoned");
        facilities
            .get(id)
            .cloned()
            .ok_or_else(|| CapacityError::UnknownFacility { id: id.clone() })
    }

    /// Applies an operator capacity report and returns the new status.
    ///
    /// The whole report applies under one per-facility lock, including
    /// the spatial index refresh, so a report is never interleaved with
    /// another for the same facility and the index copy never trails a
    /// later report.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::UnknownFacility`] if the facility was
    /// never registered.
    ///
    /// # Panics
    ///
    /// Panics if the per-facility lock is poisoned.
    pub fn update(
        &self,
        id: &FacilityId,
        deltas: &[ResourceDelta],
    ) -> Result<FacilityStatus, CapacityError> {
        let entry = self.entry(id)?;
        let mut facility = entry.lock().expect("facility lock poisoned");
        apply_deltas(&mut facility, deltas, self.config.thresholds, Utc::now());
        let status = facility.status;
        self.index.upsert(facility.clone());
        drop(facility);

        log::debug!("Facility {id} now {status}");
        Ok(status)
    }

    /// A point-in-time snapshot of a facility with its staleness flag.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::UnknownFacility`] if the facility was
    /// never registered.
    ///
    /// # Panics
    ///
    /// Panics if the per-facility lock is poisoned.
    pub fn snapshot(&self, id: &FacilityId) -> Result<CapacitySnapshot, CapacityError> {
        let entry = self.entry(id)?;
        let facility = entry.lock().expect("facility lock poisoned").clone();
        let stale = is_stale(&facility, self.config.freshness_bound, Utc::now());
        Ok(CapacitySnapshot { facility, stale })
    }

    /// Facilities able to take `need` right now, ordered by distance.
    ///
    /// Excludes `full`, `closed`, and stale facilities, and (when a
    /// resource need is given) facilities without free units of that
    /// resource.
    #[must_use]
    pub fn nearest_available(
        &self,
        origin: Location,
        need: Option<ResourceKind>,
    ) -> Vec<AvailableFacility> {
        let now = Utc::now();
        self.index
            .query_radius(origin, self.config.search_radius_km)
            .into_iter()
            .filter(|(facility, _)| {
                !matches!(facility.status, FacilityStatus::Full | FacilityStatus::Closed)
                    && !is_stale(facility, self.config.freshness_bound, now)
                    && need.is_none_or(|resource| {
                        facility.resources.get(&resource).is_some_and(|r| r.free() > 0)
                    })
            })
            .map(|(facility, distance_km)| AvailableFacility {
                facility,
                distance_km,
            })
            .collect()
    }

    /// All registered facility snapshots (for the query API).
    ///
    /// # Panics
    ///
    /// Panics if a lock is poisoned.
    #[must_use]
    pub fn all(&self) -> Vec<CapacitySnapshot> {
        let now = Utc::now();
        let facilities = self.facilities.read().expect("facility registry poisoned");
        facilities
            .values()
            .map(|entry| {
                let facility = entry.lock().expect("facility lock poisoned").clone();
                let stale = is_stale(&facility, self.config.freshness_bound, now);
                CapacitySnapshot { facility, stale }
            })
            .collect()
    }
}

fn is_stale(facility: &Facility, bound: Duration, now: DateTime<Utc>) -> bool {
    now - facility.last_updated > bound
}

/// Applies a report in place: resource changes first, then the status
/// derivation, then the freshness stamp.
fn apply_deltas(
    facility: &mut Facility,
    deltas: &[ResourceDelta],
    thresholds: CapacityThresholds,
    now: DateTime<Utc>,
) {
    let mut reopened = false;
    let mut closed = false;

    for delta in deltas {
        match delta {
            ResourceDelta::Set { resource, used, total } => {
                facility
                    .resources
                    .insert(*resource, ResourceLevels::new(*used, *total));
            }
            ResourceDelta::Adjust { resource, used_delta } => {
                let levels = facility
                    .resources
                    .entry(*resource)
                    .or_insert(ResourceLevels { used: 0, total: 0 });
                let used = i64::from(levels.used) + i64::from(*used_delta);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let used = used.clamp(0, i64::from(levels.total)) as u32;
                *levels = ResourceLevels::new(used, levels.total);
            }
            ResourceDelta::Close => closed = true,
            ResourceDelta::Reopen => reopened = true,
        }
    }

    facility.status = next_status(
        facility.status,
        &facility.resources,
        thresholds,
        closed,
        reopened,
    );
    facility.last_updated = now;
}

/// Status derivation. `closed` latches: ratio triggers are ignored until
/// an explicit reopen.
fn next_status(
    current: FacilityStatus,
    resources: &BTreeMap<ResourceKind, ResourceLevels>,
    thresholds: CapacityThresholds,
    close: bool,
    reopen: bool,
) -> FacilityStatus {
    if close {
        return FacilityStatus::Closed;
    }
    if current == FacilityStatus::Closed && !reopen {
        return FacilityStatus::Closed;
    }

    let worst = resources
        .values()
        .map(|levels| levels.ratio())
        .fold(0.0_f64, f64::max);

    if worst >= thresholds.full_ratio {
        FacilityStatus::Full
    } else if worst >= thresholds.limited_ratio {
        FacilityStatus::Limited
    } else {
        FacilityStatus::Accepting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h3o::Resolution;
    use hazard_watch_models::FacilityKind;

    fn facility(id: &str, lat: f64, lng: f64, used: u32, total: u32) -> Facility {
        let mut resources = BTreeMap::new();
        resources.insert(ResourceKind::IcuBeds, ResourceLevels::new(used, total));
        Facility {
            id: FacilityId::new(id),
            name: id.to_uppercase(),
            kind: FacilityKind::Hospital,
            location: Location::new(lat, lng),
            resources,
            status: FacilityStatus::Accepting,
            last_updated: Utc::now(),
        }
    }

    fn tracker() -> CapacityTracker {
        CapacityTracker::new(CapacityConfig::default(), Resolution::Four)
    }

    #[test]
    fn ratio_thresholds_drive_status() {
        let tracker = tracker();
        tracker.register(facility("f1", 19.08, 72.88, 5, 10));
        let id = FacilityId::new("f1");

        // used 9/10 crosses the limited threshold.
        let status = tracker
            .update(&id, &[ResourceDelta::Set { resource: ResourceKind::IcuBeds, used: 9, total: 10 }])
            .unwrap();
        assert_eq!(status, FacilityStatus::Limited);

        // used 10/10 is full.
        let status = tracker
            .update(&id, &[ResourceDelta::Adjust { resource: ResourceKind::IcuBeds, used_delta: 1 }])
            .unwrap();
        assert_eq!(status, FacilityStatus::Full);

        // Discharges bring it back to accepting.
        let status = tracker
            .update(&id, &[ResourceDelta::Adjust { resource: ResourceKind::IcuBeds, used_delta: -4 }])
            .unwrap();
        assert_eq!(status, FacilityStatus::Accepting);
    }

    #[test]
    fn closed_latches_until_reopen() {
        let tracker = tracker();
        tracker.register(facility("f1", 19.08, 72.88, 1, 10));
        let id = FacilityId::new("f1");

        let status = tracker.update(&id, &[ResourceDelta::Close]).unwrap();
        assert_eq!(status, FacilityStatus::Closed);

        // Ratio-only reports don't reopen a closed facility.
        let status = tracker
            .update(&id, &[ResourceDelta::Set { resource: ResourceKind::IcuBeds, used: 0, total: 10 }])
            .unwrap();
        assert_eq!(status, FacilityStatus::Closed);

        let status = tracker.update(&id, &[ResourceDelta::Reopen]).unwrap();
        assert_eq!(status, FacilityStatus::Accepting);
    }

    #[test]
    fn nearest_available_excludes_full_and_closed() {
        let tracker = tracker();
        tracker.register(facility("open", 19.08, 72.88, 2, 10));
        tracker.register(facility("full", 19.09, 72.89, 10, 10));
        tracker.register(facility("closed", 19.07, 72.87, 0, 10));
        tracker
            .update(&FacilityId::new("full"), &[ResourceDelta::Set {
                resource: ResourceKind::IcuBeds,
                used: 10,
                total: 10,
            }])
            .unwrap();
        tracker
            .update(&FacilityId::new("closed"), &[ResourceDelta::Close])
            .unwrap();

        let available =
            tracker.nearest_available(Location::new(19.08, 72.88), Some(ResourceKind::IcuBeds));
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].facility.id, FacilityId::new("open"));
    }

    #[test]
    fn full_facility_returns_after_capacity_frees() {
        let tracker = tracker();
        tracker.register(facility("f1", 19.08, 72.88, 10, 10));
        let id = FacilityId::new("f1");
        tracker
            .update(&id, &[ResourceDelta::Set { resource: ResourceKind::IcuBeds, used: 10, total: 10 }])
            .unwrap();

        let origin = Location::new(19.08, 72.88);
        assert!(tracker.nearest_available(origin, Some(ResourceKind::IcuBeds)).is_empty());

        tracker
            .update(&id, &[ResourceDelta::Set { resource: ResourceKind::IcuBeds, used: 6, total: 10 }])
            .unwrap();
        assert_eq!(tracker.nearest_available(origin, Some(ResourceKind::IcuBeds)).len(), 1);
    }

    #[test]
    fn stale_facilities_flagged_and_excluded() {
        let config = CapacityConfig {
            freshness_bound: Duration::minutes(30),
            ..CapacityConfig::default()
        };
        let tracker = CapacityTracker::new(config, Resolution::Four);
        let mut old = facility("f1", 19.08, 72.88, 1, 10);
        old.last_updated = Utc::now() - Duration::hours(3);
        tracker.register(old);

        let snapshot = tracker.snapshot(&FacilityId::new("f1")).unwrap();
        assert!(snapshot.stale);
        assert!(tracker
            .nearest_available(Location::new(19.08, 72.88), None)
            .is_empty());
    }

    #[test]
    fn concurrent_reports_keep_index_and_registry_agreed() {
        let tracker = tracker();
        tracker.register(facility("f1", 19.08, 72.88, 2, 10));
        let id = FacilityId::new("f1");

        // One thread keeps filling the facility, the other keeps
        // freeing it; whichever report lands last must be what both the
        // registry and the spatial index show.
        std::thread::scope(|s| {
            for fill in [2_u32, 10] {
                let tracker = &tracker;
                let id = id.clone();
                s.spawn(move || {
                    for _ in 0..200 {
                        tracker
                            .update(&id, &[ResourceDelta::Set {
                                resource: ResourceKind::IcuBeds,
                                used: fill,
                                total: 10,
                            }])
                            .unwrap();
                    }
                });
            }
        });

        let status = tracker.snapshot(&id).unwrap().facility.status;
        let listed = !tracker
            .nearest_available(Location::new(19.08, 72.88), Some(ResourceKind::IcuBeds))
            .is_empty();
        assert_eq!(listed, status != FacilityStatus::Full);
    }

    #[test]
    fn unknown_facility_errors() {
        let tracker = tracker();
        let err = tracker.update(&FacilityId::new("ghost"), &[]).unwrap_err();
        assert!(matches!(err, CapacityError::UnknownFacility { .. }));
    }

    #[test]
    fn results_ordered_by_distance() {
        let tracker = tracker();
        tracker.register(facility("near", 19.081, 72.881, 1, 10));
        tracker.register(facility("far", 19.15, 72.95, 1, 10));

        let available = tracker.nearest_available(Location::new(19.08, 72.88), None);
        assert_eq!(available.len(), 2);
        assert!(available[0].distance_km <= available[1].distance_km);
        assert_eq!(available[0].facility.id, FacilityId::new("near"));
    }
}
